//! `.3ds` decoding.

use super::{counting, grid_header, temp_file, with_payload, FailPastReader};
use nanonis_read::{
    ChannelLayout, ErrorClass, GridFile, GridOptions, ReadDataError, ReadGridError, Scale,
    ScaleExt, SweepSource,
};
use ndarray::{array, s, Axis};
use std::io::Cursor;

const EXPERIMENTAL: [&str; 5] = ["X (m)", "Y (m)", "Z (m)", "Z offset (m)", "Settling time (s)"];

#[test]
fn shape_law() {
    let cases = [
        // (nx, ny, sweep points, channels, experimental parameters)
        (1, 1, 1, 1, 2),
        (2, 3, 5, 1, 3),
        (3, 2, 4, 3, 5),
        (4, 4, 2, 2, 2),
    ];
    let names = ["Current (A)", "Bias (V)", "LIX 1 omega (A)"];
    for &(nx, ny, points, num_channels, num_experimental) in &cases {
        let channels = &names[..num_channels];
        let header = grid_header([nx, ny], points, channels, &EXPERIMENTAL[..num_experimental]);
        let num_params = 2 + num_experimental;
        let len = nx * ny * (num_params + num_channels * points);
        let bytes = with_payload(&header, &counting(len));
        for layout in [ChannelLayout::ChannelMajor, ChannelLayout::SweepMajor] {
            let options = GridOptions {
                layout,
                ..GridOptions::default()
            };
            let grid = GridFile::read(&bytes[..], &options).unwrap();
            assert_eq!(grid.params().dim(), (nx, ny, num_params));
            assert_eq!(grid.channels().count(), num_channels);
            for (_, signal) in grid.channels() {
                assert_eq!(signal.dim(), (nx, ny, points));
            }
            assert_eq!(grid.sweep_signal().len(), points);
            let (x, y) = grid.coordinates().unwrap();
            assert_eq!(x.dim(), (nx, ny));
            assert_eq!(y.dim(), (nx, ny));
        }
    }
}

#[test]
fn end_to_end_two_by_two() {
    let header = grid_header([2, 2], 3, &["Current (A)"], &EXPERIMENTAL[..2]);
    let bytes = with_payload(&header, &counting(2 * 2 * (4 + 3)));
    let grid = GridFile::read(&bytes[..], &GridOptions::default()).unwrap();

    let (x, y) = grid.coordinates().unwrap();
    assert_eq!(x.to_scale(Scale::Nano), array![[2e9f32, 9e9], [16e9, 23e9]]);
    assert_eq!(y.to_scale(Scale::Nano), array![[3e9f32, 10e9], [17e9, 24e9]]);
    // `Bias (V)` is not recorded as a channel, so the axis spans the sweep
    // parameters of the first point.
    assert_eq!(grid.sweep_signal(), &array![0f32, 0.5, 1.]);
    let current = grid.channel("Current (A)").unwrap();
    assert_eq!(
        current.to_scale(Scale::Nano),
        array![
            [[4e9f32, 5e9, 6e9], [11e9, 12e9, 13e9]],
            [[18e9, 19e9, 20e9], [25e9, 26e9, 27e9]],
        ]
    );
}

#[test]
fn scaled_is_1e9_times_raw() {
    let header = grid_header([3, 2], 4, &["Current (A)", "Z (m)"], &EXPERIMENTAL[..3]);
    let data: Vec<f32> = counting(3 * 2 * (5 + 2 * 4))
        .into_iter()
        .map(|v| (v - 20.) * 3.7e-11)
        .collect();
    let bytes = with_payload(&header, &data);
    let grid = GridFile::read(&bytes[..], &GridOptions::default()).unwrap();

    let (x, y) = grid.coordinates().unwrap();
    for raw in [x, y] {
        let scaled = raw.to_scale(Scale::Nano);
        for (s, r) in scaled.iter().zip(raw.iter()) {
            assert_eq!(*s, 1e9 * r);
        }
        assert_eq!(raw.to_scale(Scale::Raw), raw);
    }
    for (_, raw) in grid.channels() {
        let scaled = raw.to_scale(Scale::Nano);
        for (s, r) in scaled.iter().zip(raw.iter()) {
            assert_eq!(*s, 1e9 * r);
        }
    }
}

#[test]
fn sweep_axis_from_recorded_channel() {
    let header = grid_header([1, 2], 3, &["Current (A)", "Bias (V)"], &EXPERIMENTAL[..2]);
    let bytes = with_payload(&header, &counting(2 * (4 + 6)));

    let grid = GridFile::read(&bytes[..], &GridOptions::default()).unwrap();
    assert_eq!(grid.sweep_signal(), &array![7f32, 8., 9.]);

    let options = GridOptions {
        sweep: SweepSource::Parameters,
        ..GridOptions::default()
    };
    let grid = GridFile::read(&bytes[..], &options).unwrap();
    assert_eq!(grid.sweep_signal(), &array![0f32, 0.5, 1.]);
}

#[test]
fn sweep_major_interleaving() {
    let header = grid_header([1, 1], 2, &["Current (A)", "Z (m)"], &EXPERIMENTAL[..2]);
    let bytes = with_payload(&header, &counting(4 + 4));
    let options = GridOptions {
        layout: ChannelLayout::SweepMajor,
        ..GridOptions::default()
    };
    let grid = GridFile::read(&bytes[..], &options).unwrap();
    assert_eq!(grid.channel("Current (A)").unwrap(), &array![[[4f32, 6.]]]);
    assert_eq!(grid.channel("Z (m)").unwrap(), &array![[[5f32, 7.]]]);
}

#[test]
fn zero_sweep_points_rejected() {
    let header = grid_header([1, 1], 0, &["Current (A)", "Z (m)"], &EXPERIMENTAL[..2]);
    let bytes = with_payload(&header, &counting(4));
    for layout in [ChannelLayout::ChannelMajor, ChannelLayout::SweepMajor] {
        let options = GridOptions {
            layout,
            ..GridOptions::default()
        };
        match GridFile::read(&bytes[..], &options) {
            Err(err @ ReadGridError::Header(_)) => {
                assert_eq!(err.class(), ErrorClass::MalformedHeader)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}

#[test]
fn payload_one_element_short() {
    let header = grid_header([2, 2], 3, &["Current (A)"], &EXPERIMENTAL[..2]);
    let bytes = with_payload(&header, &counting(2 * 2 * 7 - 1));
    match GridFile::read(&bytes[..], &GridOptions::default()) {
        Err(err @ ReadGridError::Data(ReadDataError::Truncated { .. })) => {
            assert_eq!(err.class(), ErrorClass::TruncatedPayload);
            if let ReadGridError::Data(ReadDataError::Truncated { expected, actual }) = err {
                assert_eq!(expected, 4 * 28);
                assert_eq!(actual, 4 * 27);
            }
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn unknown_channel_before_payload() {
    let header = grid_header([2, 2], 3, &["Current (A)"], &EXPERIMENTAL[..2]);
    let bytes = with_payload(&header, &counting(2 * 2 * 7));
    let mut reader = FailPastReader::new(bytes, header.len());
    let options = GridOptions {
        channels: Some(vec!["LIX 1 omega (A)".into()]),
        ..GridOptions::default()
    };
    match GridFile::read(&mut reader, &options) {
        Err(err @ ReadGridError::ChannelNotFound(_)) => {
            assert_eq!(err.class(), ErrorClass::ChannelNotFound);
            assert!(err.to_string().contains("LIX 1 omega (A)"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(reader.position(), header.len());

    // Lookups on a decoded file fail the same way.
    let bytes = with_payload(&header, &counting(2 * 2 * 7));
    let grid = GridFile::read(Cursor::new(bytes), &GridOptions::default()).unwrap();
    let err = grid.channel("LIX 1 omega (A)").unwrap_err();
    assert_eq!(err.class(), ErrorClass::ChannelNotFound);
}

#[test]
fn missing_sentinel() {
    let header = grid_header([2, 2], 3, &["Current (A)"], &EXPERIMENTAL[..2]);
    let truncated = header.replace(":HEADER_END:\r\n", "");
    let err = GridFile::read(truncated.as_bytes(), &GridOptions::default()).unwrap_err();
    assert_eq!(err.class(), ErrorClass::MalformedHeader);
}

#[test]
fn header_fields() {
    let header = grid_header([2, 2], 3, &["Current (A)"], &EXPERIMENTAL[..3]);
    let bytes = with_payload(&header, &counting(2 * 2 * 8));
    let grid = GridFile::read(&bytes[..], &GridOptions::default()).unwrap();
    let typed = grid.grid_header();
    assert_eq!(typed.dim_px, [2, 2]);
    assert_eq!(typed.pos_xy, Some([1e-8, 2e-8]));
    assert_eq!(typed.sweep_signal.as_deref(), Some("Bias (V)"));
    assert_eq!(typed.num_parameters, 5);
    assert_eq!(grid.header().text("experiment").unwrap(), "Grid Spectroscopy");
    assert_eq!(grid.header().number("delay_before_measuring").unwrap(), 1e-3);
    assert_eq!(
        grid.parameter("Z (m)").unwrap(),
        grid.params().index_axis(Axis(2), 4)
    );
}

#[test]
fn open_from_disk() {
    let header = grid_header([2, 3], 4, &["Current (A)"], &EXPERIMENTAL[..2]);
    let data = counting(2 * 3 * 8);
    let file = temp_file(&with_payload(&header, &data), ".3ds");
    let grid = GridFile::open(file.path(), &GridOptions::default()).unwrap();
    let current = grid.channel("Current (A)").unwrap();
    assert_eq!(current.slice(s![1, 2, ..]), array![44f32, 45., 46., 47.]);
}
