//! `.sxm` decoding.

use super::{counting, scan_header, temp_file, with_payload, FailPastReader};
use nanonis_read::{Direction, ErrorClass, ReadScanError, ScanFile, ScanOptions};
use ndarray::{s, Array, Array2, Axis};

#[test]
fn backward_rows_are_reversed() {
    let (nx, ny) = (5, 3);
    let header = scan_header([nx, ny], &[("Z", "both")]);
    let data = counting(2 * nx * ny);
    let bytes = with_payload(&header, &data);
    let scan = ScanFile::read(&bytes[..], &ScanOptions::default()).unwrap();

    let raw_forward = Array::from_shape_vec((ny, nx), data[..nx * ny].to_vec()).unwrap();
    let raw_backward = Array::from_shape_vec((ny, nx), data[nx * ny..].to_vec()).unwrap();
    assert_eq!(scan.signal("Z", Direction::Forward).unwrap(), &raw_forward);
    let backward = scan.signal("Z", Direction::Backward).unwrap();
    for (row, raw_row) in backward.axis_iter(Axis(0)).zip(raw_backward.axis_iter(Axis(0))) {
        assert_eq!(row, raw_row.slice(s![..;-1]));
    }
}

#[test]
fn channels_in_declared_order() {
    let header = scan_header(
        [2, 2],
        &[("Z", "both"), ("Current", "forward"), ("LIX 1 omega", "backward")],
    );
    let bytes = with_payload(&header, &counting(4 * 4));
    let scan = ScanFile::read(&bytes[..], &ScanOptions::default()).unwrap();
    let names: Vec<&str> = scan.signals().map(|(name, _)| name).collect();
    assert_eq!(names, ["Z", "Current", "LIX 1 omega"]);
    assert_eq!(
        scan.signal("Current", Direction::Forward).unwrap(),
        &Array2::from_shape_vec((2, 2), vec![8f32, 9., 10., 11.]).unwrap()
    );
    assert_eq!(
        scan.signal("LIX 1 omega", Direction::Backward).unwrap(),
        &Array2::from_shape_vec((2, 2), vec![13f32, 12., 15., 14.]).unwrap()
    );
    let err = scan.signal("LIX 1 omega", Direction::Forward).unwrap_err();
    assert_eq!(err.class(), ErrorClass::InvalidDirection);
}

#[test]
fn oversized_pixel_counts_rejected() {
    let header = scan_header([4294967296, 4294967297], &[("Z", "both")]);
    match ScanFile::read(&header[..], &ScanOptions::default()) {
        Err(err @ ReadScanError::Header(_)) => {
            assert_eq!(err.class(), ErrorClass::MalformedHeader);
            assert!(err.to_string().contains("scan_pixels"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn payload_one_element_short() {
    let header = scan_header([3, 2], &[("Z", "both")]);
    let bytes = with_payload(&header, &counting(11));
    let err = ScanFile::read(&bytes[..], &ScanOptions::default()).unwrap_err();
    assert_eq!(err.class(), ErrorClass::TruncatedPayload);
}

#[test]
fn unknown_channel_before_payload() {
    let header = scan_header([3, 2], &[("Z", "both")]);
    let bytes = with_payload(&header, &counting(12));
    let mut reader = FailPastReader::new(bytes, header.len());
    let options = ScanOptions {
        channels: Some(vec!["Current".into()]),
    };
    match ScanFile::read(&mut reader, &options) {
        Err(err @ ReadScanError::ChannelNotFound(_)) => {
            assert_eq!(err.class(), ErrorClass::ChannelNotFound)
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(reader.position(), header.len());
}

#[test]
fn missing_data_marker() {
    let mut header = scan_header([3, 2], &[("Z", "both")]);
    header.truncate(header.len() - 2);
    let err = ScanFile::read(&header[..], &ScanOptions::default()).unwrap_err();
    assert_eq!(err.class(), ErrorClass::MalformedHeader);
}

#[test]
fn invalid_direction_string() {
    let err = "up".parse::<Direction>().unwrap_err();
    assert_eq!(err.class(), ErrorClass::InvalidDirection);
    assert_eq!(
        err.to_string(),
        "invalid scan direction \"up\": choose either 'forward' or 'backward'"
    );
}

#[test]
fn open_from_disk() {
    let header = scan_header([4, 2], &[("Z", "forward")]);
    let file = temp_file(&with_payload(&header, &counting(8)), ".sxm");
    let scan = ScanFile::open(file.path(), &ScanOptions::default()).unwrap();

    let typed = scan.scan_header();
    assert_eq!(typed.scan_pixels, [4, 2]);
    assert_eq!(typed.scan_offset, [1e-9, -5e-10]);
    assert_eq!(typed.scan_dir.as_deref(), Some("up"));
    assert_eq!(typed.bias, Some(0.1));
    assert_eq!(scan.header().text("nanonis_version").unwrap(), "2");

    let (x, y) = scan.image_axes();
    assert_eq!(x.len(), 4);
    assert_eq!(y.len(), 2);
    assert_eq!(x[0], 0.);
    assert!((x[3] - 4e-9).abs() < 1e-24);
    assert!((y[1] - 2e-9).abs() < 1e-24);
}
