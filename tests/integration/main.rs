//! Integration tests.

use std::io::{self, BufRead, Read, Write};
use tempfile::NamedTempFile;

mod grid;
mod scan;

/// Returns `0.0, 1.0, 2.0, ...` with `len` values.
pub fn counting(len: usize) -> Vec<f32> {
    (0..len).map(|i| i as f32).collect()
}

/// Header of a `.3ds` file with fixed parameters `Sweep Start;Sweep End`
/// followed by `experimental` parameters.
pub fn grid_header(
    [nx, ny]: [usize; 2],
    points: usize,
    channels: &[&str],
    experimental: &[&str],
) -> String {
    format!(
        "Grid dim=\"{nx} x {ny}\"\r\n\
Grid settings=1.000000E-8;2.000000E-8;4.000000E-9;4.000000E-9;0.000000E+0\r\n\
Sweep Signal=\"Bias (V)\"\r\n\
Fixed parameters=\"Sweep Start;Sweep End\"\r\n\
Experiment parameters=\"{experimental}\"\r\n\
# Parameters (4 byte)={num_params}\r\n\
Experiment size (bytes)={experiment_size}\r\n\
Points={points}\r\n\
Channels=\"{channels}\"\r\n\
Delay before measuring (s)=1.000000E-3\r\n\
Experiment=Grid Spectroscopy\r\n\
Comment=\r\n\
:HEADER_END:\r\n",
        experimental = experimental.join(";"),
        num_params = 2 + experimental.len(),
        experiment_size = 4 * channels.len() * points,
        channels = channels.join(";"),
    )
}

/// Header of an `.sxm` file with a 4 nm x 2 nm frame centered at
/// (1 nm, -0.5 nm). `channels` holds `(name, direction)` pairs.
pub fn scan_header([nx, ny]: [usize; 2], channels: &[(&str, &str)]) -> Vec<u8> {
    let mut header = format!(
        ":NANONIS_VERSION:\n2\n\
:SCAN_PIXELS:\n       {nx}       {ny}\n\
:SCAN_RANGE:\n           4.000000E-9           2.000000E-9\n\
:SCAN_OFFSET:\n             1.000000E-9         -5.000000E-10\n\
:SCAN_ANGLE:\n            0.000E+0\n\
:SCAN_DIR:\nup\n\
:BIAS:\n0.1\n\
:DATA_INFO:\n\tChannel\tName\tUnit\tDirection\tCalibration\tOffset\n"
    );
    for (i, (name, direction)) in channels.iter().enumerate() {
        header.push_str(&format!(
            "\t{i}\t{name}\tm\t{direction}\t1.000E+0\t0.000E+0\n"
        ));
    }
    header.push_str("\n:SCANIT_END:\n\n\n");
    let mut bytes = header.into_bytes();
    bytes.extend_from_slice(&[0x1a, 0x04]);
    bytes
}

/// Appends `data` as big-endian `f32` to `header`.
pub fn with_payload<H: AsRef<[u8]>>(header: H, data: &[f32]) -> Vec<u8> {
    let mut bytes = header.as_ref().to_vec();
    for v in data {
        bytes.extend_from_slice(&v.to_be_bytes());
    }
    bytes
}

/// Writes `bytes` to a temporary file with extension `suffix`.
pub fn temp_file(bytes: &[u8], suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

/// Reader that fails on any attempt to read past the first `limit` bytes.
pub struct FailPastReader {
    data: Vec<u8>,
    pos: usize,
    limit: usize,
}

impl FailPastReader {
    pub fn new(data: Vec<u8>, limit: usize) -> FailPastReader {
        FailPastReader { data, pos: 0, limit }
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

impl Read for FailPastReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = {
            let available = self.fill_buf()?;
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for FailPastReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos >= self.limit {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "attempted to read the payload",
            ));
        }
        Ok(&self.data[self.pos..self.limit])
    }

    fn consume(&mut self, amt: usize) {
        self.pos += amt;
    }
}
