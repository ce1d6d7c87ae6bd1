//! Decoding of `.sxm` topography scans.

use crate::elements::{read_f32_payload, ReadDataError};
use crate::header::scan::{read_scan_header, ScanHeader};
use crate::header::{HeaderMap, ParseHeaderError, ReadHeaderError};
use crate::ErrorClass;
use log::debug;
use ndarray::prelude::*;
use ndarray::ShapeError;
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::str::FromStr;

/// Scan direction of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = InvalidDirection;

    fn from_str(s: &str) -> Result<Direction, InvalidDirection> {
        match s {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            other => Err(InvalidDirection(other.to_owned())),
        }
    }
}

/// A direction string other than `forward` or `backward`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidDirection(pub String);

impl InvalidDirection {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::InvalidDirection
    }
}

impl Error for InvalidDirection {}

impl fmt::Display for InvalidDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "invalid scan direction {:?}: choose either 'forward' or 'backward'",
            self.0
        )
    }
}

/// Options for decoding a scan file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Channels to decode; `None` decodes all channels in `DATA_INFO`.
    pub channels: Option<Vec<String>>,
}

/// An error reading a `.sxm` file.
#[derive(Debug)]
pub enum ReadScanError {
    /// An error caused by I/O.
    Io(io::Error),
    /// The header is malformed.
    Header(ParseHeaderError),
    /// The payload does not match the header.
    Data(ReadDataError),
    Shape(ShapeError),
    /// A channel is not listed in `DATA_INFO`.
    ChannelNotFound(String),
    /// The channel was not recorded in this direction.
    DirectionNotRecorded {
        channel: String,
        direction: Direction,
    },
}

impl ReadScanError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReadScanError::Io(_) => ErrorClass::Io,
            ReadScanError::Header(err) => err.class(),
            ReadScanError::Data(err) => err.class(),
            ReadScanError::Shape(_) => ErrorClass::TruncatedPayload,
            ReadScanError::ChannelNotFound(_) => ErrorClass::ChannelNotFound,
            ReadScanError::DirectionNotRecorded { .. } => ErrorClass::InvalidDirection,
        }
    }
}

impl Error for ReadScanError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReadScanError::Io(err) => Some(err),
            ReadScanError::Header(err) => Some(err),
            ReadScanError::Data(err) => Some(err),
            ReadScanError::Shape(err) => Some(err),
            ReadScanError::ChannelNotFound(_) | ReadScanError::DirectionNotRecorded { .. } => None,
        }
    }
}

impl fmt::Display for ReadScanError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadScanError::Io(err) => write!(f, "I/O error: {}", err),
            ReadScanError::Header(err) => write!(f, "error parsing header: {}", err),
            ReadScanError::Data(err) => write!(f, "error reading data: {}", err),
            ReadScanError::Shape(err) => write!(f, "data did not match shape in header: {}", err),
            ReadScanError::ChannelNotFound(name) => write!(f, "channel not found: {}", name),
            ReadScanError::DirectionNotRecorded { channel, direction } => write!(
                f,
                "channel {} was not recorded in the {} direction",
                channel, direction
            ),
        }
    }
}

impl From<io::Error> for ReadScanError {
    fn from(err: io::Error) -> ReadScanError {
        ReadScanError::Io(err)
    }
}

impl From<ParseHeaderError> for ReadScanError {
    fn from(err: ParseHeaderError) -> ReadScanError {
        ReadScanError::Header(err)
    }
}

impl From<ReadHeaderError> for ReadScanError {
    fn from(err: ReadHeaderError) -> ReadScanError {
        match err {
            ReadHeaderError::Io(err) => ReadScanError::Io(err),
            ReadHeaderError::Parse(err) => ReadScanError::Header(err),
        }
    }
}

impl From<ReadDataError> for ReadScanError {
    fn from(err: ReadDataError) -> ReadScanError {
        ReadScanError::Data(err)
    }
}

impl From<ShapeError> for ReadScanError {
    fn from(err: ShapeError) -> ReadScanError {
        ReadScanError::Shape(err)
    }
}

/// The images of one channel, each of shape `[ny, nx]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanSignal {
    pub forward: Option<Array2<f32>>,
    /// Stored with its columns reversed back, so that it is spatially
    /// aligned with `forward`.
    pub backward: Option<Array2<f32>>,
}

impl ScanSignal {
    pub fn get(&self, direction: Direction) -> Option<&Array2<f32>> {
        match direction {
            Direction::Forward => self.forward.as_ref(),
            Direction::Backward => self.backward.as_ref(),
        }
    }
}

/// A decoded `.sxm` file.
#[derive(Clone, Debug)]
pub struct ScanFile {
    header: HeaderMap,
    scan_header: ScanHeader,
    signals: Vec<(String, ScanSignal)>,
}

impl ScanFile {
    /// Opens and decodes the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, options: &ScanOptions) -> Result<ScanFile, ReadScanError> {
        let file = File::open(path)?;
        ScanFile::read(BufReader::new(file), options)
    }

    /// Decodes a scan file from `reader`, which must be positioned at the
    /// start of the file and must end with the payload.
    ///
    /// Channel selections are checked against the header before any payload
    /// bytes are read.
    pub fn read<R: io::BufRead>(mut reader: R, options: &ScanOptions) -> Result<ScanFile, ReadScanError> {
        let (header, offset) = read_scan_header(&mut reader)?;
        let scan_header = ScanHeader::from_map(&header)?;
        if let Some(names) = &options.channels {
            if let Some(missing) = names.iter().find(|n| scan_header.channel(n).is_none()) {
                return Err(ReadScanError::ChannelNotFound(missing.clone()));
            }
        }
        let [nx, ny] = scan_header.scan_pixels;
        let image_len = scan_header.image_len();
        let num_images = scan_header.num_images();
        // `payload_len` is checked by `ScanHeader::from_map`.
        let len = scan_header.payload_len().unwrap_or_default();
        debug!(
            "scan header: {} x {} pixels, {} images, payload at byte {}",
            nx, ny, num_images, offset
        );

        let data = read_f32_payload(&mut reader, len)?;
        let mut images = data.chunks_exact(image_len.max(1));
        let mut signals = Vec::new();
        for info in &scan_header.data_info {
            let mut signal = ScanSignal::default();
            for &direction in info.directions.recorded() {
                let raw = images.next().unwrap_or(&[]);
                let image = Array::from_shape_vec((ny, nx), raw.to_vec())?;
                match direction {
                    Direction::Forward => signal.forward = Some(image),
                    Direction::Backward => {
                        signal.backward = Some(image.slice(s![.., ..;-1]).to_owned())
                    }
                }
            }
            let wanted = match &options.channels {
                Some(names) => names.contains(&info.name),
                None => true,
            };
            if wanted {
                signals.push((info.name.clone(), signal));
            }
        }

        Ok(ScanFile {
            header,
            scan_header,
            signals,
        })
    }

    /// The header entries, with normalized keys.
    pub fn header(&self) -> &HeaderMap {
        &self.header
    }

    /// The typed view of the header.
    pub fn scan_header(&self) -> &ScanHeader {
        &self.scan_header
    }

    /// Decoded channels in `DATA_INFO` order.
    pub fn signals(&self) -> impl Iterator<Item = (&str, &ScanSignal)> {
        self.signals.iter().map(|(name, s)| (name.as_str(), s))
    }

    /// Returns the image of `channel` in `direction`, shape `[ny, nx]`.
    pub fn signal(&self, channel: &str, direction: Direction) -> Result<&Array2<f32>, ReadScanError> {
        let (_, signal) = self
            .signals
            .iter()
            .find(|(name, _)| name == channel)
            .ok_or_else(|| ReadScanError::ChannelNotFound(channel.to_owned()))?;
        signal
            .get(direction)
            .ok_or_else(|| ReadScanError::DirectionNotRecorded {
                channel: channel.to_owned(),
                direction,
            })
    }

    /// Pixel positions along x and y relative to the frame corner, in
    /// meters: `scan_pixels` values spaced evenly over `scan_range`.
    pub fn image_axes(&self) -> (Array1<f64>, Array1<f64>) {
        let [nx, ny] = self.scan_header.scan_pixels;
        let [x_range, y_range] = self.scan_header.scan_range;
        (
            Array::linspace(0., x_range, nx),
            Array::linspace(0., y_range, ny),
        )
    }
}
