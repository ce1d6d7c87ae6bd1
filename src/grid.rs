//! Decoding of `.3ds` grid spectroscopy files.

use crate::elements::{read_f32_payload, ReadDataError};
use crate::header::grid::{read_grid_header, GridHeader, SWEEP_END, SWEEP_START};
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

/// Name of the experimental parameter holding the tip x position.
pub const X_PARAMETER: &str = "X (m)";
/// Name of the experimental parameter holding the tip y position.
pub const Y_PARAMETER: &str = "Y (m)";

/// Parameter columns of the tip position when the header does not name
/// the parameters (`Sweep Start`, `Sweep End`, `X (m)`, `Y (m)`, ...).
const X_COLUMN: usize = 2;
const Y_COLUMN: usize = 3;

/// Interleaving of the channel block of each grid point record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelLayout {
    /// All sweep points of the first channel, then of the second, ...
    #[default]
    ChannelMajor,
    /// All channels of the first sweep point, then of the second, ...
    SweepMajor,
}

/// Where the sweep axis comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SweepSource {
    /// Use [`SweepSource::Channel`] if the swept signal was recorded as a
    /// channel, otherwise [`SweepSource::Parameters`].
    #[default]
    Auto,
    /// Values of the channel named like the sweep signal, at the first grid
    /// point.
    Channel,
    /// `Points` values linearly spaced between the `Sweep Start` and `Sweep
    /// End` parameters of the first grid point.
    Parameters,
}

/// Options for decoding a grid file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GridOptions {
    pub layout: ChannelLayout,
    pub sweep: SweepSource,
    /// Channels to decode; `None` decodes all declared channels.
    pub channels: Option<Vec<String>>,
}

/// An error reading a `.3ds` file.
#[derive(Debug)]
pub enum ReadGridError {
    /// An error caused by I/O.
    Io(io::Error),
    /// The header is malformed.
    Header(ParseHeaderError),
    /// The payload does not match the header.
    Data(ReadDataError),
    Shape(ShapeError),
    /// A channel is not declared in the header.
    ChannelNotFound(String),
    /// A parameter is not declared in the header.
    ParameterNotFound(String),
}

impl ReadGridError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReadGridError::Io(_) => ErrorClass::Io,
            ReadGridError::Header(err) => err.class(),
            ReadGridError::Data(err) => err.class(),
            ReadGridError::Shape(_) => ErrorClass::TruncatedPayload,
            ReadGridError::ChannelNotFound(_) | ReadGridError::ParameterNotFound(_) => {
                ErrorClass::ChannelNotFound
            }
        }
    }
}

impl Error for ReadGridError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReadGridError::Io(err) => Some(err),
            ReadGridError::Header(err) => Some(err),
            ReadGridError::Data(err) => Some(err),
            ReadGridError::Shape(err) => Some(err),
            ReadGridError::ChannelNotFound(_) | ReadGridError::ParameterNotFound(_) => None,
        }
    }
}

impl fmt::Display for ReadGridError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadGridError::Io(err) => write!(f, "I/O error: {}", err),
            ReadGridError::Header(err) => write!(f, "error parsing header: {}", err),
            ReadGridError::Data(err) => write!(f, "error reading data: {}", err),
            ReadGridError::Shape(err) => write!(f, "data did not match shape in header: {}", err),
            ReadGridError::ChannelNotFound(name) => write!(f, "channel not found: {}", name),
            ReadGridError::ParameterNotFound(name) => write!(f, "parameter not found: {}", name),
        }
    }
}

impl From<io::Error> for ReadGridError {
    fn from(err: io::Error) -> ReadGridError {
        ReadGridError::Io(err)
    }
}

impl From<ParseHeaderError> for ReadGridError {
    fn from(err: ParseHeaderError) -> ReadGridError {
        ReadGridError::Header(err)
    }
}

impl From<ReadHeaderError> for ReadGridError {
    fn from(err: ReadHeaderError) -> ReadGridError {
        match err {
            ReadHeaderError::Io(err) => ReadGridError::Io(err),
            ReadHeaderError::Parse(err) => ReadGridError::Header(err),
        }
    }
}

impl From<ReadDataError> for ReadGridError {
    fn from(err: ReadDataError) -> ReadGridError {
        ReadGridError::Data(err)
    }
}

impl From<ShapeError> for ReadGridError {
    fn from(err: ShapeError) -> ReadGridError {
        ReadGridError::Shape(err)
    }
}

/// A decoded `.3ds` file.
///
/// # Example
///
/// ```no_run
/// use nanonis_read::{GridFile, GridOptions};
///
/// let grid = GridFile::open("spectra.3ds", &GridOptions::default())?;
/// let current = grid.channel("Current (A)")?;
/// assert_eq!(current.dim().2, grid.sweep_signal().len());
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug)]
pub struct GridFile {
    header: HeaderMap,
    grid_header: GridHeader,
    sweep_signal: Array1<f32>,
    params: Array3<f32>,
    channel_signals: Vec<(String, Array3<f32>)>,
}

impl GridFile {
    /// Opens and decodes the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, options: &GridOptions) -> Result<GridFile, ReadGridError> {
        let file = File::open(path)?;
        GridFile::read(BufReader::new(file), options)
    }

    /// Decodes a grid file from `reader`, which must be positioned at the
    /// start of the file and must end with the payload.
    ///
    /// Channel selections are checked against the header before any payload
    /// bytes are read.
    pub fn read<R: io::BufRead>(mut reader: R, options: &GridOptions) -> Result<GridFile, ReadGridError> {
        let (header, offset) = read_grid_header(&mut reader)?;
        let grid_header = GridHeader::from_map(&header)?;
        let selected = select_channels(&grid_header, options.channels.as_deref())?;
        let sweep = SweepPlan::resolve(&grid_header, options.sweep)?;
        let [nx, ny] = grid_header.dim_px;
        debug!(
            "grid header: {} x {} points, {} parameters, {} channels x {} sweep points, payload at byte {}",
            nx,
            ny,
            grid_header.num_parameters,
            grid_header.channels.len(),
            grid_header.num_sweep_signal,
            offset,
        );

        // `payload_len` is checked by `GridHeader::from_map`.
        let len = grid_header.payload_len().unwrap_or_default();
        let data = read_f32_payload(&mut reader, len)?;
        let records = Array::from_shape_vec((nx, ny, grid_header.record_len()), data)?;

        let num_params = grid_header.num_parameters;
        let params = records.slice(s![.., .., ..num_params]).to_owned();
        let channel_signals = selected
            .into_iter()
            .map(|index| {
                let name = grid_header.channels[index].clone();
                let signal = channel_block(&records, &grid_header, options.layout, index).to_owned();
                (name, signal)
            })
            .collect();
        let sweep_signal = match sweep {
            SweepPlan::Channel(index) => channel_block(&records, &grid_header, options.layout, index)
                .slice(s![0, 0, ..])
                .to_owned(),
            SweepPlan::Parameters { start, end } => Array::linspace(
                params[[0, 0, start]],
                params[[0, 0, end]],
                grid_header.num_sweep_signal,
            ),
        };

        Ok(GridFile {
            header,
            grid_header,
            sweep_signal,
            params,
            channel_signals,
        })
    }

    /// The header entries, with normalized keys.
    pub fn header(&self) -> &HeaderMap {
        &self.header
    }

    /// The typed view of the header.
    pub fn grid_header(&self) -> &GridHeader {
        &self.grid_header
    }

    /// The sweep axis, e.g. the bias voltages, with `num_sweep_signal`
    /// values.
    pub fn sweep_signal(&self) -> &Array1<f32> {
        &self.sweep_signal
    }

    /// Per-point parameters, shape `[nx, ny, num_parameters]`.
    pub fn params(&self) -> &Array3<f32> {
        &self.params
    }

    /// Decoded channels in declared order, each of shape `[nx, ny,
    /// num_sweep_signal]`.
    pub fn channels(&self) -> impl Iterator<Item = (&str, &Array3<f32>)> {
        self.channel_signals.iter().map(|(name, a)| (name.as_str(), a))
    }

    /// Returns the decoded channel `name`.
    pub fn channel(&self, name: &str) -> Result<&Array3<f32>, ReadGridError> {
        self.channel_signals
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, signal)| signal)
            .ok_or_else(|| ReadGridError::ChannelNotFound(name.to_owned()))
    }

    /// Returns the `[nx, ny]` plane of parameter `name`.
    pub fn parameter(&self, name: &str) -> Result<ArrayView2<'_, f32>, ReadGridError> {
        let index = self
            .grid_header
            .parameter_index(name)
            .ok_or_else(|| ReadGridError::ParameterNotFound(name.to_owned()))?;
        Ok(self.params.index_axis(Axis(2), index))
    }

    /// Returns the `X (m)` and `Y (m)` parameter planes, in meters.
    ///
    /// Headers that do not name their parameters store the position in
    /// columns 2 and 3.
    pub fn coordinates(&self) -> Result<(ArrayView2<'_, f32>, ArrayView2<'_, f32>), ReadGridError> {
        let names = self.grid_header.parameter_names().count();
        let column = |name: &str, fallback: usize| match self.grid_header.parameter_index(name) {
            Some(index) => Ok(index),
            None if names == 0 && fallback < self.grid_header.num_parameters => Ok(fallback),
            None => Err(ReadGridError::ParameterNotFound(name.to_owned())),
        };
        let x = column(X_PARAMETER, X_COLUMN)?;
        let y = column(Y_PARAMETER, Y_COLUMN)?;
        Ok((
            self.params.index_axis(Axis(2), x),
            self.params.index_axis(Axis(2), y),
        ))
    }
}

/// Returns the indices of the channels to decode.
fn select_channels(header: &GridHeader, names: Option<&[String]>) -> Result<Vec<usize>, ReadGridError> {
    match names {
        None => Ok((0..header.channels.len()).collect()),
        Some(names) => names
            .iter()
            .map(|name| {
                header
                    .channel_index(name)
                    .ok_or_else(|| ReadGridError::ChannelNotFound(name.clone()))
            })
            .collect(),
    }
}

/// The `[nx, ny, num_sweep_signal]` view of channel `index`.
fn channel_block<'a>(
    records: &'a Array3<f32>,
    header: &GridHeader,
    layout: ChannelLayout,
    index: usize,
) -> ArrayView3<'a, f32> {
    let start = header.num_parameters;
    let num_sweep = header.num_sweep_signal;
    let num_channels = header.channels.len();
    match layout {
        ChannelLayout::ChannelMajor => {
            let begin = start + index * num_sweep;
            records.slice(s![.., .., begin..begin + num_sweep])
        }
        ChannelLayout::SweepMajor => {
            let begin = start + index;
            let end = start + num_channels * num_sweep;
            records.slice(s![.., .., begin..end;num_channels])
        }
    }
}

/// Resolved source of the sweep axis.
enum SweepPlan {
    Channel(usize),
    Parameters { start: usize, end: usize },
}

impl SweepPlan {
    fn resolve(header: &GridHeader, source: SweepSource) -> Result<SweepPlan, ReadGridError> {
        let channel = || -> Result<SweepPlan, ReadGridError> {
            let name = header
                .sweep_signal
                .as_deref()
                .ok_or_else(|| ParseHeaderError::MissingKey("sweep_signal".to_owned()))?;
            header
                .channel_index(name)
                .map(SweepPlan::Channel)
                .ok_or_else(|| ReadGridError::ChannelNotFound(name.to_owned()))
        };
        let parameters = || -> Result<SweepPlan, ReadGridError> {
            let index = |name: &str| {
                header
                    .parameter_index(name)
                    .ok_or_else(|| ParseHeaderError::MissingKey(name.to_owned()))
            };
            Ok(SweepPlan::Parameters {
                start: index(SWEEP_START)?,
                end: index(SWEEP_END)?,
            })
        };
        match source {
            SweepSource::Channel => channel(),
            SweepSource::Parameters => parameters(),
            SweepSource::Auto => channel().or_else(|_| parameters()),
        }
    }
}
