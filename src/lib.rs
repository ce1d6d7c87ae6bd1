//! This crate reads [Nanonis] scanning-tunneling-microscopy files into
//! [`ndarray`] arrays:
//!
//! * `.3ds` grid spectroscopy files, see [`GridFile`];
//! * `.sxm` topography scans, see [`ScanFile`].
//!
//! Both formats consist of an ASCII header terminated by a sentinel line,
//! followed by a big-endian `f32` payload whose shape is fully determined by
//! the header. The header is exposed as a [`HeaderMap`] with normalized
//! snake_case keys (`channels`, `scan_range`, ...).
//!
//! [`Pipeline`] runs the usual decode-and-rescale pass over a grid file and
//! an optional companion scan file, and (with the `npz` feature, enabled by
//! default) [`HandoffWriter`] writes the resulting named arrays to a `.npz`
//! archive that NumPy and MATLAB can load.
//!
//! [Nanonis]: https://www.specs-group.com/nanonis/
//! [`ndarray`]: https://github.com/rust-ndarray/ndarray
//!
//! # Example
//!
//! ```no_run
//! use nanonis_read::{GridFile, GridOptions, ScaleExt, Scale};
//!
//! let grid = GridFile::open("spectra.3ds", &GridOptions::default())?;
//! let (x, y) = grid.coordinates()?;
//! let x_nm = x.to_scale(Scale::Nano);
//! println!("{} sweep points, x[0, 0] = {} nm", grid.sweep_signal().len(), x_nm[[0, 0]]);
//! # let _ = y;
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! # Limitations
//!
//! * Only the read side is implemented; the crate never writes `.3ds` or
//!   `.sxm` files.
//!
//! * Payloads are assumed to be big-endian `f32`, which is what all known
//!   Nanonis firmware revisions write.

mod elements;
mod grid;
#[cfg(feature = "npz")]
mod handoff;
pub mod header;
mod pipeline;
mod scan;
mod units;

pub use crate::elements::ReadDataError;
pub use crate::grid::{ChannelLayout, GridFile, GridOptions, ReadGridError, SweepSource};
#[cfg(feature = "npz")]
pub use crate::handoff::{HandoffElement, HandoffWriter, WriteHandoffError};
pub use crate::header::{HeaderMap, HeaderValue};
pub use crate::pipeline::{
    DecodeError, DecodedArrays, GridArrays, Pipeline, PipelineConfig, TopoArrays,
};
pub use crate::scan::{
    Direction, InvalidDirection, ReadScanError, ScanFile, ScanOptions, ScanSignal,
};
pub use crate::units::{Scalable, Scale, ScaleExt};

use std::fmt;

/// Coarse classification shared by every error in this crate.
///
/// Callers that only need to report *what kind* of failure happened (for
/// example to choose an exit code) can match on this instead of the
/// individual error enums.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// The header could not be parsed, or a required field is missing or
    /// has an illegal value.
    MalformedHeader,
    /// The payload size does not match the size declared by the header.
    TruncatedPayload,
    /// A requested channel or parameter is not declared in the header.
    ChannelNotFound,
    /// A scan direction is not `forward`/`backward`, or was not recorded.
    InvalidDirection,
    /// The underlying reader or writer failed.
    Io,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ErrorClass::MalformedHeader => "malformed header",
            ErrorClass::TruncatedPayload => "truncated payload",
            ErrorClass::ChannelNotFound => "channel not found",
            ErrorClass::InvalidDirection => "invalid direction",
            ErrorClass::Io => "I/O error",
        };
        f.write_str(name)
    }
}
