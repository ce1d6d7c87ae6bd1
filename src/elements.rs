//! Reading of the big-endian `f32` payloads.

use crate::ErrorClass;
use byteorder::{BigEndian, ByteOrder};
use std::error::Error;
use std::fmt;
use std::io::{self, Read};

/// Size in bytes of one payload element.
const ELEMENT_SIZE: usize = 4;

/// An error reading the payload data.
#[derive(Debug)]
pub enum ReadDataError {
    /// An error caused by I/O.
    Io(io::Error),
    /// The payload size differs from the size declared by the header.
    /// Both sizes are in bytes.
    Truncated { expected: usize, actual: usize },
}

impl ReadDataError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReadDataError::Io(_) => ErrorClass::Io,
            ReadDataError::Truncated { .. } => ErrorClass::TruncatedPayload,
        }
    }
}

impl Error for ReadDataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReadDataError::Io(err) => Some(err),
            ReadDataError::Truncated { .. } => None,
        }
    }
}

impl fmt::Display for ReadDataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadDataError::Io(err) => write!(f, "I/O error: {}", err),
            ReadDataError::Truncated { expected, actual } => write!(
                f,
                "payload holds {} bytes but the header declares {}",
                actual, expected
            ),
        }
    }
}

impl From<io::Error> for ReadDataError {
    fn from(err: io::Error) -> ReadDataError {
        ReadDataError::Io(err)
    }
}

/// Returns `Ok(_)` iff the `reader` had no more bytes on entry to this
/// function. `expected` is the number of payload bytes already read and is
/// only used for the error report.
///
/// **Warning** This will consume the remainder of the reader.
fn check_for_extra_bytes<R: Read>(reader: &mut R, expected: usize) -> Result<(), ReadDataError> {
    let num_extra_bytes = io::copy(reader, &mut io::sink())?;
    if num_extra_bytes == 0 {
        Ok(())
    } else {
        Err(ReadDataError::Truncated {
            expected,
            actual: expected.saturating_add(num_extra_bytes as usize),
        })
    }
}

/// Reads exactly `len` big-endian `f32` values, which must be the rest of
/// the reader.
///
/// The caller must ensure that `len * 4` does not overflow; the typed
/// header views check this.
pub(crate) fn read_f32_payload<R: Read>(mut reader: R, len: usize) -> Result<Vec<f32>, ReadDataError> {
    let expected = len * ELEMENT_SIZE;
    let mut bytes = Vec::with_capacity(expected);
    reader
        .by_ref()
        .take(expected as u64)
        .read_to_end(&mut bytes)?;
    if bytes.len() < expected {
        return Err(ReadDataError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    check_for_extra_bytes(&mut reader, expected)?;
    let mut out = vec![0.; len];
    BigEndian::read_f32_into(&bytes, &mut out);
    Ok(out)
}
