//! Hand-off of named arrays to the calling process as a `.npz` archive.
//!
//! Each array is stored as a little-endian `.npy` member named
//! `<name>.npy`, which is what [`numpy.load`] and MATLAB's npy readers
//! expect.
//!
//! [`numpy.load`]: https://numpy.org/doc/stable/reference/generated/numpy.load.html

use byteorder::{LittleEndian, WriteBytesExt};
use ndarray::{ArrayBase, Data, Dimension};
use py_literal::{FormatError as PyValueFormatError, Value as PyValue};
use std::error::Error;
use std::fmt;
use std::io::{self, Seek, Write};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Magic string to indicate npy format.
const MAGIC_STRING: &[u8] = b"\x93NUMPY";

/// Total header length is padded to a multiple of this.
const HEADER_ALIGN: usize = 64;

/// An element type that can be handed off.
pub trait HandoffElement: Copy {
    /// Little-endian NumPy type descriptor.
    const DESCR: &'static str;

    fn write<W: Write>(self, writer: W) -> io::Result<()>;
}

impl HandoffElement for f32 {
    const DESCR: &'static str = "<f4";

    fn write<W: Write>(self, mut writer: W) -> io::Result<()> {
        writer.write_f32::<LittleEndian>(self)
    }
}

impl HandoffElement for f64 {
    const DESCR: &'static str = "<f8";

    fn write<W: Write>(self, mut writer: W) -> io::Result<()> {
        writer.write_f64::<LittleEndian>(self)
    }
}

/// An error writing the hand-off archive.
#[derive(Debug)]
pub enum WriteHandoffError {
    /// An error caused by I/O.
    Io(io::Error),
    /// An error caused by the zip archive.
    Zip(ZipError),
    /// An error formatting an `.npy` header.
    Format(PyValueFormatError),
}

impl WriteHandoffError {
    pub fn class(&self) -> crate::ErrorClass {
        crate::ErrorClass::Io
    }
}

impl Error for WriteHandoffError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WriteHandoffError::Io(err) => Some(err),
            WriteHandoffError::Zip(err) => Some(err),
            WriteHandoffError::Format(err) => Some(err),
        }
    }
}

impl fmt::Display for WriteHandoffError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WriteHandoffError::Io(err) => write!(f, "I/O error: {}", err),
            WriteHandoffError::Zip(err) => write!(f, "zip file error: {}", err),
            WriteHandoffError::Format(err) => write!(f, "error formatting npy header: {}", err),
        }
    }
}

impl From<io::Error> for WriteHandoffError {
    fn from(err: io::Error) -> WriteHandoffError {
        WriteHandoffError::Io(err)
    }
}

impl From<ZipError> for WriteHandoffError {
    fn from(err: ZipError) -> WriteHandoffError {
        WriteHandoffError::Zip(err)
    }
}

impl From<PyValueFormatError> for WriteHandoffError {
    fn from(err: PyValueFormatError) -> WriteHandoffError {
        WriteHandoffError::Format(err)
    }
}

/// Formats the `.npy` header for a C-order array of `descr` with `shape`.
fn npy_header(descr: &str, shape: &[usize]) -> Result<Vec<u8>, PyValueFormatError> {
    let dict = PyValue::Dict(vec![
        (PyValue::String("descr".into()), PyValue::String(descr.into())),
        (PyValue::String("fortran_order".into()), PyValue::Boolean(false)),
        (
            PyValue::String("shape".into()),
            PyValue::Tuple(shape.iter().map(|&n| PyValue::Integer(n.into())).collect()),
        ),
    ]);
    let mut arr_format = Vec::new();
    dict.write_ascii(&mut arr_format)?;

    // Version 1.0 stores the header length in 2 bytes, version 2.0 in 4.
    const NEWLINE_LEN: usize = 1;
    let (major, len_bytes) = if arr_format.len() + NEWLINE_LEN + HEADER_ALIGN > u16::MAX as usize {
        (2u8, 4)
    } else {
        (1u8, 2)
    };
    let prefix_len = MAGIC_STRING.len() + 2 + len_bytes;
    let unpadded = prefix_len + arr_format.len() + NEWLINE_LEN;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    arr_format.extend(std::iter::repeat(b' ').take(padding));
    arr_format.push(b'\n');

    let mut out = Vec::with_capacity(prefix_len + arr_format.len());
    out.extend_from_slice(MAGIC_STRING);
    out.push(major);
    out.push(0);
    if major == 1 {
        out.extend_from_slice(&(arr_format.len() as u16).to_le_bytes());
    } else {
        out.extend_from_slice(&(arr_format.len() as u32).to_le_bytes());
    }
    out.extend_from_slice(&arr_format);
    debug_assert_eq!(out.len() % HEADER_ALIGN, 0);
    Ok(out)
}

/// Writer for the hand-off archive.
///
/// # Example
///
/// ```no_run
/// use ndarray::{array, arr0};
/// use nanonis_read::HandoffWriter;
/// use std::fs::File;
///
/// let mut handoff = HandoffWriter::new(File::create("arrays.npz")?);
/// handoff.add_array("sweep_signal", &array![-1f32, 0., 1.])?;
/// handoff.add_array("x_offset_img_nm", &arr0(12.5f64))?;
/// handoff.finish()?;
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
pub struct HandoffWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: FileOptions,
}

impl<W: Write + Seek> HandoffWriter<W> {
    /// Creates a new uncompressed archive, like [`numpy.savez`].
    ///
    /// [`numpy.savez`]: https://numpy.org/doc/stable/reference/generated/numpy.savez.html
    pub fn new(writer: W) -> HandoffWriter<W> {
        HandoffWriter {
            zip: ZipWriter::new(writer),
            options: FileOptions::default().compression_method(CompressionMethod::Stored),
        }
    }

    /// Adds an array named `name`, in C order.
    pub fn add_array<A, S, D>(&mut self, name: &str, array: &ArrayBase<S, D>) -> Result<(), WriteHandoffError>
    where
        A: HandoffElement,
        S: Data<Elem = A>,
        D: Dimension,
    {
        self.zip.start_file(format!("{}.npy", name), self.options)?;
        self.zip.write_all(&npy_header(A::DESCR, array.shape())?)?;
        let mut writer = io::BufWriter::new(&mut self.zip);
        for &elem in array.iter() {
            elem.write(&mut writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Finishes the archive and flushes and returns the writer.
    ///
    /// Errors during drop are ignored, so this must be called to detect
    /// them.
    pub fn finish(mut self) -> Result<W, WriteHandoffError> {
        let mut writer = self.zip.finish()?;
        writer.flush()?;
        Ok(writer)
    }
}
