//! Parsing of the ASCII headers of `.3ds` and `.sxm` files.
//!
//! Both formats start with a block of ASCII metadata terminated by a
//! sentinel line. The raw entries are typed according to a fixed,
//! per-format schema keyed by field name (see [`grid`] and [`scan`]) and
//! collected into a [`HeaderMap`] whose keys are normalized to snake_case.

pub mod grid;
pub mod scan;

use crate::ErrorClass;
use byteorder::ReadBytesExt;
use num_traits::ToPrimitive;
use std::error::Error;
use std::fmt;
use std::io;

/// A typed header value.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
    Text(String),
    Number(f64),
    /// Range pairs and pixel counts, `(x, y)`.
    Pair([f64; 2]),
    /// Channel and parameter names.
    List(Vec<String>),
    /// Rows of tab-separated cells. For `.sxm` tables the first row holds
    /// the column names.
    Table(Vec<Vec<String>>),
}

impl HeaderValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match *self {
            HeaderValue::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<[f64; 2]> {
        match *self {
            HeaderValue::Pair(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            HeaderValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&[Vec<String>]> {
        match self {
            HeaderValue::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HeaderValue::Text(s) => f.write_str(s),
            HeaderValue::Number(n) => write!(f, "{}", n),
            HeaderValue::Pair([x, y]) => write!(f, "{} {}", x, y),
            HeaderValue::List(items) => f.write_str(&items.join(";")),
            HeaderValue::Table(rows) => {
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    f.write_str(&row.join("\t"))?;
                }
                Ok(())
            }
        }
    }
}

/// Ordered mapping from normalized header key to typed value.
///
/// Keys are unique; inserting an existing key replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeaderMap {
    entries: Vec<(String, HeaderValue)>,
}

impl HeaderMap {
    pub fn new() -> HeaderMap {
        HeaderMap::default()
    }

    pub(crate) fn insert<K: Into<String>>(&mut self, key: K, value: HeaderValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates over the entries in the order they appeared in the file.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value for `key`, or `MissingKey` if it is absent.
    pub fn require(&self, key: &str) -> Result<&HeaderValue, ParseHeaderError> {
        self.get(key)
            .ok_or_else(|| ParseHeaderError::MissingKey(key.to_owned()))
    }

    pub fn text(&self, key: &str) -> Result<&str, ParseHeaderError> {
        let value = self.require(key)?;
        value.as_text().ok_or_else(|| illegal(key, value))
    }

    pub fn number(&self, key: &str) -> Result<f64, ParseHeaderError> {
        let value = self.require(key)?;
        value.as_number().ok_or_else(|| illegal(key, value))
    }

    pub fn pair(&self, key: &str) -> Result<[f64; 2], ParseHeaderError> {
        let value = self.require(key)?;
        value.as_pair().ok_or_else(|| illegal(key, value))
    }

    pub fn list(&self, key: &str) -> Result<&[String], ParseHeaderError> {
        let value = self.require(key)?;
        value.as_list().ok_or_else(|| illegal(key, value))
    }

    pub fn table(&self, key: &str) -> Result<&[Vec<String>], ParseHeaderError> {
        let value = self.require(key)?;
        value.as_table().ok_or_else(|| illegal(key, value))
    }

    /// Returns a number field as a count. The value must be a non-negative
    /// integer.
    pub fn count(&self, key: &str) -> Result<usize, ParseHeaderError> {
        let value = self.require(key)?;
        value
            .as_number()
            .and_then(to_count)
            .ok_or_else(|| illegal(key, value))
    }

    /// Returns a pair field as a pair of counts, e.g. pixel dimensions.
    pub fn counts(&self, key: &str) -> Result<[usize; 2], ParseHeaderError> {
        let value = self.require(key)?;
        match value.as_pair() {
            Some([x, y]) => match (to_count(x), to_count(y)) {
                (Some(x), Some(y)) => Ok([x, y]),
                _ => Err(illegal(key, value)),
            },
            None => Err(illegal(key, value)),
        }
    }
}

fn to_count(n: f64) -> Option<usize> {
    if n.fract() == 0. {
        n.to_usize()
    } else {
        None
    }
}

fn illegal(key: &str, value: &HeaderValue) -> ParseHeaderError {
    ParseHeaderError::IllegalValue {
        key: key.to_owned(),
        value: value.to_string(),
    }
}

#[derive(Debug)]
pub enum ParseHeaderError {
    /// The stream ended before the end-of-header sentinel.
    MissingSentinel(&'static str),
    /// The `.sxm` binary data marker (`0x1A 0x04`) was not found after the
    /// sentinel.
    MissingDataMarker,
    /// A line that is neither an entry nor the sentinel.
    MalformedLine(String),
    MissingKey(String),
    IllegalValue {
        key: String,
        value: String,
    },
}

impl ParseHeaderError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::MalformedHeader
    }
}

impl Error for ParseHeaderError {}

impl fmt::Display for ParseHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ParseHeaderError::*;
        match self {
            MissingSentinel(sentinel) => {
                write!(f, "end of header {} not found before end of file", sentinel)
            }
            MissingDataMarker => write!(f, "binary data marker missing after header"),
            MalformedLine(line) => write!(f, "malformed header line: {:?}", line),
            MissingKey(key) => write!(f, "missing key: {}", key),
            IllegalValue { key, value } => write!(f, "illegal value for key {}: {:?}", key, value),
        }
    }
}

#[derive(Debug)]
pub enum ReadHeaderError {
    Io(io::Error),
    Parse(ParseHeaderError),
}

impl ReadHeaderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReadHeaderError::Io(_) => ErrorClass::Io,
            ReadHeaderError::Parse(err) => err.class(),
        }
    }
}

impl Error for ReadHeaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReadHeaderError::Io(err) => Some(err),
            ReadHeaderError::Parse(err) => Some(err),
        }
    }
}

impl fmt::Display for ReadHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadHeaderError::Io(err) => write!(f, "I/O error: {}", err),
            ReadHeaderError::Parse(err) => write!(f, "error parsing header: {}", err),
        }
    }
}

impl From<io::Error> for ReadHeaderError {
    fn from(err: io::Error) -> ReadHeaderError {
        ReadHeaderError::Io(err)
    }
}

impl From<ParseHeaderError> for ReadHeaderError {
    fn from(err: ParseHeaderError) -> ReadHeaderError {
        ReadHeaderError::Parse(err)
    }
}

/// Line-oriented reader over the header that counts consumed bytes, so
/// that the payload offset is known once the sentinel has been read.
pub(crate) struct LineReader<R> {
    reader: R,
    consumed: usize,
    buf: Vec<u8>,
}

impl<R: io::BufRead> LineReader<R> {
    pub(crate) fn new(reader: R) -> LineReader<R> {
        LineReader {
            reader,
            consumed: 0,
            buf: Vec::new(),
        }
    }

    /// Returns the next line without its `\n`/`\r\n` terminator, or `None`
    /// at end of stream. Bytes that are not valid UTF-8 (Nanonis writes
    /// Latin-1 comments) are replaced.
    pub(crate) fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.consumed += n;
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_owned()))
    }

    /// Consumes bytes up to and including the two-byte `marker`. Returns
    /// `false` if the stream ends first.
    pub(crate) fn skip_past(&mut self, marker: [u8; 2]) -> io::Result<bool> {
        let mut prev = None;
        loop {
            let byte = match self.reader.read_u8() {
                Ok(byte) => byte,
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
                Err(err) => return Err(err),
            };
            self.consumed += 1;
            if prev == Some(marker[0]) && byte == marker[1] {
                return Ok(true);
            }
            prev = Some(byte);
        }
    }

    /// Number of bytes consumed so far.
    pub(crate) fn consumed(&self) -> usize {
        self.consumed
    }
}

/// Converts a raw header key to snake_case, e.g. `"Start time"` becomes
/// `"start_time"` and `"Z-CONTROLLER"` becomes `"z_controller"`.
pub(crate) fn normalize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

pub(crate) fn parse_number(key: &str, raw: &str) -> Result<f64, ParseHeaderError> {
    raw.trim()
        .parse()
        .map_err(|_| ParseHeaderError::IllegalValue {
            key: key.to_owned(),
            value: raw.to_owned(),
        })
}

/// Parses numbers separated by `sep`, or by whitespace if `sep` is `None`.
pub(crate) fn parse_numbers(
    key: &str,
    raw: &str,
    sep: Option<char>,
) -> Result<Vec<f64>, ParseHeaderError> {
    let parts: Vec<&str> = match sep {
        Some(sep) => raw.split(sep).map(str::trim).filter(|s| !s.is_empty()).collect(),
        None => raw.split_whitespace().collect(),
    };
    parts.into_iter().map(|p| parse_number(key, p)).collect()
}

pub(crate) fn parse_pair(
    key: &str,
    raw: &str,
    sep: Option<char>,
) -> Result<[f64; 2], ParseHeaderError> {
    let numbers = parse_numbers(key, raw, sep)?;
    match numbers[..] {
        [x, y] => Ok([x, y]),
        _ => Err(ParseHeaderError::IllegalValue {
            key: key.to_owned(),
            value: raw.to_owned(),
        }),
    }
}

pub(crate) fn split_list(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
