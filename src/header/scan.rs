//! `.sxm` scan header.
//!
//! Each entry is a tag line `:NAME:` followed by zero or more value lines.
//! The header ends with `:SCANIT_END:`; the payload starts after the
//! `0x1A 0x04` marker that follows it.

use super::{
    normalize_key, parse_number, parse_pair, HeaderMap, HeaderValue, LineReader,
    ParseHeaderError, ReadHeaderError,
};
use crate::scan::Direction;
use std::io;

/// End-of-header sentinel tag.
pub const SCANIT_END: &str = ":SCANIT_END:";

/// Marker separating the header from the binary payload.
const DATA_MARKER: [u8; 2] = [0x1a, 0x04];

/// Size in bytes of one payload element.
const ELEMENT_SIZE: usize = 4;

/// Reads the header, returning the map and the payload offset in bytes.
pub fn read_scan_header<R: io::BufRead>(reader: R) -> Result<(HeaderMap, usize), ReadHeaderError> {
    let mut lines = LineReader::new(reader);
    let mut map = HeaderMap::new();
    let mut current: Option<(String, Vec<String>)> = None;
    loop {
        let line = match lines.next_line()? {
            Some(line) => line,
            None => return Err(ParseHeaderError::MissingSentinel(SCANIT_END).into()),
        };
        let trimmed = line.trim();
        if trimmed == SCANIT_END {
            if let Some((tag, values)) = current.take() {
                insert_entry(&mut map, &tag, &values)?;
            }
            break;
        }
        match tag_name(trimmed) {
            Some(tag) => {
                if let Some((prev, values)) = current.replace((tag.to_owned(), Vec::new())) {
                    insert_entry(&mut map, &prev, &values)?;
                }
            }
            None => match current {
                Some((_, ref mut values)) => values.push(line),
                None if trimmed.is_empty() => {}
                None => return Err(ParseHeaderError::MalformedLine(line).into()),
            },
        }
    }
    if !lines.skip_past(DATA_MARKER)? {
        return Err(ParseHeaderError::MissingDataMarker.into());
    }
    Ok((map, lines.consumed()))
}

/// Returns `NAME` for a line of the form `:NAME:`.
fn tag_name(line: &str) -> Option<&str> {
    let name = line.strip_prefix(':')?.strip_suffix(':')?;
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Types one tag according to the `.sxm` schema.
fn insert_entry(map: &mut HeaderMap, tag: &str, lines: &[String]) -> Result<(), ParseHeaderError> {
    let joined = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let key = normalize_key(tag);
    let value = match tag {
        "SCAN_PIXELS" | "SCAN_RANGE" | "SCAN_OFFSET" | "SCAN_TIME" => {
            HeaderValue::Pair(parse_pair(tag, &joined, None)?)
        }
        "SCAN_ANGLE" | "BIAS" | "ACQ_TIME" => HeaderValue::Number(parse_number(tag, &joined)?),
        "DATA_INFO" | "Z-CONTROLLER" => HeaderValue::Table(
            lines
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .map(|l| l.split('\t').map(|cell| cell.trim().to_owned()).collect())
                .collect(),
        ),
        _ => HeaderValue::Text(joined),
    };
    map.insert(key, value);
    Ok(())
}

/// Directions recorded for a channel, from the `Direction` column of
/// `DATA_INFO`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directions {
    Both,
    Forward,
    Backward,
}

impl Directions {
    fn parse(raw: &str) -> Option<Directions> {
        match raw {
            "both" => Some(Directions::Both),
            "forward" => Some(Directions::Forward),
            "backward" => Some(Directions::Backward),
            _ => None,
        }
    }

    /// Directions in payload order.
    pub fn recorded(self) -> &'static [Direction] {
        match self {
            Directions::Both => &[Direction::Forward, Direction::Backward],
            Directions::Forward => &[Direction::Forward],
            Directions::Backward => &[Direction::Backward],
        }
    }

    pub fn contains(self, direction: Direction) -> bool {
        self.recorded().contains(&direction)
    }
}

/// One row of `DATA_INFO`.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelInfo {
    /// Nanonis signal index, if recorded.
    pub index: Option<u32>,
    pub name: String,
    pub unit: String,
    pub directions: Directions,
    pub calibration: f64,
    pub offset: f64,
}

/// Typed view of an `.sxm` header.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanHeader {
    /// Pixels along x and y.
    pub scan_pixels: [usize; 2],
    /// Scan frame size in meters.
    pub scan_range: [f64; 2],
    /// Scan frame center in meters.
    pub scan_offset: [f64; 2],
    /// Frame rotation in degrees.
    pub scan_angle: f64,
    /// `up` or `down`, if recorded.
    pub scan_dir: Option<String>,
    pub bias: Option<f64>,
    pub acq_time: Option<f64>,
    pub data_info: Vec<ChannelInfo>,
}

impl ScanHeader {
    pub fn from_map(map: &HeaderMap) -> Result<ScanHeader, ParseHeaderError> {
        let header = ScanHeader {
            scan_pixels: map.counts("scan_pixels")?,
            scan_range: map.pair("scan_range")?,
            scan_offset: map.pair("scan_offset")?,
            scan_angle: match map.get("scan_angle") {
                Some(_) => map.number("scan_angle")?,
                None => 0.,
            },
            scan_dir: map
                .get("scan_dir")
                .map(|_| map.text("scan_dir").map(str::to_owned))
                .transpose()?,
            bias: map.get("bias").map(|_| map.number("bias")).transpose()?,
            acq_time: map.get("acq_time").map(|_| map.number("acq_time")).transpose()?,
            data_info: parse_data_info(map.table("data_info")?)?,
        };
        if header.payload_len().is_none() {
            let [nx, ny] = header.scan_pixels;
            return Err(ParseHeaderError::IllegalValue {
                key: "scan_pixels".to_owned(),
                value: format!("{} {} (payload too large)", nx, ny),
            });
        }
        Ok(header)
    }

    /// Number of `f32` values in one image, `nx * ny`. Saturates on
    /// overflow, which `from_map` rules out.
    pub fn image_len(&self) -> usize {
        self.scan_pixels[0].saturating_mul(self.scan_pixels[1])
    }

    /// Number of images in the payload: one per recorded direction of
    /// each channel.
    pub fn num_images(&self) -> usize {
        self.data_info
            .iter()
            .map(|c| c.directions.recorded().len())
            .sum()
    }

    /// Total number of `f32` values in the payload, or `None` on overflow.
    /// Always `Some` for a header returned by `from_map`.
    pub fn payload_len(&self) -> Option<usize> {
        let total = self.scan_pixels[0]
            .checked_mul(self.scan_pixels[1])?
            .checked_mul(self.num_images())?;
        total.checked_mul(ELEMENT_SIZE)?;
        Some(total)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelInfo> {
        self.data_info.iter().find(|c| c.name == name)
    }
}

fn parse_data_info(rows: &[Vec<String>]) -> Result<Vec<ChannelInfo>, ParseHeaderError> {
    const KEY: &str = "data_info";
    let illegal = |value: String| ParseHeaderError::IllegalValue {
        key: KEY.to_owned(),
        value,
    };
    let (columns, rows) = rows
        .split_first()
        .ok_or_else(|| illegal(String::new()))?;
    let column = |name: &str| columns.iter().position(|c| c == name);
    let name_col = column("Name").ok_or_else(|| ParseHeaderError::MissingKey("data_info.Name".into()))?;
    let dir_col = column("Direction")
        .ok_or_else(|| ParseHeaderError::MissingKey("data_info.Direction".into()))?;
    let index_col = column("Channel");
    let unit_col = column("Unit");
    let cal_col = column("Calibration");
    let offset_col = column("Offset");

    rows.iter()
        .map(|row| {
            let cell = |col: Option<usize>| col.and_then(|c| row.get(c)).map(String::as_str);
            let number = |col: Option<usize>, default: f64| match cell(col) {
                Some(raw) => parse_number(KEY, raw),
                None => Ok(default),
            };
            let name = cell(Some(name_col)).ok_or_else(|| illegal(row.join("\t")))?;
            let directions = cell(Some(dir_col))
                .and_then(Directions::parse)
                .ok_or_else(|| illegal(row.join("\t")))?;
            let index = match cell(index_col) {
                Some(raw) => Some(raw.parse::<u32>().map_err(|_| illegal(row.join("\t")))?),
                None => None,
            };
            Ok(ChannelInfo {
                index,
                name: name.to_owned(),
                unit: cell(unit_col).unwrap_or_default().to_owned(),
                directions,
                calibration: number(cal_col, 1.)?,
                offset: number(offset_col, 0.)?,
            })
        })
        .collect()
}
