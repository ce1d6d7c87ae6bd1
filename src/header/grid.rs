//! `.3ds` grid header.
//!
//! The header consists of `Key=Value` lines (values optionally wrapped in
//! double quotes) terminated by the line `:HEADER_END:`. The binary payload
//! starts right after that line.

use super::{
    normalize_key, parse_numbers, parse_number, parse_pair, split_list, HeaderMap, HeaderValue,
    LineReader, ParseHeaderError, ReadHeaderError,
};
use std::io;

/// End-of-header sentinel line.
pub const HEADER_END: &str = ":HEADER_END:";

/// Name of the fixed parameter holding the first sweep value.
pub const SWEEP_START: &str = "Sweep Start";
/// Name of the fixed parameter holding the last sweep value.
pub const SWEEP_END: &str = "Sweep End";

/// Size in bytes of one payload element.
const ELEMENT_SIZE: usize = 4;

/// Reads the header, returning the map and the payload offset in bytes.
pub fn read_grid_header<R: io::BufRead>(reader: R) -> Result<(HeaderMap, usize), ReadHeaderError> {
    let mut lines = LineReader::new(reader);
    let mut map = HeaderMap::new();
    loop {
        let line = match lines.next_line()? {
            Some(line) => line,
            None => return Err(ParseHeaderError::MissingSentinel(HEADER_END).into()),
        };
        let trimmed = line.trim();
        if trimmed == HEADER_END {
            break;
        }
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.split_once('=') {
            Some((key, value)) => insert_entry(&mut map, key.trim(), unquote(value))?,
            None => return Err(ParseHeaderError::MalformedLine(line).into()),
        }
    }
    Ok((map, lines.consumed()))
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Types one raw entry according to the `.3ds` schema.
fn insert_entry(map: &mut HeaderMap, key: &str, value: &str) -> Result<(), ParseHeaderError> {
    match key {
        "Grid dim" => map.insert("dim_px", HeaderValue::Pair(parse_pair(key, value, Some('x'))?)),
        "Grid settings" => {
            let settings = parse_numbers(key, value, Some(';'))?;
            if settings.len() != 5 {
                return Err(ParseHeaderError::IllegalValue {
                    key: key.to_owned(),
                    value: value.to_owned(),
                });
            }
            map.insert("pos_xy", HeaderValue::Pair([settings[0], settings[1]]));
            map.insert("size_xy", HeaderValue::Pair([settings[2], settings[3]]));
            map.insert("angle", HeaderValue::Number(settings[4]));
        }
        "Sweep Signal" => map.insert("sweep_signal", HeaderValue::Text(value.to_owned())),
        "Fixed parameters" => {
            map.insert("fixed_parameters", HeaderValue::List(split_list(value, ';')))
        }
        "Experiment parameters" => map.insert(
            "experimental_parameters",
            HeaderValue::List(split_list(value, ';')),
        ),
        "Channels" => map.insert("channels", HeaderValue::List(split_list(value, ';'))),
        "# Parameters (4 byte)" => {
            map.insert("num_parameters", HeaderValue::Number(parse_number(key, value)?))
        }
        "Experiment size (bytes)" => {
            map.insert("experiment_size", HeaderValue::Number(parse_number(key, value)?))
        }
        "Points" => map.insert("num_sweep_signal", HeaderValue::Number(parse_number(key, value)?)),
        "Delay before measuring (s)" => map.insert(
            "delay_before_measuring",
            HeaderValue::Number(parse_number(key, value)?),
        ),
        other => map.insert(normalize_key(other), HeaderValue::Text(value.to_owned())),
    }
    Ok(())
}

/// Typed view of a `.3ds` header, validated for internal consistency.
#[derive(Clone, Debug, PartialEq)]
pub struct GridHeader {
    /// Number of grid points along x and y.
    pub dim_px: [usize; 2],
    /// Grid center in meters, if recorded.
    pub pos_xy: Option<[f64; 2]>,
    /// Grid width and height in meters, if recorded.
    pub size_xy: Option<[f64; 2]>,
    /// Grid rotation in degrees, if recorded.
    pub angle: Option<f64>,
    /// Name of the swept signal, e.g. `Bias (V)`.
    pub sweep_signal: Option<String>,
    pub fixed_parameters: Vec<String>,
    pub experimental_parameters: Vec<String>,
    pub channels: Vec<String>,
    pub num_parameters: usize,
    pub num_sweep_signal: usize,
}

impl GridHeader {
    pub fn from_map(map: &HeaderMap) -> Result<GridHeader, ParseHeaderError> {
        let optional_list = |key: &str| -> Result<Vec<String>, ParseHeaderError> {
            if map.contains_key(key) {
                Ok(map.list(key)?.to_vec())
            } else {
                Ok(Vec::new())
            }
        };
        let header = GridHeader {
            dim_px: map.counts("dim_px")?,
            pos_xy: map.get("pos_xy").map(|_| map.pair("pos_xy")).transpose()?,
            size_xy: map.get("size_xy").map(|_| map.pair("size_xy")).transpose()?,
            angle: map.get("angle").map(|_| map.number("angle")).transpose()?,
            sweep_signal: map
                .get("sweep_signal")
                .map(|_| map.text("sweep_signal").map(str::to_owned))
                .transpose()?,
            fixed_parameters: optional_list("fixed_parameters")?,
            experimental_parameters: optional_list("experimental_parameters")?,
            channels: map.list("channels")?.to_vec(),
            num_parameters: map.count("num_parameters")?,
            num_sweep_signal: map.count("num_sweep_signal")?,
        };

        if header.dim_px.contains(&0) {
            return Err(ParseHeaderError::IllegalValue {
                key: "dim_px".to_owned(),
                value: format!("{} x {}", header.dim_px[0], header.dim_px[1]),
            });
        }
        if header.num_sweep_signal == 0 {
            return Err(ParseHeaderError::IllegalValue {
                key: "num_sweep_signal".to_owned(),
                value: "0".to_owned(),
            });
        }
        let num_names = header.fixed_parameters.len() + header.experimental_parameters.len();
        if num_names != 0 && num_names != header.num_parameters {
            return Err(ParseHeaderError::IllegalValue {
                key: "num_parameters".to_owned(),
                value: format!(
                    "{} (but {} parameter names are declared)",
                    header.num_parameters, num_names
                ),
            });
        }
        if map.contains_key("experiment_size") {
            let experiment_size = map.count("experiment_size")?;
            let expected = header
                .channels
                .len()
                .checked_mul(header.num_sweep_signal)
                .and_then(|n| n.checked_mul(ELEMENT_SIZE));
            if expected != Some(experiment_size) {
                return Err(ParseHeaderError::IllegalValue {
                    key: "experiment_size".to_owned(),
                    value: format!(
                        "{} (but {} channels x {} points are declared)",
                        experiment_size,
                        header.channels.len(),
                        header.num_sweep_signal
                    ),
                });
            }
        }
        if header.payload_len().is_none() {
            return Err(ParseHeaderError::IllegalValue {
                key: "dim_px".to_owned(),
                value: format!("{} x {} (payload too large)", header.dim_px[0], header.dim_px[1]),
            });
        }
        Ok(header)
    }

    /// Number of grid points, `nx * ny`.
    pub fn num_points(&self) -> usize {
        self.dim_px[0] * self.dim_px[1]
    }

    /// Number of `f32` values stored per grid point.
    pub fn record_len(&self) -> usize {
        self.num_parameters + self.channels.len() * self.num_sweep_signal
    }

    /// Total number of `f32` values in the payload, or `None` on overflow.
    /// Always `Some` for a header returned by `from_map`.
    pub fn payload_len(&self) -> Option<usize> {
        let per_point = self
            .channels
            .len()
            .checked_mul(self.num_sweep_signal)?
            .checked_add(self.num_parameters)?;
        let total = self.dim_px[0]
            .checked_mul(self.dim_px[1])?
            .checked_mul(per_point)?;
        total.checked_mul(ELEMENT_SIZE)?;
        Some(total)
    }

    /// Parameter names in payload column order: fixed, then experimental.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.fixed_parameters
            .iter()
            .chain(&self.experimental_parameters)
            .map(String::as_str)
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameter_names().position(|p| p == name)
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c == name)
    }
}
