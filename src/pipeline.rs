//! The decode-and-rescale pass over a grid file and an optional scan file.

use crate::grid::{GridFile, GridOptions, ReadGridError};
use crate::scan::{Direction, InvalidDirection, ReadScanError, ScanFile, ScanOptions};
use crate::units::{Scale, ScaleExt};
use crate::ErrorClass;
use log::info;
use ndarray::prelude::*;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(feature = "npz")]
use crate::handoff::{HandoffWriter, WriteHandoffError};
#[cfg(feature = "npz")]
use std::io::{Seek, Write};

/// Channel of the scan file holding the topography.
const TOPOGRAPHY_CHANNEL: &str = "Z";

/// What to decode and how.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub grid_path: PathBuf,
    pub scan_path: Option<PathBuf>,
    /// Scan direction of the topography; `None` means forward.
    pub direction: Option<Direction>,
    pub grid: GridOptions,
    pub scale: Scale,
}

impl PipelineConfig {
    /// Decodes the grid file at `grid_path` only, with default options.
    pub fn new<P: Into<PathBuf>>(grid_path: P) -> PipelineConfig {
        PipelineConfig {
            grid_path: grid_path.into(),
            scan_path: None,
            direction: None,
            grid: GridOptions::default(),
            scale: Scale::default(),
        }
    }

    /// Adds the companion scan file. `direction` must be `forward` or
    /// `backward` if given; it is checked here, before anything is decoded.
    pub fn with_scan<P: Into<PathBuf>>(
        mut self,
        scan_path: P,
        direction: Option<&str>,
    ) -> Result<PipelineConfig, InvalidDirection> {
        self.direction = direction.map(str::parse::<Direction>).transpose()?;
        self.scan_path = Some(scan_path.into());
        Ok(self)
    }

    pub fn direction(&self) -> Direction {
        self.direction.unwrap_or(Direction::Forward)
    }
}

/// Arrays derived from the grid file.
#[derive(Clone, Debug, PartialEq)]
pub struct GridArrays {
    /// `X (m)` parameter plane, `[nx, ny]`.
    pub x_params_nm: Array2<f32>,
    /// `Y (m)` parameter plane, `[nx, ny]`.
    pub y_params_nm: Array2<f32>,
    /// Never rescaled.
    pub sweep_signal: Array1<f32>,
    /// First decoded channel, `[nx, ny, num_sweep_signal]`.
    pub primary_channel_na: Array3<f32>,
}

/// Arrays derived from the scan file.
#[derive(Clone, Debug, PartialEq)]
pub struct TopoArrays {
    pub x_img_nm: Array1<f64>,
    pub y_img_nm: Array1<f64>,
    /// `Z` image in the configured direction, `[ny, nx]`.
    pub z_img_nm: Array2<f32>,
    pub x_offset_img_nm: f64,
    pub y_offset_img_nm: f64,
}

/// Everything produced by one pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedArrays {
    pub grid: GridArrays,
    pub topo: Option<TopoArrays>,
}

#[cfg(feature = "npz")]
impl DecodedArrays {
    /// Writes the arrays to `handoff` in their fixed order: `x_params_nm`,
    /// `y_params_nm`, `sweep_signal`, `primary_channel_nA`, then, if a scan
    /// was decoded, `x_img_nm`, `y_img_nm`, `z_img_nm`, `x_offset_img_nm`,
    /// `y_offset_img_nm`.
    pub fn write_to<W: Write + Seek>(&self, handoff: &mut HandoffWriter<W>) -> Result<(), WriteHandoffError> {
        let grid = &self.grid;
        handoff.add_array("x_params_nm", &grid.x_params_nm)?;
        handoff.add_array("y_params_nm", &grid.y_params_nm)?;
        handoff.add_array("sweep_signal", &grid.sweep_signal)?;
        handoff.add_array("primary_channel_nA", &grid.primary_channel_na)?;
        if let Some(topo) = &self.topo {
            handoff.add_array("x_img_nm", &topo.x_img_nm)?;
            handoff.add_array("y_img_nm", &topo.y_img_nm)?;
            handoff.add_array("z_img_nm", &topo.z_img_nm)?;
            handoff.add_array("x_offset_img_nm", &arr0(topo.x_offset_img_nm))?;
            handoff.add_array("y_offset_img_nm", &arr0(topo.y_offset_img_nm))?;
        }
        Ok(())
    }
}

/// A failure decoding one of the input files.
#[derive(Debug)]
pub enum DecodeError {
    Grid { path: PathBuf, source: ReadGridError },
    Scan { path: PathBuf, source: ReadScanError },
}

impl DecodeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DecodeError::Grid { source, .. } => source.class(),
            DecodeError::Scan { source, .. } => source.class(),
        }
    }

    /// The file that failed to decode.
    pub fn path(&self) -> &Path {
        match self {
            DecodeError::Grid { path, .. } | DecodeError::Scan { path, .. } => path,
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DecodeError::Grid { source, .. } => Some(source),
            DecodeError::Scan { source, .. } => Some(source),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::Grid { path, source } => {
                write!(f, "{} in grid file {}: {}", self.class(), path.display(), source)
            }
            DecodeError::Scan { path, source } => {
                write!(f, "{} in scan file {}: {}", self.class(), path.display(), source)
            }
        }
    }
}

/// Runs a [`PipelineConfig`].
///
/// # Example
///
/// ```no_run
/// use nanonis_read::{Pipeline, PipelineConfig};
///
/// let config = PipelineConfig::new("spectra.3ds").with_scan("topo.sxm", Some("backward"))?;
/// let decoded = Pipeline::new(config).run()?;
/// println!("{:?}", decoded.grid.primary_channel_na.dim());
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Pipeline {
        Pipeline { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Decodes the grid file, then the scan file if one is configured.
    pub fn run(&self) -> Result<DecodedArrays, DecodeError> {
        let grid_path = &self.config.grid_path;
        let grid = self
            .decode_grid()
            .map_err(|source| DecodeError::Grid {
                path: grid_path.clone(),
                source,
            })?;
        info!(
            "decoded grid {}: {:?} points x {} sweep points",
            grid_path.display(),
            grid.primary_channel_na.shape()[..2].to_vec(),
            grid.sweep_signal.len(),
        );

        let topo = match &self.config.scan_path {
            Some(scan_path) => {
                let topo = self.decode_scan(scan_path).map_err(|source| DecodeError::Scan {
                    path: scan_path.clone(),
                    source,
                })?;
                info!(
                    "decoded scan {} ({}): {} x {} pixels",
                    scan_path.display(),
                    self.config.direction(),
                    topo.x_img_nm.len(),
                    topo.y_img_nm.len(),
                );
                Some(topo)
            }
            None => None,
        };

        Ok(DecodedArrays { grid, topo })
    }

    fn decode_grid(&self) -> Result<GridArrays, ReadGridError> {
        let scale = self.config.scale;
        let grid = GridFile::open(&self.config.grid_path, &self.config.grid)?;
        let (x, y) = grid.coordinates()?;
        let (_, primary) = grid
            .channels()
            .next()
            .ok_or_else(|| ReadGridError::ChannelNotFound("(no channel declared)".to_owned()))?;
        Ok(GridArrays {
            x_params_nm: x.to_scale(scale),
            y_params_nm: y.to_scale(scale),
            sweep_signal: grid.sweep_signal().clone(),
            primary_channel_na: primary.to_scale(scale),
        })
    }

    fn decode_scan(&self, path: &Path) -> Result<TopoArrays, ReadScanError> {
        let scale = self.config.scale;
        let options = ScanOptions {
            channels: Some(vec![TOPOGRAPHY_CHANNEL.to_owned()]),
        };
        let scan = ScanFile::open(path, &options)?;
        let z = scan.signal(TOPOGRAPHY_CHANNEL, self.config.direction())?;
        let (x_img, y_img) = scan.image_axes();
        let [x_offset, y_offset] = scan.scan_header().scan_offset;
        Ok(TopoArrays {
            x_img_nm: x_img.to_scale(scale),
            y_img_nm: y_img.to_scale(scale),
            z_img_nm: z.to_scale(scale),
            x_offset_img_nm: x_offset.to_scale(scale),
            y_offset_img_nm: y_offset.to_scale(scale),
        })
    }
}
