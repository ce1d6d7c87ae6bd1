use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use log::LevelFilter;
use nanonis_read::{ChannelLayout, HandoffWriter, Pipeline, PipelineConfig, Scale, SweepSource};
use std::fs::File;
use std::io::{self, BufWriter, Cursor, Write};
use std::path::PathBuf;

/// Decode a Nanonis grid file (and optionally a topography scan) into a
/// `.npz` archive of named arrays
#[derive(Parser)]
#[command(name = "nanonis-read")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Grid spectroscopy file (.3ds)
    #[arg(value_name = "GRID")]
    grid: PathBuf,

    /// Topography scan file (.sxm)
    #[arg(value_name = "SCAN")]
    scan: Option<PathBuf>,

    /// Scan direction of the topography: forward or backward
    #[arg(value_name = "DIRECTION", requires = "scan")]
    direction: Option<String>,

    /// Output archive path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Keep SI units instead of converting to nm and nA
    #[arg(long)]
    raw: bool,

    /// Interleaving of the channels in each grid point record
    #[arg(long, value_enum, default_value = "channel-major")]
    layout: Layout,

    /// Source of the sweep axis
    #[arg(long, value_enum, default_value = "auto")]
    sweep: Sweep,

    /// Raise the log level (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, ValueEnum)]
enum Layout {
    /// All sweep points of one channel, then the next channel
    ChannelMajor,
    /// All channels of one sweep point, then the next sweep point
    SweepMajor,
}

#[derive(Debug, Clone, ValueEnum)]
enum Sweep {
    /// Recorded sweep channel if present, else the sweep parameters
    Auto,
    /// Values of the channel named like the sweep signal
    Channel,
    /// Points spaced evenly between the Sweep Start and Sweep End parameters
    Parameters,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        })
        .parse_default_env()
        .init();

    let config = build_config(&cli)?;
    let decoded = Pipeline::new(config).run()?;

    let mut handoff = HandoffWriter::new(Cursor::new(Vec::new()));
    decoded
        .write_to(&mut handoff)
        .context("Failed to encode arrays")?;
    let bytes = handoff.finish().context("Failed to encode arrays")?.into_inner();

    match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&bytes)?;
            writer.flush()?;
            log::info!("wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&bytes).context("Failed to write to stdout")?;
            stdout.flush()?;
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::new(&cli.grid);
    if let Some(scan) = &cli.scan {
        config = config.with_scan(scan, cli.direction.as_deref())?;
    }
    config.grid.layout = match cli.layout {
        Layout::ChannelMajor => ChannelLayout::ChannelMajor,
        Layout::SweepMajor => ChannelLayout::SweepMajor,
    };
    config.grid.sweep = match cli.sweep {
        Sweep::Auto => SweepSource::Auto,
        Sweep::Channel => SweepSource::Channel,
        Sweep::Parameters => SweepSource::Parameters,
    };
    if cli.raw {
        config.scale = Scale::Raw;
    }
    Ok(config)
}
