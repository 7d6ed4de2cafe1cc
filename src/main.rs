use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use serde::Serialize;

use gait_fusion::{
    OrientationConfig, OrientationDataset, OrientationFilter, OrientationSeries, SpeedSeries,
    VelocityConfig, VelocityDataset, VelocityFilter,
};

#[derive(Parser, Debug)]
#[command(name = "gait_fusion")]
#[command(about = "Kalman post-processing of wearable IMU recordings", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Roll and pitch from gyroscope + accelerometer channels
    Orientation {
        #[command(flatten)]
        io: IoArgs,

        /// Spline smoothing coefficient (0 = no smoothing)
        #[arg(long)]
        smoothing: Option<f64>,

        /// Skip baseline offset removal
        #[arg(long, default_value_t = false)]
        no_baseline: bool,
    },
    /// Forward speed from acceleration, pitch and position channels
    Velocity {
        #[command(flatten)]
        io: IoArgs,

        /// Spline smoothing coefficient (omit for raw estimates)
        #[arg(long)]
        smoothing: Option<f64>,
    },
}

#[derive(clap::Args, Debug)]
struct IoArgs {
    /// Dataset as JSON channels (.json or .json.gz)
    #[arg(long)]
    input: PathBuf,

    /// Filter configuration JSON; missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output file (stdout when omitted)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct Report<C, M, S> {
    generated_at: String,
    input: String,
    samples: usize,
    config: C,
    summary: M,
    series: S,
}

#[derive(Serialize)]
struct Summary {
    min: f64,
    max: f64,
    mean: f64,
}

#[derive(Serialize)]
struct OrientationSummary {
    roll: Summary,
    pitch: Summary,
}

#[derive(Serialize)]
struct SpeedSummary {
    speed: Summary,
}

impl Summary {
    fn of(values: &[f64]) -> Self {
        let n = values.len().max(1) as f64;
        Summary {
            min: values.iter().cloned().fold(f64::INFINITY, f64::min),
            max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            mean: values.iter().sum::<f64>() / n,
        }
    }
}

fn open_maybe_gz(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = open_maybe_gz(path)?;
    serde_json::from_reader(reader).with_context(|| format!("parsing {}", path.display()))
}

fn load_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) => load_json(path),
        None => Ok(T::default()),
    }
}

fn write_report<T: Serialize>(report: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("creating {}", path.display()))?;
            serde_json::to_writer_pretty(BufWriter::new(file), report)?;
            log::info!("Wrote {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            serde_json::to_writer_pretty(stdout.lock(), report)?;
            println!();
        }
    }
    Ok(())
}

fn run_orientation(io: &IoArgs, smoothing: Option<f64>, no_baseline: bool) -> Result<()> {
    let mut config: OrientationConfig = load_config(io.config.as_deref())?;
    if let Some(smoothing) = smoothing {
        config.smoothing_coefficient = smoothing;
    }
    if no_baseline {
        config.baseline = None;
    }

    let dataset: OrientationDataset = load_json(&io.input)?;
    log::info!(
        "Loaded {} orientation samples from {}",
        dataset.len(),
        io.input.display()
    );

    let mut filter = OrientationFilter::new(config.clone());
    let series: OrientationSeries = filter
        .analyze_dataset(&dataset)
        .context("orientation analysis failed")?;
    let summary = OrientationSummary {
        roll: Summary::of(&series.roll),
        pitch: Summary::of(&series.pitch),
    };
    log::info!(
        "Roll range {:.2}..{:.2} deg, pitch range {:.2}..{:.2} deg",
        summary.roll.min,
        summary.roll.max,
        summary.pitch.min,
        summary.pitch.max
    );

    let report = Report {
        generated_at: Utc::now().to_rfc3339(),
        input: io.input.display().to_string(),
        samples: series.len(),
        config,
        summary,
        series,
    };
    write_report(&report, io.output.as_deref())
}

fn run_velocity(io: &IoArgs, smoothing: Option<f64>) -> Result<()> {
    let mut config: VelocityConfig = load_config(io.config.as_deref())?;
    if smoothing.is_some() {
        config.smoothing_coefficient = smoothing;
    }

    let dataset: VelocityDataset = load_json(&io.input)?;
    log::info!(
        "Loaded {} velocity samples from {}",
        dataset.len(),
        io.input.display()
    );

    let mut filter = VelocityFilter::new(config.clone());
    let series: SpeedSeries = filter
        .analyze_dataset(&dataset)
        .context("velocity analysis failed")?;
    let summary = SpeedSummary {
        speed: Summary::of(&series.speed),
    };
    log::info!(
        "Speed range {:.3}..{:.3}, mean {:.3}",
        summary.speed.min,
        summary.speed.max,
        summary.speed.mean
    );

    let report = Report {
        generated_at: Utc::now().to_rfc3339(),
        input: io.input.display().to_string(),
        samples: series.len(),
        config,
        summary,
        series,
    };
    write_report(&report, io.output.as_deref())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match &args.command {
        Command::Orientation {
            io,
            smoothing,
            no_baseline,
        } => run_orientation(io, *smoothing, *no_baseline),
        Command::Velocity { io, smoothing } => run_velocity(io, *smoothing),
    }
}
