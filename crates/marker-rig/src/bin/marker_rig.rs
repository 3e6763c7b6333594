//! marker-rig CLI: drive a rig over a synthetic test pattern and print a
//! JSON summary.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clap::Parser;
use log::LevelFilter;
use marker_rig::core::{BoxError, FrameFormat, FrameSlot};
use marker_rig::pipeline::{FrameProcessor, ProcessFn};
use marker_rig::{Rig, RigParams, TestPatternSource};
use serde::Serialize;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser, Debug)]
#[command(name = "marker-rig")]
#[command(about = "Run a camera rig over a synthetic test pattern")]
#[command(version)]
struct Cli {
    /// Rig parameters (JSON). Built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to run.
    #[arg(long, default_value_t = 30)]
    ticks: usize,

    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, default_value = "warn")]
    log_level: LevelFilter,

    /// Frame width when the config lists no streams.
    #[arg(long, default_value_t = 64)]
    width: usize,

    /// Frame height when the config lists no streams.
    #[arg(long, default_value_t = 48)]
    height: usize,

    /// Report "no new frame" on every n-th request (0 = never).
    #[arg(long, default_value_t = 0)]
    skip_every: u64,

    /// Emit JSON log lines through `tracing`.
    #[cfg(feature = "tracing")]
    #[arg(long)]
    json_logs: bool,
}

#[derive(Serialize, Debug)]
struct Summary {
    camera: String,
    streams: Vec<FrameFormat>,
    ticks: usize,
    updates: u64,
    submissions: u64,
    presented: u64,
    last_seq: u64,
    tracked: u64,
    /// Mean intensity of stream 0 in the last tracked frame set.
    last_tracked_mean: Option<f64>,
}

fn init_logging(cli: &Cli) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    {
        let _ = cli.log_level;
        marker_rig::core::init_tracing(cli.json_logs);
        Ok(())
    }
    #[cfg(not(feature = "tracing"))]
    {
        marker_rig::core::init_with_level(cli.log_level)?;
        Ok(())
    }
}

/// Stand-in for a calibrated undistortion: inverts intensities so its effect
/// is visible in the output.
fn demo_undistortion() -> Box<dyn FrameProcessor + Send> {
    Box::new(|_: usize, frame: &mut FrameSlot| -> Result<(), BoxError> {
        for byte in frame.data_mut() {
            *byte = 255 - *byte;
        }
        Ok(())
    })
}

fn mean_intensity(frame: &FrameSlot) -> f64 {
    let sum: u64 = frame.data().iter().map(|&b| u64::from(b)).sum();
    sum as f64 / frame.len().max(1) as f64
}

fn run(cli: &Cli) -> CliResult<Summary> {
    let params = match &cli.config {
        Some(path) => RigParams::from_json_file(path)?,
        None => RigParams::default(),
    };
    let streams = if params.camera.streams.is_empty() {
        vec![FrameFormat::gray8(cli.width, cli.height)]
    } else {
        params.camera.streams.clone()
    };
    let source = TestPatternSource::new(&streams)?.with_skip_every(cli.skip_every);

    // Mean stored as f64 bits so the worker can publish it without a lock.
    let last_mean = Arc::new(AtomicU64::new(f64::NAN.to_bits()));
    let published = last_mean.clone();
    let track: ProcessFn = Box::new(move |frames: &mut [FrameSlot]| {
        let Some(first) = frames.first() else {
            return Err("tracker received an empty frame set".into());
        };
        published.store(mean_intensity(first).to_bits(), Ordering::Release);
        Ok(())
    });

    let camera = params.camera.name.clone();
    let undistort = params.undistortion.enabled.then(demo_undistortion);
    let tracker_enabled = params.tracker.enabled;
    let mut rig = Rig::new(
        params,
        Box::new(source),
        undistort,
        tracker_enabled.then_some(track),
    )?;
    rig.configure()?;
    if !rig.graph().status(rig.camera_id())?.is_started() {
        rig.start()?;
    }

    let mut summary = Summary {
        camera,
        streams,
        ticks: cli.ticks,
        updates: 0,
        submissions: 0,
        presented: 0,
        last_seq: 0,
        tracked: 0,
        last_tracked_mean: None,
    };
    for _ in 0..cli.ticks {
        let report = rig.tick(&mut |_: usize, _: &FrameSlot| {})?;
        summary.updates += u64::from(report.updated);
        summary.submissions += u64::from(report.submitted);
        summary.presented += u64::from(report.presented);
        summary.last_seq = report.frame_seq;
    }
    rig.stop()?;

    summary.tracked = rig
        .tracker()?
        .map_or(0, |tracker| tracker.worker().processed_count());
    let mean = f64::from_bits(last_mean.load(Ordering::Acquire));
    summary.last_tracked_mean = (!mean.is_nan()).then_some(mean);
    log::info!(
        "{} ticks, {} updates, {} tracked",
        summary.ticks,
        summary.updates,
        summary.tracked
    );
    Ok(summary)
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    let summary = run(&cli)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
