//! Stderr logger for binaries and tests.
//!
//! Lines look like `[  1.500s  INFO cam-tracker marker_rig_pipeline] text`:
//! elapsed time since installation, level, thread name and the crate that
//! logged. Worker offload threads are named after their camera, so the
//! thread column tells producer and worker lines apart.

use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

fn write_line(
    out: &mut impl Write,
    elapsed: Duration,
    thread: Option<&str>,
    record: &Record,
) -> io::Result<()> {
    let origin = record.target().split("::").next().unwrap_or_default();
    writeln!(
        out,
        "[{:7.3}s {:>5} {} {}] {}",
        elapsed.as_secs_f64(),
        record.level(),
        thread.unwrap_or("-"),
        origin,
        record.args()
    )
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let thread = std::thread::current();
        let _ = write_line(
            &mut io::stderr().lock(),
            self.started.elapsed(),
            thread.name(),
            record,
        );
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger at `level`.
///
/// Only the first call installs anything; later calls return `Ok(())`
/// and keep the original level.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`),
/// with thread names so worker lines can be told apart. `json` switches to
/// one JSON object per event.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_thread_names(true);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
