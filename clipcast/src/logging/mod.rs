//! Tracing subscriber setup.
//!
//! Console output always uses local-timezone timestamps. JSON console output
//! and a daily rolling log file are optional.

use std::path::PathBuf;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "clipcast=info,process_utils=info";

const LOG_FILE_NAME: &str = "clipcast.log";

/// Timer that formats timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Logging options collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Filter directive; falls back to `RUST_LOG`, then [`DEFAULT_LOG_FILTER`].
    pub filter: Option<String>,
    /// Emit JSON lines on the console instead of human-readable text.
    pub json: bool,
    /// Also write logs to a daily rolling file in this directory.
    pub log_dir: Option<PathBuf>,
}

impl LoggingOptions {
    fn env_filter(&self) -> crate::Result<EnvFilter> {
        match self.filter.as_deref() {
            Some(directive) => EnvFilter::try_new(directive).map_err(|e| {
                crate::Error::config(format!("Invalid filter directive '{directive}': {e}"))
            }),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
        }
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process.
pub fn init_logging(options: &LoggingOptions) -> crate::Result<Option<WorkerGuard>> {
    let filter = options.env_filter()?;

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| crate::Error::io_path("creating log directory", dir, e))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let (text_layer, json_layer) = if options.json {
        (None, Some(fmt::layer().json().with_timer(LocalTimer)))
    } else {
        (
            Some(fmt::layer().with_ansi(true).with_timer(LocalTimer)),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok(guard)
}
