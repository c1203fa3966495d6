//! Tracing subscriber setup for the binaries.
//!
//! Everything comes from [`SchedulerConfig`]: the filter from `log_level`
//! and the optional daily rolling file from `log_dir` / `log_file_prefix`.
//! Human-readable output always goes to stderr so stdout stays free for
//! machine-readable results.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::SchedulerConfig;

/// Flushes buffered file output on drop
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

fn scheduler_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn rolling_writer(dir: &Path, prefix: &str) -> Option<(NonBlocking, WorkerGuard)> {
    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("file logging disabled, cannot create {}: {err}", dir.display());
        return None;
    }
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, prefix);
    Some(tracing_appender::non_blocking(appender))
}

/// Installs the global subscriber. Keep the returned guard alive for the
/// lifetime of the process.
pub fn init_tracing(config: &SchedulerConfig) -> Option<FileLogGuard> {
    let file = config
        .log_dir
        .as_deref()
        .and_then(|dir| rolling_writer(dir, &config.log_file_prefix));

    let (file_layer, guard) = match file {
        Some((writer, guard)) => (
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true),
            ),
            Some(FileLogGuard { _guard: guard }),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(scheduler_filter(&config.log_level))
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}
