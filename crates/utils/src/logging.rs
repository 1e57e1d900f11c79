//! provides logging helpers

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::InitError;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// Environment variable naming the directory for rolling log files.
pub const LOG_PATH_ENV_VAR: &str = "LOG_PATH";

const LOG_FILE_PREFIX: &str = "trackpod-controller.log";
const MAX_LOG_FILES: usize = 3;

fn env_filter() -> filter::EnvFilter {
    filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy()
}

/// Builds a daily-rotated, non-blocking writer inside `log_dir`.
pub fn rolling_writer(
    log_dir: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), InitError> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)?;

    Ok(tracing_appender::non_blocking(appender))
}

/// initiate the global tracing subscriber
///
/// Logs always go to stderr. When `log_dir` is given, they are additionally
/// written to a rolling file there; the returned guard must be kept alive
/// for the file writer to flush.
pub fn init<P: AsRef<Path>>(log_dir: Option<P>) -> Result<Option<WorkerGuard>, InitError> {
    let stderr_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let (writer, guard) = rolling_writer(dir.as_ref())?;
            let file_layer = layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(env_filter());
            (Some(file_layer), Some(guard))
        }
        None => (None, None),
    };

    registry().with(stderr_layer).with(file_layer).init();
    Ok(guard)
}
