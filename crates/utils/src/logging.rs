//! provides logging helpers

use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::InitError;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

/// When set, logs go to a daily-rotated file at this path instead of stderr.
pub const LOG_PATH_ENV_VAR: &str = "DRIFT_OPERATOR_LOG_PATH";

const DEFAULT_LOG_PREFIX: &str = "drift-operator.log";

pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// fmt layer writing to stderr
pub fn stderr_layer() -> BoxedLayer {
    layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .boxed()
}

/// fmt layer writing to a daily-rotated file, keeping the three most recent files
pub fn file_layer(log_path: &Path) -> Result<(BoxedLayer, WorkerGuard), InitError> {
    let (dir, prefix) = if log_path.is_dir() {
        (log_path, DEFAULT_LOG_PREFIX)
    } else {
        let dir = log_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let prefix = log_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(DEFAULT_LOG_PREFIX);
        (dir, prefix)
    };

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(3)
        .build(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .boxed();
    Ok((layer, guard))
}

/// initiate the global tracing subscriber
///
/// The returned guard must be held for the lifetime of the process when logging
/// to a file, otherwise buffered lines are lost on exit.
pub fn init() -> Option<WorkerGuard> {
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    let log_path = env::var(LOG_PATH_ENV_VAR).ok();
    let (fmt_layer, guard, fallback) = match log_path.as_deref() {
        Some(path) => match file_layer(Path::new(path)) {
            Ok((layer, guard)) => (layer, Some(guard), None),
            Err(err) => (stderr_layer(), None, Some(format!("{path}: {err}"))),
        },
        None => (stderr_layer(), None, None),
    };

    registry().with(fmt_layer.with_filter(env_filter)).init();

    if let Some(reason) = fallback {
        tracing::warn!("failed to create rolling file appender at {reason}; falling back to stderr");
    }
    guard
}
