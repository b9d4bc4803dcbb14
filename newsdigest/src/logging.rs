//! Console logging plus an optional log file rotated daily.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use common::LoggingConfig;

/// Rotated files kept on disk, today's included.
pub const KEEP_LOG_FILES: usize = 7;

/// Daily appender for `path`: `logs/newsdigest.log` becomes
/// `logs/newsdigest.2024-01-10.log`. The directory is created on demand.
pub fn rolling_appender(path: &Path) -> Result<RollingFileAppender> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let prefix = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("newsdigest");
    let mut builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(KEEP_LOG_FILES);
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        builder = builder.filename_suffix(ext);
    }

    builder
        .build(dir)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}

/// Install the global subscriber. Keep the returned guard alive until exit or
/// buffered file lines are lost.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(config.level()).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match config.file.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(rolling_appender(Path::new(path))?);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}
