use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Engine internals at debug, model code and HTTP spans at info.
pub const DEFAULT_FILTER: &str = "info,pathway_backend_rust=debug,pathway_algo=info,tower_http=info";

const LOG_FILE_PREFIX: &str = "pathway.log";

/// Keeps the non-blocking file writer flushing until dropped.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// Parses `directives`, falling back to [`DEFAULT_FILTER`] when they are
/// malformed.
pub fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|err| {
        eprintln!("invalid log filter {directives:?} ({err}), using {DEFAULT_FILTER:?}");
        EnvFilter::new(DEFAULT_FILTER)
    })
}

pub fn init_tracing(config: &LoggingConfig) -> Option<FileLogGuard> {
    let stdout_layer = fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry()
        .with(env_filter(&config.filter))
        .with(stdout_layer);

    let Some(dir) = config.file_dir.as_deref() else {
        registry.init();
        return None;
    };

    match file_writer(dir) {
        Ok((writer, guard)) => {
            registry
                .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
                .init();
            tracing::info!(log_dir = %dir.display(), "file logging enabled");
            Some(FileLogGuard { _guard: guard })
        }
        Err(err) => {
            registry.init();
            tracing::warn!(log_dir = %dir.display(), error = %err, "file logging disabled");
            None
        }
    }
}

fn file_writer(dir: &Path) -> std::io::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}
