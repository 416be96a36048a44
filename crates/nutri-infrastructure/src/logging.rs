//! Tracing subscriber setup.

use crate::paths::{NutriPaths, ServiceType};
use nutri_core::config::ClientConfig;
use nutri_core::error::{NutriError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE_PREFIX: &str = "nutri.log";

/// Installs the global subscriber: stderr output plus, when
/// `log_to_file` is set, a daily rolling file under the logs directory.
///
/// The filter comes from `NUTRI_LOG` if set, otherwise from `log_level`.
/// Keep the returned guard alive for the lifetime of the program, or
/// buffered file output is lost.
pub fn init_logging(config: &ClientConfig, paths: &NutriPaths) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(&config.log_level);
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    let (file_layer, guard) = if config.log_to_file {
        let dir = paths
            .get_path(ServiceType::Logs)
            .map_err(|e| NutriError::config(e.to_string()))?;
        std::fs::create_dir_all(&dir)?;
        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(build_filter(&config.log_level));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| NutriError::internal(format!("Failed to install logger: {}", e)))?;

    Ok(guard)
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env("NUTRI_LOG")
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
