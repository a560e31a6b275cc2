//! Logging initialization.
//!
//! Console output always; optional non-blocking file output when configured.
//! Timestamps are rendered in WIB (UTC+7), the deployment's local timezone,
//! so operators can line log lines up with carrier console activity.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use lazy_static::lazy_static;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::infrastructure::config::LoggingConfig;

lazy_static! {
    // Keeps the non-blocking writer alive for the process lifetime.
    static ref LOG_GUARDS: Mutex<Vec<WorkerGuard>> = Mutex::new(Vec::new());
}

/// WIB (UTC+7) timestamp formatter.
struct WibTimeFormatter;

impl FormatTime for WibTimeFormatter {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let offset = FixedOffset::east_opt(7 * 3600).expect("valid WIB offset");
        let now = Utc::now().with_timezone(&offset);
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Initializes logging with default configuration (console only, "info").
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_timer(WibTimeFormatter)
        .with_target(true);

    if config.log_to_file {
        let dir = config
            .file_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("logs"));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create log directory: {}", dir.display()))?;

        let appender = tracing_appender::rolling::daily(&dir, format!("{}.log", config.file_name_prefix));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        LOG_GUARDS
            .lock()
            .expect("log guard mutex poisoned")
            .push(guard);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_timer(WibTimeFormatter)
            .with_ansi(false)
            .with_writer(writer);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .context("logging already initialized")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init()
            .context("logging already initialized")?;
    }

    tracing::info!(level = %config.level, to_file = config.log_to_file, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_instead_of_panicking() {
        let config = LoggingConfig::default();
        assert!(init_logging_with_config(&config).is_ok());
        assert!(init_logging_with_config(&config).is_err());
    }
}
