//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LogSection};

const DEFAULT_FILTER: &str = "afpi_crm=info,tower_http=info";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the built-in filter; `verbose` raises the crate to
/// debug. When `log.dir` is set, events go to a daily-rolling file instead of
/// stdout. The returned guard flushes the writer on drop; hold it until exit.
pub fn init(log: &LogSection, verbose: bool) -> Result<WorkerGuard> {
    let default = if verbose {
        "afpi_crm=debug,tower_http=debug"
    } else {
        DEFAULT_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let (writer, guard) = match &log.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "afpi-crm.log");
            tracing_appender::non_blocking(appender)
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log.dir.is_none());

    let result = match log.format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Pretty => builder.with_target(false).try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(guard)
}
