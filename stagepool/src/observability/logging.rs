//! Subscriber setup for binaries and demos built on stagepool.

use tracing_subscriber::EnvFilter;

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(default_filter: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
