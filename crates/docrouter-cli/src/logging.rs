use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "docrouter=info,docrouter_cli=info";

/// Installs the global subscriber and routes `log` records from the library into it.
///
/// `RUST_LOG` overrides the default filter. Output goes to stderr so command
/// results on stdout stay pipeable.
pub fn init(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr);
        tracing::subscriber::set_global_default(registry.with(layer))
            .context("Failed to install JSON log subscriber")?;
    } else {
        let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
        tracing::subscriber::set_global_default(registry.with(layer))
            .context("Failed to install log subscriber")?;
    }

    tracing_log::LogTracer::init().context("Failed to bridge log records")?;
    Ok(())
}
