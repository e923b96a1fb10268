//! Global `tracing` subscriber setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Initializes structured logging. `json` selects a structured log
/// shape for production; plain text is easier to read during local
/// development.
pub fn init_tracing(default_level: &str, json: bool) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339());
        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing_log::LogTracer::init()?;
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing_log::LogTracer::init()?;
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}
