//! Tracing setup for applications embedding the wallet

use crate::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `info` and above are logged. With
/// `json` set, events are written as JSON lines.
pub fn init_tracing(service_name: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::Telemetry(e.to_string()))?;

    tracing::info!(service = service_name, "Tracing initialised");
    Ok(())
}
