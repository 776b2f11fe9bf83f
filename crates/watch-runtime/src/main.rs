//! # Watch Runtime
//!
//! Runs the watch SDK end to end inside one process:
//!
//! ```text
//! sensor ──watch(temperature)──→ MemoryRelay ──push──→ dashboard (look)
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (logs, optional OTLP, Prometheus)
//! 2. Load SDK configuration from `WATCH_*` variables
//! 3. Bootstrap both devices and connect them to the relay
//! 4. Run until Ctrl+C, then dump metrics and shut down

mod runtime;

use anyhow::{Context, Result};
use tracing::{info, warn};
use watch_sdk::WatchConfig;
use watch_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};

use crate::runtime::WatchRuntime;

/// App id used when `WATCH_APP_ID` is not set.
const DEMO_APP_ID: &str = "watch-demo";

fn load_config() -> Result<WatchConfig> {
    let mut config = WatchConfig::from_env().context("Invalid WATCH_* configuration")?;
    if config.app_id().is_none() {
        warn!(app_id = DEMO_APP_ID, "WATCH_APP_ID not set, using demo app id");
        config.app_id = Some(DEMO_APP_ID.to_string());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env())
        .context("Failed to initialize telemetry")?;

    let config = load_config()?;
    info!(
        relay = %config.relay_url,
        data_dir = %config.data_dir.display(),
        "Configuration loaded"
    );

    let runtime = WatchRuntime::new(config)?;
    runtime.start().await?;

    info!("Runtime is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;

    match encode_metrics() {
        Ok(text) => println!("{text}"),
        Err(e) => warn!(error = %e, "Failed to encode metrics"),
    }

    Ok(())
}
