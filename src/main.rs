//! Pulse curator binary entrypoint.
//! Loads config, wires the runtime, runs the scheduler until Ctrl-C.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pulse_curator::{metrics::Metrics, PulseConfig, PulseRuntime};

/// Compact logs by default, JSON lines with `PULSE_LOG_JSON=1`.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pulse=info,warn"));
    let json = std::env::var("PULSE_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Local .env is optional.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = if std::env::var("PULSE_METRICS").is_ok_and(|v| v == "1") {
        Some(Metrics::init()?)
    } else {
        None
    };

    let config = PulseConfig::load_default().context("loading pulse config")?;
    let runtime = PulseRuntime::init(config).await?;
    runtime.start().context("starting scheduler")?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;

    if let Err(e) = runtime.shutdown().await {
        tracing::warn!(target: "pulse::runtime", error = %e, "unclean shutdown");
    }

    let health = runtime.health().await;
    tracing::info!(
        target: "pulse::runtime",
        cards = health.cards_total,
        cycles = health.scheduler.cycles_run,
        "bye"
    );
    if let Some(m) = metrics {
        tracing::debug!(target: "pulse::runtime", exposition = %m.render(), "final metrics");
    }
    Ok(())
}
