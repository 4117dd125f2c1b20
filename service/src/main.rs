//! tierbox - resolve the routing preset and gate on transport health.
//!
//! Loads configuration, resolves the active preset, prints the routing
//! decision as JSON (the hand-off to config persistence) and probes the
//! transport once. Exits non-zero with remediation text when the transport
//! is unreachable.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use tierbox_service::RouterConfig;
use tierbox_service::error::RouteError;
use tierbox_service::middleware::Router;
use tierbox_service::providers::ProxyProvider;

/// Initialize structured logging with tracing
fn init_logging() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = RouterConfig::load().context("failed to load configuration")?;
    let provider = ProxyProvider::with_options(
        config.endpoint.clone(),
        config.api_key.clone(),
        config.request_timeout(),
    );
    let router = Router::from_config(&config, provider).context("failed to build router")?;

    let decision = router.routing_decision();
    println!(
        "{}",
        serde_json::to_string_pretty(&decision).context("failed to render routing decision")?
    );

    // Ctrl+C aborts the probe; the verdict then reports a failure.
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl+C, cancelling health probe...");
                cancel_on_signal.cancel();
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to set up Ctrl+C handler");
            }
        }
    });

    let verdict = router
        .gate()
        .probe_health_cancellable(router.endpoint(), &cancel)
        .await;

    if verdict.ok {
        tracing::info!(
            endpoint = %router.endpoint(),
            latency_ms = verdict.latency_ms,
            "Transport healthy"
        );
        return Ok(());
    }

    let err = RouteError::transport_unavailable(
        router.endpoint(),
        verdict
            .error_detail
            .unwrap_or_else(|| "health check failed".to_string()),
    );
    tracing::error!(error = %err, "Transport unavailable");
    eprintln!("{err}");
    std::process::exit(1);
}
