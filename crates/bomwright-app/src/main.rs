//! Bomwright application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Build the completion client, session store, coordinator and conversation
//! 4. Serve the axum REST API until Ctrl-C, then cancel in-flight enrichment

mod cli;

use std::sync::Arc;

use clap::Parser;

use bomwright_api::routes;
use bomwright_api::state::AppState;
use bomwright_core::config::BomwrightConfig;
use bomwright_enrich::{CompletionService, HttpCompletionClient};

use crate::cli::CliArgs;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = BomwrightConfig::load_or_default(&config_file);
    config.server.port = args.resolve_port(config.server.port);
    config.server.host = args.resolve_host(&config.server.host);
    let log_level = args.resolve_log_level(&config.general.log_level);

    // Tracing. RUST_LOG wins over the CLI/config level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Bomwright v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Completion service shared by turns and enrichment.
    let client = match HttpCompletionClient::from_config(&config.completion) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build completion client");
            return Err(e.into());
        }
    };
    tracing::info!(
        endpoint = %config.completion.endpoint,
        model = %client.model(),
        "Completion client ready"
    );
    let completion: Arc<dyn CompletionService> = Arc::new(client);

    let state = AppState::new(config.clone(), completion);
    let coordinator = Arc::clone(&state.coordinator);
    tracing::info!(
        enabled = config.enrichment.enabled,
        timeout_ms = config.enrichment.timeout_ms,
        periodic_every = config.enrichment.periodic_every,
        "Enrichment coordinator ready"
    );

    // === API server ===

    if let Err(e) = routes::start_server(&config, state, shutdown_signal()).await {
        tracing::error!(error = %e, "API server failed");
        tracing::error!(
            "Try: BOMWRIGHT_PORT={} cargo run -p bomwright-app",
            config.server.port.saturating_add(1)
        );
        return Err(e.into());
    }

    match coordinator.shutdown() {
        Ok(sessions) => tracing::info!(sessions, "Cancelled in-flight enrichment"),
        Err(e) => tracing::warn!(error = %e, "Failed to clear sessions on shutdown"),
    }

    Ok(())
}
