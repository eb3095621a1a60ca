//! Callroom relay server.
//!
//! An axum server that relays opaque voice data between the members of
//! named rooms over WebSocket, alongside a health check and a
//! language-model connectivity probe.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:5000
//! cargo run --bin callroom-relay
//!
//! # Run on custom address
//! cargo run --bin callroom-relay -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! CALLROOM_ADDR=127.0.0.1:8080 OPENAI_API_KEY=sk-... cargo run --bin callroom-relay
//! ```

use callroom_relay::config::{CallroomConfig, CliArgs};
use callroom_relay::server;
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match CallroomConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        frontend_url = %config.frontend_url,
        probe_configured = config.openai.api_key.is_some(),
        "starting callroom relay v{}",
        env!("CARGO_PKG_VERSION")
    );

    match server::start_server(&config).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "listening");
            tracing::info!("health check: http://{bound_addr}/api/health");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
