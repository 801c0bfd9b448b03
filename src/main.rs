//! # Arbor
//!
//! `arbor serve` runs the demo application behind axum. `arbor visit` loads
//! a page from a running server with a client session and walks through more
//! paths, printing what the router ends up with.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::sync::Arc;

use anyhow::{Context, Result};
use arbor::cli::{Cli, Commands};
use arbor::{config, demo};
use arbor_client::{ClientSession, HttpTransport, RouterState, Transport};
use arbor_wire::{EncodeOptions, encode_to_string};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let overrides = cli.command.overrides();

    match cli.command {
        Commands::Serve { config, .. } => {
            let config = overrides.apply(config::load(config.as_deref()).context("Failed to load configuration")?);
            serve(config).await
        }
        Commands::Visit { server, paths } => visit(&server, &paths).await,
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,arbor_server=debug,tower_http=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config: arbor_server::ServerConfig) -> Result<()> {
    let bind_address = config.bind_address.clone();
    let demo = demo::demo(config).context("Failed to build the demo application")?;

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    info!(address = %bind_address, "arbor listening");

    axum::serve(listener, demo.app.router())
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("Server error")?;

    info!("arbor stopped");
    Ok(())
}

async fn visit(server: &str, paths: &[String]) -> Result<()> {
    let base = url::Url::parse(server).with_context(|| format!("Invalid server URL {server}"))?;
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(base).context("Failed to create HTTP client")?);

    let Some((first, rest)) = paths.split_first() else {
        return Ok(());
    };
    let session = ClientSession::builder(transport)
        .modules(demo::client_modules())
        .load(first)
        .await
        .with_context(|| format!("Failed to load {first}"))?;
    report(&session.state());

    for path in rest {
        let state = session
            .navigate(path)
            .await
            .with_context(|| format!("Failed to navigate to {path}"))?;
        report(&state);
    }

    let view = encode_to_string(session.route_view(), EncodeOptions::default())
        .await
        .context("Failed to encode the route view")?;
    println!("{view}");
    Ok(())
}

fn report(state: &RouterState) {
    let routes: Vec<&str> = state.matches.iter().map(|m| m.id.as_str()).collect();
    info!(
        url = %state.location,
        status = state.status,
        routes = ?routes,
        errors = state.errors.len(),
        "page"
    );
    for (id, data) in &state.loader_data {
        match data.to_json() {
            Ok(json) => println!("{id}: {json}"),
            Err(e) => error!(route_id = %id, error = %e, "loader data is not plain JSON"),
        }
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
