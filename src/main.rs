// Main entry point - Dependency injection, CLI and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::application::vitals_service::VitalsService;
use crate::infrastructure::config::load_settings;
use crate::infrastructure::vrm_client::VrmClient;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{get_vitals, health_check};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let settings = load_settings()?;

    // Create provider (infrastructure layer)
    let provider = Arc::new(VrmClient::new(&settings)?);

    // Create service (application layer)
    let service = VitalsService::new(provider, chrono::Duration::seconds(settings.stale_after_secs));

    // Default: fetch once and print, like a cron-driven script.
    // `serve` keeps the process up and exposes the report over HTTP.
    match std::env::args().nth(1).as_deref() {
        Some("serve") => serve(service, &settings.http_bind).await,
        None => fetch_once(service).await,
        Some(other) => anyhow::bail!("unknown mode '{other}' (expected no argument or 'serve')"),
    }
}

async fn fetch_once(service: VitalsService) -> anyhow::Result<()> {
    let report = service
        .build_report()
        .await
        .context("could not build vitals report")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn serve(service: VitalsService, bind: &str) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        vitals_service: service,
    });

    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/vitals", get(get_vitals))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = bind.parse().context("invalid http_bind address")?;
    println!("Starting vrm-vitals service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
