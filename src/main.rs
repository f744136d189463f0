//! Festival Ledger — entry point.
//!
//! Records room-wise donations and categorized expenses for the society
//! festival, reconciles installment payments against expense totals, and
//! exposes an Axum REST API with an append-only audit trail behind it.

mod api;
mod audit;
mod auth;
mod config;
mod db;
mod donations;
mod errors;
mod expenses;
mod export;
mod models;
mod stats;
mod topology;

#[cfg(test)]
mod scenarios;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    let addr = format!("0.0.0.0:{}", config.api_port);
    let state = Arc::new(api::ApiState { pool, config });

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
