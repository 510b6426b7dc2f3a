mod arena;
mod config;
mod demo_bots;
mod entities;
mod error;
mod geometry;
mod match_runner;
mod persistence;
mod registry;
mod session;
mod wire;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use persistence::ResultSink;
use registry::new_registry;
use session::{play_ws, watch_ws, AppState};

/// Robot battle arena server: tick-driven simulation of player and
/// spectator sessions.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Bind address for the HTTP/WebSocket server.
    #[arg(long, default_value = "127.0.0.1")]
    addr: String,

    /// Bind port.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// SQLite connection string for the match result sink.
    #[arg(long, default_value = "sqlite://battle.db?mode=rwc")]
    database_url: String,
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "battle_server=info".into()),
        )
        .init();

    let args = Args::parse();
    info!("Robot Battle Arena server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = ResultSink::connect(&args.database_url)
        .await
        .context("failed to open result sink database")?;

    let state = AppState { registry: new_registry(), db };

    // Match 0 always exists as the standing demo arena.
    let _ = registry::get_or_create_match(&state.registry, config::DEMO_MATCH_ID, true, &state.db).await;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/watch/:match_id", get(watch_ws))
        .route("/api/play/:match_id", get(play_ws))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", args.addr, args.port);
    info!("Serving on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
