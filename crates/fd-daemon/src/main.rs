//! fd-daemon entry point.
//!
//! Thin on purpose: tracing, config, collaborators, middleware, serve. All
//! route handlers live in `routes.rs`; shared state lives in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use fd_config::{
    config_paths_from_env, load_layered_yaml, report_unused_keys, resolve_gateway_secrets,
    AppConfig,
};
use fd_daemon::{routes, state};
use fd_db::PgShipmentStore;
use fd_phonepe::PhonePeClient;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const ENV_DAEMON_ADDR: &str = "FD_DAEMON_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Production injects env
    // vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let shared = Arc::new(build_state().await?);

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(15));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));
    info!("fd-daemon listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr} failed"))?;
    routes::serve_until(listener, app, shutdown_signal()).await?;

    info!("fd-daemon stopped");

    Ok(())
}

/// Config, gateway credentials and the database pool. Any missing piece
/// stops startup.
async fn build_state() -> anyhow::Result<state::AppState> {
    let paths = config_paths_from_env();
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = load_layered_yaml(&path_refs).context("config load failed")?;
    info!(config_hash = %loaded.config_hash, paths = ?paths, "config loaded");

    let unused = report_unused_keys(&loaded.config_json);
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config keys not consumed by fd-daemon");
    }

    let config = AppConfig::from_json(&loaded.config_json)?;
    let secrets = resolve_gateway_secrets(&loaded.config_json)?;
    let gateway = PhonePeClient::new(&config.gateway, secrets)?;
    info!(
        host = gateway.host(),
        environment = ?config.gateway.environment,
        "payment gateway configured"
    );

    let pool = fd_db::connect_from_env().await?;
    let store = PgShipmentStore::new(pool);

    Ok(state::AppState::new(
        config,
        Arc::new(store),
        Arc::new(gateway),
    ))
}

/// Resolves on Ctrl-C; in-flight requests finish before `serve` returns.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl_c listener failed; shutting down");
        return;
    }
    info!("shutdown requested");
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var(ENV_DAEMON_ADDR).ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}
