//! hostbeat: samples host resource counters on a fixed cadence and streams
//! them to connected dashboard viewers over WebSocket, keeping a bounded,
//! crash-recoverable rolling history per metric.

mod config;
mod error;
mod filter;
mod history;
mod http;
mod metrics;
mod rates;
mod sampler;
mod session;
mod state;
mod types;
mod uptime;
mod ws;

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{parse_port, Config};
use crate::history::{HistoryStore, JsonFileSink};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hostbeat=info")),
        )
        .init();

    let mut config = Config::from_env();
    config.port = parse_port(std::env::args(), config.port);

    std::fs::create_dir_all(&config.data_dir)?;
    let sink = JsonFileSink::new(&config.data_dir);
    let store = HistoryStore::load(Box::new(sink), config.history_len, config.history_window);
    if store.last_sample().is_some() {
        info!("restored previous sample and history from {:?}", config.data_dir);
    }

    let port = config.port;
    let state = AppState::new(config, store);

    sampler::spawn_engine(state.clone());
    uptime::spawn_site_monitors(state.clone());

    let shutdown_state = state.clone();
    let app = Router::new()
        .route("/health", get(http::health))
        .route("/api/system-info", get(http::system_info))
        .route("/api/history", get(http::history))
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{addr} (push channel at /ws)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // tells every open session to close before the listener stops
            let _ = shutdown_state.shutdown_tx.send(true);
        })
        .await?;
    info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
