use std::sync::Arc;

use vertex_bridge::api;
use vertex_bridge::config::AppConfig;
use vertex_bridge::observability::init_tracing;
use vertex_bridge::state::AppState;

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });

    init_tracing(&config.server.log_level);
    config.log_startup_summary();

    let host = config.server.host.clone();
    let port = config.server.port;

    let state = match AppState::new(config) {
        Ok(state) => Arc::new(state),
        Err(err) => {
            eprintln!("Failed to initialize: {err}");
            std::process::exit(1);
        }
    };

    let app = api::router(state);

    let listener = match tokio::net::TcpListener::bind(format!("{host}:{port}")).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("Failed to bind to {host}:{port}: {err}");
            std::process::exit(1);
        }
    };

    tracing::info!("vertex-bridge listening on {host}:{port}");

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("server error: {err}");
        std::process::exit(1);
    }
}
