use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use comfyui_edit_worker::{api, config, Handler, HandlerConfig};

#[tokio::main]
async fn main() {
    // Load configuration
    config::Config::dotenv_load();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::Config::new().expect("Failed to load configuration");
    config::Config::log_env_vars();

    let state = Arc::new(api::routes::AppState {
        handler: Handler::new(HandlerConfig::from(&config)),
    });
    let app = api::routes::router(state);

    // Run our application with safe parsing
    let ip: std::net::IpAddr = config.api_host.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid API_HOST '{}', falling back to 0.0.0.0", config.api_host);
        std::net::IpAddr::from([0, 0, 0, 0])
    });
    let port: u16 = config.api_port.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid API_PORT '{}', falling back to 8000", config.api_port);
        8000
    });
    let socket_address = SocketAddr::new(ip, port);
    tracing::info!("runner: {}", config.runner_bin.display());
    tracing::info!("listening on {}", socket_address);
    axum::Server::bind(&socket_address)
        .serve(app.into_make_service())
        .await
        .expect("server error");
}
