use log::{error, info};

use rusty_relay::config::ServerConfig;
use rusty_relay::core::RelayServer;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Server init...");

    // Load config from .env and the environment
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, backlog={}, buffer={}",
        config.host, config.port, config.backlog, config.buffer_size
    );

    let server = match RelayServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start relay: {}", e);
            std::process::exit(1);
        }
    };

    server.run_until(shutdown_signal()).await;
}

// Ctrl-C requests a graceful stop; without a handler the relay runs until killed
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
}
