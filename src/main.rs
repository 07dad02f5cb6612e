use switchboard::config::load_config;
use switchboard::transport::Server;
use switchboard::utils::logging;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    logging::init("info");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            return;
        }
    };

    let server = match Server::listen(&config.server).await {
        Ok(server) => server,
        Err(e) => {
            error!("failed to start relay: {e}");
            return;
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
    }
    info!("shutdown signal received, closing relay");
    server.close();
}
