use portsub::broker::Service;
use portsub::config::load_config;
use portsub::utils::logging;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.log.level);

    let mut service = Service::new(config.broker);
    let addr = match service.start().await {
        Ok(addr) => addr,
        Err(e) => {
            error!("Broker failed to start: {e}");
            std::process::exit(1);
        }
    };
    info!("portsub broker listening on {addr}");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for shutdown signal: {e}");
    }
    info!("Shutdown signal received. Exiting gracefully.");
    service.stop().await;
}
