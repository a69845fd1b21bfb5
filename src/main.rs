use tokio::signal;
use tracing::{error, info};
use tradecap::infrastructure::bootstrap;
use tradecap::infrastructure::config::Config;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let config_path =
        std::env::var("TRADECAP_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {config_path}: {e}");
            std::process::exit(1);
        }
    };

    config.init_logging();
    info!("tradecap starting");

    tokio::select! {
        result = bootstrap::run(config) => {
            if let Err(e) = result {
                error!(error = %e, "Fatal error");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("tradecap stopped");
}
