use designlens::{config::ServiceConfig, init_service, init_tracing};
use std::env;
use std::path::Path;
use std::process;

#[tokio::main]
async fn main() {
    // Initialize tracing
    init_tracing();

    // Get config file path from command line or use the default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/designlens.yaml".to_string());

    // An explicit config file must load; the default path may be absent,
    // in which case the built-in defaults apply.
    let config = if Path::new(&config_path).exists() {
        match ServiceConfig::from_file(&config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from {}: {}", config_path, e);
                eprintln!("Usage: designlens [config_file]");
                process::exit(1);
            }
        }
    } else {
        ServiceConfig::default()
    };

    // Start the service
    if let Err(e) = init_service(config).await {
        eprintln!("Service error: {}", e);
        process::exit(1);
    }
}
