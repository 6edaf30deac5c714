mod api;
mod config;
mod domain;
mod engine;
mod feed;
mod ingestion;
mod service;
mod storage;

use std::env;
use std::sync::Arc;

use config::Config;
use ingestion::SourceManager;
use service::{Service, ServiceConfig};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config_path = parse_config_path();
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", config_path, e);
            return;
        }
    };

    init_tracing(config.app.log_level.as_deref());

    if env::args().any(|arg| arg == "--test-sources") {
        test_sources(&config).await;
        return;
    }

    let service = match Service::new(ServiceConfig::new(config)).await {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!(error = %e, "Failed to create service");
            return;
        }
    };

    info!(config = %config_path, "Service initialized");

    tokio::spawn({
        let service = Arc::clone(&service);
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            info!("Shutdown signal received");
            service.stop().await;
        }
    });

    if let Err(e) = service.start().await {
        error!(error = %e, "Service error");
    }

    service.stop().await;
    if let Err(e) = service.close().await {
        warn!(error = %e, "Failed to close storage");
    }
}

/// Fetches once from every configured pull source and logs the quotes.
async fn test_sources(config: &Config) {
    let manager = match SourceManager::from_config(config).await {
        Ok(m) => m,
        Err(e) => {
            error!(error = %e, "Failed to build sources");
            return;
        }
    };

    info!(sources = ?manager.list().await, "Testing sources...");

    let results = manager.fetch_all(&config.instruments).await;
    for (name, result) in results {
        match result {
            Ok(quotes) => {
                for quote in quotes {
                    info!(
                        source = %name,
                        instrument = %quote.instrument,
                        price = quote.price,
                        change_24h = ?quote.change_24h,
                        observed_at = %quote.observed_at,
                        "Quote received"
                    );
                }
            }
            Err(e) => error!(source = %name, error = %e, "Fetch failed"),
        }
    }

    info!("Test completed");
}
