//! Standalone gateway binary
//!
//! The binary registers no [`Authenticator`](radius_gateway::Authenticator) or
//! [`AccountingService`](radius_gateway::AccountingService), so listeners that
//! load the `eap` or `accounting` modules fail at startup. Deployments using
//! those modules embed the library and register their backends through
//! `GatewayContext::with_authenticator` and `GatewayContext::with_accounting_service`.

use clap::Parser;
use radius_gateway::{
    GatewayConfig, GatewayContext, MemoryStateBackend, RadiusServer, SessionStore, StaticLoader,
};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Modules that need a backend service this binary does not register
const BACKEND_MODULES: &[&str] = &["eap", "accounting"];

/// Listener modules this binary cannot start
fn unsupported_modules(config: &GatewayConfig) -> Vec<(&str, &str)> {
    config
        .listeners
        .iter()
        .flat_map(|listener| {
            listener
                .modules
                .iter()
                .filter(|module| BACKEND_MODULES.contains(&module.name.as_str()))
                .map(move |module| (listener.name.as_str(), module.name.as_str()))
        })
        .collect()
}

/// RADIUS gateway with pluggable filter and module pipelines
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "radius-gateway")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "config.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't start the gateway)
    #[arg(short = 'c', long)]
    validate: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match GatewayConfig::from_file(&cli.config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing_subscriber::registry()
                .with(EnvFilter::new("info"))
                .with(tracing_subscriber::fmt::layer())
                .init();

            if cli.validate {
                error!(path = %cli.config_path, error = %e, "Configuration validation failed");
                process::exit(1);
            }

            warn!(path = %cli.config_path, error = %e, "Could not load config file");
            info!("Creating example configuration at: {}", cli.config_path);

            if let Err(e) = GatewayConfig::example().to_file(&cli.config_path) {
                error!("Error creating example config: {}", e);
                process::exit(1);
            }

            info!("Please edit {} and restart the gateway", cli.config_path);
            process::exit(0);
        }
    };

    if cli.validate {
        println!("Configuration validated successfully");
        for listener in &config.listeners {
            let modules: Vec<&str> = listener.modules.iter().map(|m| m.name.as_str()).collect();
            println!("  {} {} [{}]", listener.name, listener.address, modules.join(", "));
        }
        for (listener, module) in unsupported_modules(&config) {
            println!(
                "  note: {listener} uses '{module}', which needs a backend service this binary \
                 does not register; embed the library and register one on GatewayContext"
            );
        }
        process::exit(0);
    }

    let log_level = config.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("RADIUS gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    let sessions = SessionStore::new(
        Arc::new(MemoryStateBackend::new()),
        config.session_storage.ttl(),
    );
    let context = GatewayContext::new(sessions);

    let server = match RadiusServer::new(config, &StaticLoader, context).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start gateway: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Gateway error: {}", e);
        process::exit(1);
    }
}
