//! Headless experiment runner.
//!
//! Simulates one page load against a live experiment backend:
//! - initializes a client for the configured page and device
//! - resolves the experiments named on the command line and logs assignments
//! - on Ctrl+C / SIGTERM, sends `page_exit` through the unload path

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use client::{ClientConfig, ExperimentClient, PageSignal};
use engine_core::{DeviceSignals, StaticProbe};
use telemetry::{init_tracing_from_env, metrics};

/// Time left for the exit beacon before the runtime shuts down.
const BEACON_GRACE: Duration = Duration::from_millis(500);

/// Runner configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    client: ClientConfig,

    /// Signals the simulated browser reports
    #[serde(default)]
    device: DeviceSignals,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting experiment runner v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        api = %config.client.api_base_url,
        page = %config.client.page.url,
        "Loaded configuration"
    );

    let probe = Arc::new(StaticProbe(config.device.clone()));
    let client = ExperimentClient::from_config(&config.client, probe)
        .context("Failed to create experiment client")?;

    client.initialize().await;
    info!(
        session_id = %client.session_id(),
        fingerprint = %client.fingerprint(),
        "Page view started"
    );

    let mut names: Vec<String> = std::env::args().skip(1).collect();
    if names.is_empty() {
        names = client.engine().experiment_names();
    }

    for name in &names {
        match client.get_variant(name).await {
            Some(variant) => info!(
                experiment = %name,
                variant = %variant.name,
                control = variant.is_control,
                config = ?variant.config,
                "Assigned"
            ),
            None => info!(experiment = %name, "Not in experiment"),
        }
    }

    shutdown_signal().await;

    info!("Ending page view...");
    client.handle(PageSignal::PageHide).await;
    tokio::time::sleep(BEACON_GRACE).await;

    match serde_json::to_string(&metrics().snapshot()) {
        Ok(snapshot) => info!(metrics = %snapshot, "Final metrics"),
        Err(e) => error!("Failed to serialize metrics: {}", e),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables, e.g. EXPERIMENTS__CLIENT__API_BASE_URL
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("EXPERIMENTS")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Nested keys with underscores don't split reliably, so the common ones
    // get flat overrides.
    if let Ok(url) = std::env::var("EXPERIMENTS_API_URL") {
        config.client.api_base_url = url;
    }
    if let Ok(page_url) = std::env::var("EXPERIMENTS_PAGE_URL") {
        config.client.page.url = page_url;
    }
    if let Ok(user_agent) = std::env::var("EXPERIMENTS_USER_AGENT") {
        config.device.user_agent = Some(user_agent);
    }
    if let Ok(user_id) = std::env::var("EXPERIMENTS_USER_ID") {
        config.client.user_id = Some(user_id);
    }

    Ok(config)
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
