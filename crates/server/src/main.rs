use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seatrace_core::{
    create_notifier, load_config, load_config_from_env, validate_config, ChromeDriverFactory,
    DriverFactory,
};
use seatrace_server::api::create_router;
use seatrace_server::state::AppState;

/// Config file used when `SEATRACE_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// How long shutdown waits for a stopped run to close its browsers.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // An explicit path must exist; the default one is optional.
    let config = match std::env::var("SEATRACE_CONFIG") {
        Ok(path) => {
            let config_path = PathBuf::from(path);
            info!("Loading configuration from {:?}", config_path);
            load_config(&config_path)
                .with_context(|| format!("Failed to load config from {:?}", config_path))?
        }
        Err(_) => {
            let config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if config_path.exists() {
                info!("Loading configuration from {:?}", config_path);
                load_config(&config_path)
                    .with_context(|| format!("Failed to load config from {:?}", config_path))?
            } else {
                warn!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
                load_config_from_env().context("Failed to load config from environment")?
            }
        }
    };

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Search page: {}", config.site.search_url);
    info!(
        "Max concurrency: {}, pacing levels {}..={}",
        config.race.max_concurrency, config.pacing.min_level, config.pacing.max_level
    );

    // Browser sessions
    let factory: Arc<dyn DriverFactory> = Arc::new(
        ChromeDriverFactory::new(config.driver.clone())
            .context("Failed to set up the browser driver")?,
    );
    info!("Using driver factory: {}", factory.name());

    // Outcome notifications
    let notifier = create_notifier(&config.notify).context("Failed to create notifier")?;
    info!("Using notifier: {}", notifier.name());

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), factory, notifier));

    // Create router
    let app = create_router(state.clone());

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop the running session so its browsers are closed
    info!("Server shutting down...");
    if let Ok(session) = state.stop().await {
        info!("Waiting for session {} to close its browsers", session.id());
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while session.is_running().await {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!("Session {} did not stop within {:?}", session.id(), SHUTDOWN_GRACE);
        }
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
