//! Main entry point for the Service Registry Gateway

use registry_gateway::{
    api,
    config::{LoggingConfig, Settings},
    registry::{JsonFileStorage, MemoryStorage, RegistryStorage, RegistryStore},
    AppState,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;

    init_logging(&settings.logging);

    info!("Starting Service Registry Gateway");
    info!(
        "Loaded configuration: server={}:{}",
        settings.server.host, settings.server.port
    );

    // Initialize registry storage
    let storage: Arc<dyn RegistryStorage> = match settings
        .registry
        .path
        .as_deref()
        .filter(|path| !path.is_empty())
    {
        Some(path) => {
            info!(path = %path, "Using JSON file registry storage");
            Arc::new(JsonFileStorage::new(path))
        }
        None => {
            warn!("No registry path configured; registrations will not survive a restart");
            Arc::new(MemoryStorage::new())
        }
    };

    let registry =
        Arc::new(RegistryStore::load(storage, settings.registry.services.as_slice()).await?);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    // Create application state
    let app_state = Arc::new(AppState::new(&settings, registry.clone())?);

    // Build the router
    let app = api::create_router(app_state);

    info!("Server listening on {}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = registry.flush().await {
        error!(error = %e, "Failed to flush registry on shutdown");
    }
    info!("Gateway stopped");

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
