//! Foundry fleet manager
//!
//! Runs up to three Foundry game-server containers per environment on a
//! single host and exposes their lifecycle over an authenticated HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use foundry_fleet_manager::{
    api,
    config::{Config, RuntimeBackend},
    docker::{DockerRuntime, DockerRuntimeConfig},
    ApiSettings, AppState, InstanceManager, InstanceManagerConfig, MockRuntime, Runtime,
};
use foundry_registry::Environment;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to FLEET_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Foundry fleet manager");
    info!(
        listen_addr = %config.listen_addr,
        runtime = ?config.runtime,
        image = %config.image,
        dev_mode = config.dev_mode,
        "Configuration loaded"
    );

    for env in Environment::ALL {
        if config.secrets.get(env).is_none() {
            warn!(environment = %env, "No API secret configured; requests for this environment will fail");
        }
    }

    let runtime: Arc<dyn Runtime> = match config.runtime {
        RuntimeBackend::Docker => Arc::new(DockerRuntime::new(DockerRuntimeConfig {
            socket_path: config.docker_socket.clone(),
            stop_timeout_secs: config.stop_timeout_secs,
        })),
        RuntimeBackend::Mock => {
            warn!("Using in-memory mock runtime; no containers will be started");
            Arc::new(MockRuntime::new())
        }
    };

    let manager = InstanceManager::new(
        runtime,
        InstanceManagerConfig {
            image: config.image.clone(),
            container_port: config.container_port,
        },
    );

    // Create application state
    let state = AppState::new(manager, ApiSettings::from(&config));

    // Build and run the server
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    })
    .await?;

    info!("Fleet manager stopped");
    Ok(())
}
