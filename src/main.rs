use anyhow::Result;
use dependency_gateway::{init_tracing, AppConfig, Gateway};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenvy::dotenv().ok();
    init_tracing();
    info!("Starting dependency gateway...");

    let config = AppConfig::from_env()?;
    let gateway = Gateway::from_config(&config)?;
    let _prober = gateway.spawn_prober();

    let endpoint = config.server.endpoint();
    info!("Starting at endpoint:{}", endpoint);
    info!("Starting Dependency Gateway v{}...", env!("CARGO_PKG_VERSION"));
    for dependency in &config.dependencies {
        info!(
            dependency = %dependency.name,
            base_uri = %dependency.base_uri,
            timeout_ms = dependency.timeout.as_millis() as u64,
            "Dependency configured"
        );
    }

    let listener = tokio::net::TcpListener::bind(&endpoint).await?;
    axum::serve(listener, gateway.into_router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    // ---
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        return;
    }
    info!("Shutdown signal received");
}
