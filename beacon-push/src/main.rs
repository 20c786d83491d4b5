use std::sync::Arc;

use beacon_push::api::ApiServer;
use beacon_push::config::{AppConfig, log_dir_from_env};
use beacon_push::services::ServiceContainer;
use beacon_push::{database, logging};
use expo_push::ExpoClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _log_guard = logging::init_logging(log_dir_from_env().as_deref())?;
    let config = AppConfig::from_env();

    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let gateway = Arc::new(ExpoClient::new(config.gateway.client_config())?);
    let container = ServiceContainer::new(pool, gateway, config.pipeline.clone());
    let reconciler = container.start_background_tasks();

    let shutdown_token = container.cancellation_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
        shutdown_token.cancel();
    });

    tracing::info!(
        gateway = %config.gateway.base_url,
        ttl_hours = config.pipeline.ticket_ttl.as_secs() / 3600,
        "beacon-push initialized"
    );

    let server = ApiServer::new(
        config.server.clone(),
        container.app_state(),
        container.cancellation_token(),
    );
    let served = server.run().await;

    container.shutdown();
    reconciler.await?;
    served?;

    tracing::info!("beacon-push stopped");
    Ok(())
}
