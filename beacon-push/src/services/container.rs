//! Service container.

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::AppState;
use crate::config::PipelineConfig;
use crate::database::repositories::{
    DeviceTokenRepository, PreferenceRepository, SqlxDeviceTokenRepository,
    SqlxPreferenceRepository, SqlxTicketRepository, SqlxUserRepository, TicketRepository,
    UserRepository,
};
use crate::notification::{
    BeaconTrigger, EligibilityResolver, FanoutSender, PushGateway, ReceiptReconciler,
    TokenResolver,
};

/// Owns every long-lived service of the process.
pub struct ServiceContainer {
    /// Database connection pool.
    pub pool: SqlitePool,
    pub config: PipelineConfig,
    pub tickets: Arc<dyn TicketRepository>,
    pub device_tokens: Arc<dyn DeviceTokenRepository>,
    pub preferences: Arc<dyn PreferenceRepository>,
    pub users: Arc<dyn UserRepository>,
    pub trigger: Arc<BeaconTrigger>,
    pub reconciler: Arc<ReceiptReconciler>,
    /// Cancellation token for graceful shutdown.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    pub fn new(pool: SqlitePool, gateway: Arc<dyn PushGateway>, config: PipelineConfig) -> Self {
        let config = config.normalized();

        let tickets: Arc<dyn TicketRepository> = Arc::new(SqlxTicketRepository::new(pool.clone()));
        let device_tokens: Arc<dyn DeviceTokenRepository> =
            Arc::new(SqlxDeviceTokenRepository::new(pool.clone()));
        let preferences: Arc<dyn PreferenceRepository> =
            Arc::new(SqlxPreferenceRepository::new(pool.clone()));
        let users: Arc<dyn UserRepository> = Arc::new(SqlxUserRepository::new(pool.clone()));

        let eligibility = Arc::new(EligibilityResolver::with_default_sources(preferences.clone()));
        let tokens = Arc::new(TokenResolver::with_default_sources(
            device_tokens.clone(),
            users.clone(),
        ));
        let sender = Arc::new(FanoutSender::new(
            eligibility,
            tokens,
            gateway.clone(),
            tickets.clone(),
            config.clone(),
        ));
        let trigger = Arc::new(BeaconTrigger::new(sender, users.clone()));
        let reconciler = Arc::new(ReceiptReconciler::new(
            tickets.clone(),
            device_tokens.clone(),
            gateway,
            config.clone(),
        ));

        Self {
            pool,
            config,
            tickets,
            device_tokens,
            preferences,
            users,
            trigger,
            reconciler,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Spawn the receipt reconciler loop.
    pub fn start_background_tasks(&self) -> JoinHandle<()> {
        self.reconciler
            .clone()
            .start(self.cancellation_token.child_token())
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.trigger.clone(), self.reconciler.clone())
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Signal every background task and the API server to stop.
    pub fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
    }
}
