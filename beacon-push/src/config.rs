//! Runtime configuration.
//!
//! Every knob has a built-in default; the environment (optionally seeded from a
//! `.env` file) can override them. [`PipelineConfig`] is the immutable policy object
//! shared by the fan-out sender and the receipt reconciler.

use std::str::FromStr;
use std::time::Duration;

use expo_push::{DEFAULT_BASE_URL, PUSH_NOTIFICATION_CHUNK_LIMIT, PUSH_RECEIPT_CHUNK_LIMIT};
use tracing::warn;

/// Default ticket TTL: pending tickets older than this are no longer polled.
pub const DEFAULT_TICKET_TTL: Duration = Duration::from_secs(48 * 60 * 60);

/// Default reconciliation interval.
pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);

const DEFAULT_RECIPIENT_CONCURRENCY: usize = 16;
const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Fan-out and reconciliation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// How long a pending ticket stays eligible for receipt polling.
    pub ticket_ttl: Duration,
    /// Interval between reconciliation ticks.
    pub receipt_poll_interval: Duration,
    /// Messages per gateway send call.
    pub send_batch_size: usize,
    /// Ticket ids per gateway receipt query.
    pub receipt_batch_size: usize,
    /// Recipients resolved concurrently within one fan-out.
    pub recipient_concurrency: usize,
    /// Gateway batches in flight per recipient.
    pub batch_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ticket_ttl: DEFAULT_TICKET_TTL,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            send_batch_size: PUSH_NOTIFICATION_CHUNK_LIMIT,
            receipt_batch_size: PUSH_RECEIPT_CHUNK_LIMIT,
            recipient_concurrency: DEFAULT_RECIPIENT_CONCURRENCY,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl PipelineConfig {
    /// Load overrides from the environment.
    ///
    /// Supported env vars:
    /// - `TICKET_TTL_HOURS`
    /// - `RECEIPT_POLL_INTERVAL_SECS`
    /// - `PUSH_BATCH_SIZE` (capped at the gateway limit)
    /// - `RECEIPT_BATCH_SIZE` (capped at the gateway limit)
    /// - `FANOUT_CONCURRENCY`
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        Self {
            ticket_ttl: env_parse::<u64>("TICKET_TTL_HOURS")
                .map(|h| Duration::from_secs(h * 60 * 60))
                .unwrap_or(defaults.ticket_ttl),
            receipt_poll_interval: env_parse::<u64>("RECEIPT_POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.receipt_poll_interval),
            send_batch_size: env_parse("PUSH_BATCH_SIZE").unwrap_or(defaults.send_batch_size),
            receipt_batch_size: env_parse("RECEIPT_BATCH_SIZE")
                .unwrap_or(defaults.receipt_batch_size),
            recipient_concurrency: env_parse("FANOUT_CONCURRENCY")
                .unwrap_or(defaults.recipient_concurrency),
            batch_concurrency: defaults.batch_concurrency,
        }
        .normalized()
    }

    /// Clamp sizes into the range the gateway accepts.
    pub fn normalized(mut self) -> Self {
        self.send_batch_size = self.send_batch_size.clamp(1, PUSH_NOTIFICATION_CHUNK_LIMIT);
        self.receipt_batch_size = self.receipt_batch_size.clamp(1, PUSH_RECEIPT_CHUNK_LIMIT);
        self.recipient_concurrency = self.recipient_concurrency.max(1);
        self.batch_concurrency = self.batch_concurrency.max(1);
        if self.receipt_poll_interval.is_zero() {
            self.receipt_poll_interval = DEFAULT_RECEIPT_POLL_INTERVAL;
        }
        self
    }

    /// Ticket TTL in milliseconds, for comparisons against stored timestamps.
    pub fn ticket_ttl_ms(&self) -> i64 {
        i64::try_from(self.ticket_ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Push gateway connection settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl GatewayConfig {
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Some(url) = env_string("EXPO_API_URL") {
            config.base_url = url;
        }
        config.access_token = env_string("EXPO_ACCESS_TOKEN");
        if let Some(secs) = env_parse::<u64>("EXPO_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(secs);
        }

        config
    }

    pub fn client_config(&self) -> expo_push::ClientConfig {
        expo_push::ClientConfig {
            base_url: self.base_url.clone(),
            access_token: self.access_token.clone(),
            timeout: self.timeout,
        }
    }
}

/// Top-level configuration for the service binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub log_dir: Option<String>,
    pub pipeline: PipelineConfig,
    pub gateway: GatewayConfig,
    pub server: crate::api::ApiServerConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env_string("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:beacon-push.db?mode=rwc".to_string()),
            log_dir: log_dir_from_env(),
            pipeline: PipelineConfig::from_env_or_default(),
            gateway: GatewayConfig::from_env_or_default(),
            server: crate::api::ApiServerConfig::from_env_or_default(),
        }
    }
}

/// `LOG_DIR`, read on its own so logging can start before the rest of the config
/// is parsed.
pub fn log_dir_from_env() -> Option<String> {
    env_string("LOG_DIR")
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable environment value, using default");
            None
        }
    }
}
