//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::error::{Error, Result};
use crate::notification::{BeaconTrigger, ReceiptReconciler};

/// API server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Request body size limit in bytes
    pub body_limit: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            body_limit: 1024 * 1024, // 1MB
        }
    }
}

impl ApiServerConfig {
    /// Load API server config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS` (e.g. "0.0.0.0")
    /// - `API_PORT` (e.g. "8080")
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(bind_address) = std::env::var("API_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }

        if let Ok(port) = std::env::var("API_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }

        config
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub trigger: Arc<BeaconTrigger>,
    pub reconciler: Arc<ReceiptReconciler>,
}

impl AppState {
    pub fn new(trigger: Arc<BeaconTrigger>, reconciler: Arc<ReceiptReconciler>) -> Self {
        Self {
            start_time: Instant::now(),
            trigger,
            reconciler,
        }
    }
}

pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            state,
            cancel_token,
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Router {
        routes::create_router(self.state.clone())
            .layer(DefaultBodyLimit::max(self.config.body_limit))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &Request| {
                        if req.uri().path().starts_with("/health") {
                            Span::none()
                        } else {
                            let mut make_span = tower_http::trace::DefaultMakeSpan::new()
                                .level(tracing::Level::INFO);
                            use tower_http::trace::MakeSpan;
                            make_span.make_span(req)
                        }
                    })
                    .on_response(
                        |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                            if span.is_disabled() {
                                return;
                            }
                            let on_response = tower_http::trace::DefaultOnResponse::new()
                                .level(tracing::Level::INFO);
                            use tower_http::trace::OnResponse;
                            on_response.on_response(res, latency, span);
                        },
                    ),
            )
    }

    /// Serve until the cancellation token fires.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| Error::ApiError(format!("Invalid address: {}", e)))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| Error::ApiError(format!("Server error: {}", e)))?;

        Ok(())
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ApiServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.body_limit, 1024 * 1024);
    }
}
