//! API route modules.

pub mod health;
pub mod hooks;
pub mod jobs;

use axum::Router;

use crate::api::server::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/hooks", hooks::router())
        .nest("/jobs", jobs::router())
        .nest("/health", health::router())
        .with_state(state)
}
