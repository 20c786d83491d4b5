//! Operator-triggered jobs.

use axum::{Json, Router, extract::State, routing::post};

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::notification::ReconcileSummary;

pub fn router() -> Router<AppState> {
    Router::new().route("/receipts", post(run_receipts))
}

/// Run one reconciliation tick now, alongside the scheduled loop.
async fn run_receipts(State(state): State<AppState>) -> ApiResult<Json<ReconcileSummary>> {
    let summary = state.reconciler.run_once().await?;
    Ok(Json(summary))
}
