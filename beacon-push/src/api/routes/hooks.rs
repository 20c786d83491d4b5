//! Beacon change hooks.
//!
//! Every call answers 200 with the trigger outcome. An unreadable body becomes a
//! skipped outcome rather than a client error so the caller never redelivers it.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    routing::post,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::api::server::AppState;
use crate::notification::{SkipReason, TriggerOutcome};

/// Document snapshots around a change. Missing sides are `null`.
#[derive(Debug, Default, Deserialize)]
pub struct BeaconChange {
    #[serde(default)]
    pub before: Value,
    #[serde(default)]
    pub after: Value,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/beacons/{id}/created", post(beacon_created))
        .route("/beacons/{id}/updated", post(beacon_updated))
}

fn parse_change(beacon_id: &str, body: &[u8]) -> Result<BeaconChange, TriggerOutcome> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(beacon_id, error = %e, "Unreadable beacon change payload");
        TriggerOutcome::Skipped(SkipReason::Malformed {
            reason: e.to_string(),
        })
    })
}

async fn beacon_created(
    State(state): State<AppState>,
    Path(beacon_id): Path<String>,
    body: Bytes,
) -> Json<TriggerOutcome> {
    let outcome = match parse_change(&beacon_id, &body) {
        Ok(change) => state.trigger.on_create(&beacon_id, &change.after).await,
        Err(outcome) => outcome,
    };
    Json(outcome)
}

async fn beacon_updated(
    State(state): State<AppState>,
    Path(beacon_id): Path<String>,
    body: Bytes,
) -> Json<TriggerOutcome> {
    let outcome = match parse_change(&beacon_id, &body) {
        Ok(change) => {
            state
                .trigger
                .on_update(&beacon_id, &change.before, &change.after)
                .await
        }
        Err(outcome) => outcome,
    };
    Json(outcome)
}
