//! Beacon change triggers.
//!
//! The document store reports every create and update of a beacon. A fan-out runs
//! when a beacon is created active, or when an update moves `active` from anything
//! but `true` to `true`. Everything else is a no-op.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::beacon::{Beacon, is_active};
use super::composer::compose;
use super::sender::{FanoutReport, FanoutSender};
use crate::database::repositories::UserRepository;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No inactive-to-active transition.
    NotActivated,
    /// The snapshot could not be read as a beacon.
    Malformed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Dispatched(FanoutReport),
    Skipped(SkipReason),
}

impl TriggerOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched(_))
    }
}

/// Fires on a create only when the new beacon is already active.
pub fn fires_on_create(after: &Value) -> bool {
    is_active(after)
}

/// Fires on an update only for a not-true to `true` transition of `active`.
pub fn fires_on_update(before: &Value, after: &Value) -> bool {
    !is_active(before) && is_active(after)
}

pub struct BeaconTrigger {
    sender: Arc<FanoutSender>,
    users: Arc<dyn UserRepository>,
}

impl BeaconTrigger {
    pub fn new(sender: Arc<FanoutSender>, users: Arc<dyn UserRepository>) -> Self {
        Self { sender, users }
    }

    pub async fn on_create(&self, beacon_id: &str, after: &Value) -> TriggerOutcome {
        if !fires_on_create(after) {
            debug!(beacon_id, "Beacon created inactive");
            return TriggerOutcome::Skipped(SkipReason::NotActivated);
        }
        self.dispatch(beacon_id, after).await
    }

    pub async fn on_update(&self, beacon_id: &str, before: &Value, after: &Value) -> TriggerOutcome {
        if !fires_on_update(before, after) {
            debug!(beacon_id, "Beacon update is not an activation");
            return TriggerOutcome::Skipped(SkipReason::NotActivated);
        }
        self.dispatch(beacon_id, after).await
    }

    async fn dispatch(&self, beacon_id: &str, after: &Value) -> TriggerOutcome {
        if beacon_id.trim().is_empty() {
            debug!("Beacon event without an id");
            return TriggerOutcome::Skipped(SkipReason::Malformed {
                reason: "missing beacon id".to_string(),
            });
        }

        let beacon = match Beacon::from_snapshot(after) {
            Ok(beacon) => beacon,
            Err(e) => {
                debug!(beacon_id, error = %e, "Ignoring unreadable beacon snapshot");
                return TriggerOutcome::Skipped(SkipReason::Malformed {
                    reason: e.to_string(),
                });
            }
        };

        let owner_name = self.owner_name(&beacon).await;
        let content = compose(
            owner_name.as_deref(),
            beacon.message.as_deref(),
            beacon.details.as_deref(),
        );
        let audience = beacon.audience();
        info!(
            beacon_id,
            owner_uid = %beacon.owner_uid,
            audience = audience.len(),
            "Beacon activated"
        );

        let report = self
            .sender
            .fan_out(beacon_id, &beacon.owner_uid, &content, &audience)
            .await;
        TriggerOutcome::Dispatched(report)
    }

    /// The name on the beacon, else the owner's display name. A failed lookup only
    /// costs the personalised title.
    async fn owner_name(&self, beacon: &Beacon) -> Option<String> {
        if let Some(name) = beacon.owner_name.as_deref().map(str::trim)
            && !name.is_empty()
        {
            return Some(name.to_string());
        }

        match self.users.get_user(&beacon.owner_uid).await {
            Ok(user) => user.and_then(|u| u.display_name),
            Err(e) => {
                debug!(owner_uid = %beacon.owner_uid, error = %e, "Owner lookup failed");
                None
            }
        }
    }
}
