//! Beacon opt-in preference models.
//!
//! Opt-ins live in two places: the canonical `beacon_subscriptions` table and the
//! legacy `friend_preferences` table that predates it.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Canonical opt-in: `subscriber_uid` wants beacons from `owner_uid`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct BeaconSubscriptionDbModel {
    pub subscriber_uid: String,
    pub owner_uid: String,
    pub enabled: bool,
    pub updated_at: i64,
}

/// Legacy opt-in stored on the friendship from the recipient's side.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct FriendPreferenceDbModel {
    /// The recipient.
    pub uid: String,
    /// The beacon owner.
    pub friend_uid: String,
    pub notify_beacons: bool,
    pub updated_at: i64,
}
