//! Beacon document snapshots.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// The fields of a beacon document the pipeline reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beacon {
    pub owner_uid: String,
    #[serde(default)]
    pub active: bool,
    /// Audience chosen when the beacon was lit.
    #[serde(default)]
    pub allowed_uids: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
}

impl Beacon {
    pub fn from_snapshot(snapshot: &Value) -> Result<Self> {
        let beacon = Self::deserialize(snapshot)?;
        if beacon.owner_uid.trim().is_empty() {
            return Err(Error::validation("beacon has no ownerUid"));
        }
        Ok(beacon)
    }

    /// Candidate recipients: `allowedUids` deduplicated in order, with blanks and the
    /// owner removed. An empty list means nobody, never everybody.
    pub fn audience(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.allowed_uids
            .iter()
            .map(|uid| uid.trim())
            .filter(|uid| !uid.is_empty() && *uid != self.owner_uid)
            .filter(|uid| seen.insert(*uid))
            .map(str::to_string)
            .collect()
    }
}

/// `true` only for a JSON boolean `true` in the `active` field.
pub fn is_active(snapshot: &Value) -> bool {
    snapshot.get("active").and_then(Value::as_bool) == Some(true)
}
