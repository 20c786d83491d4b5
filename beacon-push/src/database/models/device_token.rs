//! Device token models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::now_ms;

/// Canonical per-installation push token row.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DeviceTokenDbModel {
    pub uid: String,
    pub installation_id: String,
    pub token: String,
    /// `ios`, `android`, or `unknown`.
    pub platform: String,
    pub updated_at: i64,
}

impl DeviceTokenDbModel {
    pub fn new(
        uid: impl Into<String>,
        installation_id: impl Into<String>,
        token: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            installation_id: installation_id.into(),
            token: token.into(),
            platform: platform.into(),
            updated_at: now_ms(),
        }
    }
}
