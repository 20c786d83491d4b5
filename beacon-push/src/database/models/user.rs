//! Coarse user documents.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserDbModel {
    pub uid: String,
    pub display_name: Option<String>,
    /// Legacy single-device token mirror.
    pub push_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserProfileDbModel {
    pub uid: String,
    /// Legacy single-device token mirror.
    pub push_token: Option<String>,
}
