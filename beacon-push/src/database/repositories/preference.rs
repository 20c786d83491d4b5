//! Beacon opt-in repositories.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::time::now_ms;

/// Reads and writes both opt-in locations.
///
/// Getters return `None` when no row exists, which callers treat as "not opted in".
#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    async fn get_subscription(&self, subscriber_uid: &str, owner_uid: &str)
    -> Result<Option<bool>>;

    async fn set_subscription(
        &self,
        subscriber_uid: &str,
        owner_uid: &str,
        enabled: bool,
    ) -> Result<()>;

    async fn get_friend_preference(&self, uid: &str, friend_uid: &str) -> Result<Option<bool>>;

    async fn set_friend_preference(
        &self,
        uid: &str,
        friend_uid: &str,
        notify_beacons: bool,
    ) -> Result<()>;
}

pub struct SqlxPreferenceRepository {
    pool: SqlitePool,
}

impl SqlxPreferenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceRepository for SqlxPreferenceRepository {
    async fn get_subscription(
        &self,
        subscriber_uid: &str,
        owner_uid: &str,
    ) -> Result<Option<bool>> {
        let row: Option<(bool,)> = sqlx::query_as(
            "SELECT enabled FROM beacon_subscriptions WHERE subscriber_uid = ? AND owner_uid = ?",
        )
        .bind(subscriber_uid)
        .bind(owner_uid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(enabled,)| enabled))
    }

    async fn set_subscription(
        &self,
        subscriber_uid: &str,
        owner_uid: &str,
        enabled: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO beacon_subscriptions (subscriber_uid, owner_uid, enabled, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(subscriber_uid, owner_uid) DO UPDATE SET
                enabled = excluded.enabled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(subscriber_uid)
        .bind(owner_uid)
        .bind(enabled)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_friend_preference(&self, uid: &str, friend_uid: &str) -> Result<Option<bool>> {
        let row: Option<(bool,)> = sqlx::query_as(
            "SELECT notify_beacons FROM friend_preferences WHERE uid = ? AND friend_uid = ?",
        )
        .bind(uid)
        .bind(friend_uid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(notify,)| notify))
    }

    async fn set_friend_preference(
        &self,
        uid: &str,
        friend_uid: &str,
        notify_beacons: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO friend_preferences (uid, friend_uid, notify_beacons, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(uid, friend_uid) DO UPDATE SET
                notify_beacons = excluded.notify_beacons,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(uid)
        .bind(friend_uid)
        .bind(notify_beacons)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
