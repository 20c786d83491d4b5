//! Canonical device token repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::DeviceTokenDbModel;
use crate::database::retry::retry_on_sqlite_busy;

#[async_trait]
pub trait DeviceTokenRepository: Send + Sync {
    async fn list_for_user(&self, uid: &str) -> Result<Vec<DeviceTokenDbModel>>;

    /// Insert or replace the row for `(uid, installation_id)`.
    async fn upsert(&self, device: &DeviceTokenDbModel) -> Result<()>;

    /// Delete every row of `uid` whose token, ignoring surrounding whitespace, is
    /// `token`. Returns the number of rows removed.
    async fn delete_token(&self, uid: &str, token: &str) -> Result<u64>;
}

pub struct SqlxDeviceTokenRepository {
    pool: SqlitePool,
}

impl SqlxDeviceTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceTokenRepository for SqlxDeviceTokenRepository {
    async fn list_for_user(&self, uid: &str) -> Result<Vec<DeviceTokenDbModel>> {
        let rows = sqlx::query_as::<_, DeviceTokenDbModel>(
            "SELECT * FROM device_tokens WHERE uid = ? ORDER BY updated_at DESC, installation_id",
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert(&self, device: &DeviceTokenDbModel) -> Result<()> {
        retry_on_sqlite_busy("upsert_device_token", || async {
            sqlx::query(
                r#"
                INSERT INTO device_tokens (uid, installation_id, token, platform, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(uid, installation_id) DO UPDATE SET
                    token = excluded.token,
                    platform = excluded.platform,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&device.uid)
            .bind(&device.installation_id)
            .bind(&device.token)
            .bind(&device.platform)
            .bind(device.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn delete_token(&self, uid: &str, token: &str) -> Result<u64> {
        retry_on_sqlite_busy("delete_device_token", || async {
            let result = sqlx::query(
                r#"
                DELETE FROM device_tokens
                WHERE uid = ? AND TRIM(token, ' ' || char(9) || char(10) || char(13)) = ?
                "#,
            )
            .bind(uid)
            .bind(token)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::memory_pool;

    #[tokio::test]
    async fn test_upsert_replaces_installation_token() {
        let repo = SqlxDeviceTokenRepository::new(memory_pool().await);
        repo.upsert(&DeviceTokenDbModel::new("u1", "phone", "ExpoPushToken[a]", "ios"))
            .await
            .unwrap();
        repo.upsert(&DeviceTokenDbModel::new("u1", "phone", "ExpoPushToken[b]", "ios"))
            .await
            .unwrap();
        repo.upsert(&DeviceTokenDbModel::new("u1", "tablet", "ExpoPushToken[c]", "android"))
            .await
            .unwrap();

        let mut tokens: Vec<String> = repo
            .list_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.token)
            .collect();
        tokens.sort();
        assert_eq!(tokens, vec!["ExpoPushToken[b]", "ExpoPushToken[c]"]);
    }

    #[tokio::test]
    async fn test_delete_token_scoped_to_user() {
        let repo = SqlxDeviceTokenRepository::new(memory_pool().await);
        repo.upsert(&DeviceTokenDbModel::new("u1", "phone", "ExpoPushToken[a]", "ios"))
            .await
            .unwrap();
        repo.upsert(&DeviceTokenDbModel::new("u2", "phone", "ExpoPushToken[a]", "ios"))
            .await
            .unwrap();

        assert_eq!(repo.delete_token("u1", "ExpoPushToken[a]").await.unwrap(), 1);
        assert_eq!(repo.delete_token("u1", "ExpoPushToken[a]").await.unwrap(), 0);
        assert!(repo.list_for_user("u1").await.unwrap().is_empty());
        assert_eq!(repo.list_for_user("u2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_token_matches_padded_row() {
        let repo = SqlxDeviceTokenRepository::new(memory_pool().await);
        repo.upsert(&DeviceTokenDbModel::new("u1", "phone", " ExpoPushToken[a]\n", "ios"))
            .await
            .unwrap();
        repo.upsert(&DeviceTokenDbModel::new("u1", "tablet", "ExpoPushToken[b]", "android"))
            .await
            .unwrap();

        assert_eq!(repo.delete_token("u1", "ExpoPushToken[a]").await.unwrap(), 1);
        let left = repo.list_for_user("u1").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].token, "ExpoPushToken[b]");
    }
}
