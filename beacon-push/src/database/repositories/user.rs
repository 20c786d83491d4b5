//! User and profile document repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{UserDbModel, UserProfileDbModel};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, uid: &str) -> Result<Option<UserDbModel>>;
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfileDbModel>>;
    async fn upsert_user(&self, user: &UserDbModel) -> Result<()>;
    async fn upsert_profile(&self, profile: &UserProfileDbModel) -> Result<()>;
}

pub struct SqlxUserRepository {
    pool: SqlitePool,
}

impl SqlxUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn get_user(&self, uid: &str) -> Result<Option<UserDbModel>> {
        let user = sqlx::query_as::<_, UserDbModel>("SELECT * FROM users WHERE uid = ?")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfileDbModel>> {
        let profile =
            sqlx::query_as::<_, UserProfileDbModel>("SELECT * FROM user_profiles WHERE uid = ?")
                .bind(uid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(profile)
    }

    async fn upsert_user(&self, user: &UserDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (uid, display_name, push_token) VALUES (?, ?, ?)
            ON CONFLICT(uid) DO UPDATE SET
                display_name = excluded.display_name,
                push_token = excluded.push_token
            "#,
        )
        .bind(&user.uid)
        .bind(&user.display_name)
        .bind(&user.push_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_profile(&self, profile: &UserProfileDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles (uid, push_token) VALUES (?, ?)
            ON CONFLICT(uid) DO UPDATE SET push_token = excluded.push_token
            "#,
        )
        .bind(&profile.uid)
        .bind(&profile.push_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::memory_pool;

    #[tokio::test]
    async fn test_user_and_profile_roundtrip() {
        let repo = SqlxUserRepository::new(memory_pool().await);
        assert!(repo.get_user("u1").await.unwrap().is_none());

        repo.upsert_user(&UserDbModel {
            uid: "u1".to_string(),
            display_name: Some("Ada".to_string()),
            push_token: None,
        })
        .await
        .unwrap();
        repo.upsert_profile(&UserProfileDbModel {
            uid: "u1".to_string(),
            push_token: Some("ExpoPushToken[p]".to_string()),
        })
        .await
        .unwrap();

        let user = repo.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Ada"));
        assert!(user.push_token.is_none());
        let profile = repo.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.push_token.as_deref(), Some("ExpoPushToken[p]"));
    }
}
