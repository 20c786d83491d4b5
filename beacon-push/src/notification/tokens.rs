//! Push token resolution.
//!
//! A user's tokens are spread over the canonical per-device rows and two legacy
//! single-value mirrors. Every [`TokenSource`] is read and the results are merged
//! by [`merge_tokens`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use expo_push::is_expo_push_token;
use futures::future::try_join_all;
use tracing::debug;

use crate::Result;
use crate::database::repositories::{DeviceTokenRepository, UserRepository};

#[async_trait]
pub trait TokenSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw values, possibly blank or malformed.
    async fn tokens_for(&self, uid: &str) -> Result<Vec<String>>;
}

/// Canonical `device_tokens` rows.
pub struct DeviceTokenSource {
    repo: Arc<dyn DeviceTokenRepository>,
}

impl DeviceTokenSource {
    pub fn new(repo: Arc<dyn DeviceTokenRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl TokenSource for DeviceTokenSource {
    fn name(&self) -> &'static str {
        "device_tokens"
    }

    async fn tokens_for(&self, uid: &str) -> Result<Vec<String>> {
        Ok(self
            .repo
            .list_for_user(uid)
            .await?
            .into_iter()
            .map(|device| device.token)
            .collect())
    }
}

/// Legacy `users.push_token` mirror.
pub struct UserTokenSource {
    repo: Arc<dyn UserRepository>,
}

impl UserTokenSource {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl TokenSource for UserTokenSource {
    fn name(&self) -> &'static str {
        "users"
    }

    async fn tokens_for(&self, uid: &str) -> Result<Vec<String>> {
        let user = self.repo.get_user(uid).await?;
        Ok(user.and_then(|u| u.push_token).into_iter().collect())
    }
}

/// Legacy `user_profiles.push_token` mirror.
pub struct ProfileTokenSource {
    repo: Arc<dyn UserRepository>,
}

impl ProfileTokenSource {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl TokenSource for ProfileTokenSource {
    fn name(&self) -> &'static str {
        "user_profiles"
    }

    async fn tokens_for(&self, uid: &str) -> Result<Vec<String>> {
        let profile = self.repo.get_profile(uid).await?;
        Ok(profile.and_then(|p| p.push_token).into_iter().collect())
    }
}

/// Union of trimmed, well-formed tokens, deduplicated by exact string, first
/// occurrence wins.
pub fn merge_tokens<I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for token in lists.into_iter().flatten() {
        let token = token.trim();
        if token.is_empty() || !is_expo_push_token(token) {
            continue;
        }
        if seen.insert(token.to_string()) {
            merged.push(token.to_string());
        }
    }
    merged
}

pub struct TokenResolver {
    sources: Vec<Arc<dyn TokenSource>>,
}

impl TokenResolver {
    pub fn new(sources: Vec<Arc<dyn TokenSource>>) -> Self {
        Self { sources }
    }

    /// Canonical rows first, then the `users` and `user_profiles` mirrors.
    pub fn with_default_sources(
        devices: Arc<dyn DeviceTokenRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self::new(vec![
            Arc::new(DeviceTokenSource::new(devices)),
            Arc::new(UserTokenSource::new(users.clone())),
            Arc::new(ProfileTokenSource::new(users)),
        ])
    }

    /// Effective token set for `uid`. An empty list means the user cannot be
    /// notified; a failed source fails the whole resolution.
    pub async fn resolve(&self, uid: &str) -> Result<Vec<String>> {
        let lists = try_join_all(self.sources.iter().map(|source| source.tokens_for(uid))).await?;
        let raw: usize = lists.iter().map(Vec::len).sum();
        let tokens = merge_tokens(lists);
        debug!(uid, raw, effective = tokens.len(), "Resolved push tokens");
        Ok(tokens)
    }
}
