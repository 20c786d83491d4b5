//! Recipient eligibility.
//!
//! Opt-ins are read from every configured [`PreferenceSource`] and combined with OR:
//! one `true` is enough. Dropping a source is a matter of leaving it out of
//! [`EligibilityResolver::new`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

use crate::Result;
use crate::database::repositories::PreferenceRepository;

/// One location that can say whether `recipient_uid` opted in to beacons from `owner_uid`.
#[async_trait]
pub trait PreferenceSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn is_opted_in(&self, recipient_uid: &str, owner_uid: &str) -> Result<bool>;
}

/// Canonical `beacon_subscriptions` rows.
pub struct SubscriptionPreferenceSource {
    repo: Arc<dyn PreferenceRepository>,
}

impl SubscriptionPreferenceSource {
    pub fn new(repo: Arc<dyn PreferenceRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl PreferenceSource for SubscriptionPreferenceSource {
    fn name(&self) -> &'static str {
        "subscription"
    }

    async fn is_opted_in(&self, recipient_uid: &str, owner_uid: &str) -> Result<bool> {
        Ok(self
            .repo
            .get_subscription(recipient_uid, owner_uid)
            .await?
            .unwrap_or(false))
    }
}

/// Legacy `friend_preferences` rows.
pub struct FriendPreferenceSource {
    repo: Arc<dyn PreferenceRepository>,
}

impl FriendPreferenceSource {
    pub fn new(repo: Arc<dyn PreferenceRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl PreferenceSource for FriendPreferenceSource {
    fn name(&self) -> &'static str {
        "friend_preference"
    }

    async fn is_opted_in(&self, recipient_uid: &str, owner_uid: &str) -> Result<bool> {
        Ok(self
            .repo
            .get_friend_preference(recipient_uid, owner_uid)
            .await?
            .unwrap_or(false))
    }
}

/// Verdict for one (recipient, owner) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    NotOptedIn,
    /// No source said yes and at least one could not be read.
    Unknown,
}

pub struct EligibilityResolver {
    sources: Vec<Arc<dyn PreferenceSource>>,
}

impl EligibilityResolver {
    pub fn new(sources: Vec<Arc<dyn PreferenceSource>>) -> Self {
        Self { sources }
    }

    /// Subscription and legacy friend-preference sources over one repository.
    pub fn with_default_sources(repo: Arc<dyn PreferenceRepository>) -> Self {
        Self::new(vec![
            Arc::new(SubscriptionPreferenceSource::new(repo.clone())),
            Arc::new(FriendPreferenceSource::new(repo)),
        ])
    }

    /// Query every source concurrently and OR the answers.
    pub async fn check(&self, recipient_uid: &str, owner_uid: &str) -> Eligibility {
        let answers = join_all(
            self.sources
                .iter()
                .map(|source| source.is_opted_in(recipient_uid, owner_uid)),
        )
        .await;

        let mut failed = false;
        for (source, answer) in self.sources.iter().zip(answers) {
            match answer {
                Ok(true) => return Eligibility::Eligible,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        source = source.name(),
                        recipient_uid,
                        owner_uid,
                        error = %e,
                        "Failed to read beacon preference"
                    );
                    failed = true;
                }
            }
        }

        if failed {
            Eligibility::Unknown
        } else {
            Eligibility::NotOptedIn
        }
    }
}
