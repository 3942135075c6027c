//! User records and their store
//!
//! The search layer needs three things from a user: the tier, any personal
//! provider keys, and the daily quota state. [`UserDirectory`] abstracts the
//! store; [`InMemoryUserDirectory`] backs the binary and the tests.

use crate::error::SearchError;
use crate::providers::{ProviderCredentials, ProviderKind};
use crate::quota::{QuotaGuard, QuotaState, Tier};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub tier: Tier,
    #[serde(default)]
    pub credentials: ProviderCredentials,
    #[serde(default)]
    pub quota: QuotaState,
}

impl UserRecord {
    pub fn new(id: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: id.into(),
            tier,
            credentials: ProviderCredentials::default(),
            quota: QuotaState::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: ProviderCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_quota(mut self, quota: QuotaState) -> Self {
        self.quota = quota;
        self
    }
}

/// Async user store
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Load a user, or [`SearchError::UnknownUser`]
    async fn load(&self, user_id: &str) -> Result<UserRecord, SearchError>;

    /// Count one search against the user's quota, or fail with
    /// [`SearchError::QuotaExceeded`] when `tier_limit` is already reached.
    ///
    /// The check and the increment must be one atomic step per user.
    async fn record_search(
        &self,
        user_id: &str,
        guard: &QuotaGuard,
        tier_limit: i64,
    ) -> Result<QuotaState, SearchError>;

    /// Save a validated provider key for the user
    async fn store_credential(
        &self,
        user_id: &str,
        kind: ProviderKind,
        api_key: &str,
    ) -> Result<(), SearchError>;
}

/// In-memory user store. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: UserRecord) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// Seed a directory from a YAML list of user records
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let records: Vec<UserRecord> = serde_yaml::from_str(content)?;
        let users = records
            .into_iter()
            .map(|user| (user.id.clone(), user))
            .collect();
        Ok(Self {
            users: Arc::new(RwLock::new(users)),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading users from {}", path.as_ref().display()))?;
        Self::from_yaml(&content)
    }
}

fn unknown(user_id: &str) -> SearchError {
    SearchError::UnknownUser(user_id.to_string())
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn load(&self, user_id: &str) -> Result<UserRecord, SearchError> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| unknown(user_id))
    }

    async fn record_search(
        &self,
        user_id: &str,
        guard: &QuotaGuard,
        tier_limit: i64,
    ) -> Result<QuotaState, SearchError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(user_id).ok_or_else(|| unknown(user_id))?;
        user.quota = guard.try_record(user.quota, tier_limit)?;
        Ok(user.quota)
    }

    async fn store_credential(
        &self,
        user_id: &str,
        kind: ProviderKind,
        api_key: &str,
    ) -> Result<(), SearchError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(user_id).ok_or_else(|| unknown(user_id))?;
        user.credentials = std::mem::take(&mut user.credentials).with(kind, api_key.trim());
        Ok(())
    }
}
