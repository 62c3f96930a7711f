//! In-memory ability profile store with JSON snapshots.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;

use gil_core::config::IrtConfig;
use gil_core::model::AbilityProfile;
use gil_core::traits::ProfileStore;

use crate::error::StoreError;

/// Profiles keyed by (user, domain).
pub struct InMemoryProfileStore {
    prior: IrtConfig,
    profiles: RwLock<HashMap<(String, String), AbilityProfile>>,
}

impl InMemoryProfileStore {
    /// `prior` supplies theta and standard error for profiles created on first load.
    pub fn new(prior: IrtConfig) -> Self {
        Self {
            prior,
            profiles: RwLock::new(HashMap::new()),
        }
    }

    /// Every stored profile, ordered by user then domain.
    pub async fn snapshot(&self) -> Vec<AbilityProfile> {
        let mut all: Vec<AbilityProfile> = self.profiles.read().await.values().cloned().collect();
        all.sort_by(|a, b| (&a.user_id, &a.domain).cmp(&(&b.user_id, &b.domain)));
        all
    }

    /// Write all profiles to a JSON file.
    pub async fn save_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.snapshot().await)
            .map_err(|e| StoreError::snapshot(path, e))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| StoreError::snapshot(path, e))
    }

    /// Replace the store contents with a JSON snapshot.
    pub async fn load_snapshot(&self, path: &Path) -> Result<usize, StoreError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::snapshot(path, e))?;
        let loaded: Vec<AbilityProfile> =
            serde_json::from_str(&content).map_err(|e| StoreError::snapshot(path, e))?;

        let mut profiles = self.profiles.write().await;
        profiles.clear();
        for p in loaded {
            profiles.insert((p.user_id.clone(), p.domain.clone()), p);
        }
        Ok(profiles.len())
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn load_profile(&self, user_id: &str, domain: &str) -> anyhow::Result<AbilityProfile> {
        let key = (user_id.to_string(), domain.to_string());
        if let Some(profile) = self.profiles.read().await.get(&key) {
            return Ok(profile.clone());
        }

        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .entry(key)
            .or_insert_with(|| {
                tracing::debug!(user = user_id, domain, "creating ability profile");
                AbilityProfile::new(user_id, domain, &self.prior)
            })
            .clone();
        Ok(profile)
    }

    async fn save_profile(&self, profile: &AbilityProfile) -> anyhow::Result<()> {
        self.profiles.write().await.insert(
            (profile.user_id.clone(), profile.domain.clone()),
            profile.clone(),
        );
        Ok(())
    }
}
