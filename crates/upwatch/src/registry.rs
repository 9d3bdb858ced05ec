//! Source of target configuration.
//!
//! The engine only reads targets and writes back the derived fields in
//! [`TargetUpdate`]. [`InMemoryRegistry`] is the implementation used by the
//! service binary and the tests.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::TargetError;
use crate::target::{Target, TargetId, TargetUpdate};

/// Registry trait for abstracting target storage
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    /// Get every known target, enabled or not
    async fn get_all(&self) -> Result<Vec<Target>>;

    /// Get a target by id
    async fn get_by_id(&self, id: TargetId) -> Result<Option<Target>>;

    /// Apply a partial update and return the stored target
    async fn update(&self, id: TargetId, update: TargetUpdate) -> Result<Target>;
}

/// Registry kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    targets: RwLock<BTreeMap<TargetId, Target>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a target, replacing one with the same id
    pub async fn insert(&self, target: Target) -> Result<TargetId, TargetError> {
        target.validate()?;
        let id = target.id;
        self.targets.write().await.insert(id, target);
        Ok(id)
    }

    pub async fn remove(&self, id: TargetId) -> Option<Target> {
        self.targets.write().await.remove(&id)
    }

    /// Disable monitoring and record the pause time
    pub async fn pause(&self, id: TargetId) -> Result<Target> {
        let mut targets = self.targets.write().await;
        let target = targets.get_mut(&id).ok_or_else(|| anyhow!("Target {} not found", id))?;
        if target.enabled {
            let now = Utc::now();
            target.enabled = false;
            target.last_disabled_at = Some(now);
            target.updated_at = now;
        }
        Ok(target.clone())
    }

    /// Re-enable monitoring and record the resume time. Resuming an enabled
    /// target leaves it untouched.
    pub async fn resume(&self, id: TargetId) -> Result<Target> {
        let mut targets = self.targets.write().await;
        let target = targets.get_mut(&id).ok_or_else(|| anyhow!("Target {} not found", id))?;
        if !target.enabled {
            let now = Utc::now();
            target.enabled = true;
            target.last_enabled_at = Some(now);
            target.updated_at = now;
        }
        Ok(target.clone())
    }
}

#[async_trait]
impl TargetRegistry for InMemoryRegistry {
    async fn get_all(&self) -> Result<Vec<Target>> {
        Ok(self.targets.read().await.values().cloned().collect())
    }

    async fn get_by_id(&self, id: TargetId) -> Result<Option<Target>> {
        Ok(self.targets.read().await.get(&id).cloned())
    }

    async fn update(&self, id: TargetId, update: TargetUpdate) -> Result<Target> {
        let mut targets = self.targets.write().await;
        let target = targets.get_mut(&id).ok_or_else(|| anyhow!("Target {} not found", id))?;
        update.apply(target);
        Ok(target.clone())
    }
}
