//! Push subscription storage.
//!
//! The fan-out only needs two operations from a store: select every
//! subscription of an owner, and delete a batch by id. [`SubscriptionStore`]
//! is that seam. [`JsonSubscriptionStore`] is the bundled implementation: a
//! table kept in memory and, when opened from a path, persisted as JSON so
//! subscriptions survive restarts.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::push::PushSubscription;

/// A subscription as held by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSubscription {
    /// Opaque store identifier.
    pub id: String,
    /// Owner (host) this browser subscribed for.
    pub owner_id: String,
    /// Endpoint and key material.
    #[serde(flatten)]
    pub subscription: PushSubscription,
}

/// Backing store the fan-out reads from and prunes.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// All subscriptions registered for `owner_id`.
    async fn select(&self, owner_id: &str) -> Result<Vec<StoredSubscription>>;

    /// Delete the subscriptions with the given ids. Unknown ids are ignored.
    async fn delete_many(&self, ids: &[String]) -> Result<()>;
}

/// Serialized form of the subscription table.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SubscriptionTable {
    subscriptions: Vec<StoredSubscription>,
}

impl SubscriptionTable {
    /// Insert or overwrite the row for (owner, endpoint). Returns its id.
    fn upsert(&mut self, owner_id: &str, subscription: PushSubscription) -> String {
        if let Some(existing) = self
            .subscriptions
            .iter_mut()
            .find(|s| s.owner_id == owner_id && s.subscription.endpoint == subscription.endpoint)
        {
            existing.subscription = subscription;
            return existing.id.clone();
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.subscriptions.push(StoredSubscription {
            id: id.clone(),
            owner_id: owner_id.to_string(),
            subscription,
        });
        id
    }

    fn remove(&mut self, owner_id: &str, endpoint: &str) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions
            .retain(|s| !(s.owner_id == owner_id && s.subscription.endpoint == endpoint));
        self.subscriptions.len() != before
    }

    fn delete_many(&mut self, ids: &[String]) -> usize {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| !ids.contains(s.id.as_str()));
        before - self.subscriptions.len()
    }

    fn select(&self, owner_id: &str) -> Vec<StoredSubscription> {
        self.subscriptions
            .iter()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect()
    }
}

/// Subscription table in memory, optionally persisted to a JSON file.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash never leaves a half-written file.
#[derive(Debug)]
pub struct JsonSubscriptionStore {
    table: RwLock<SubscriptionTable>,
    path: Option<PathBuf>,
}

impl JsonSubscriptionStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            table: RwLock::new(SubscriptionTable::default()),
            path: None,
        }
    }

    /// Open (or start) a store persisted at `path`.
    ///
    /// A missing file yields an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = match tokio::fs::read(&path).await {
            Ok(content) => serde_json::from_slice(&content)
                .with_context(|| format!("Failed to parse subscription store {:?}", path))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SubscriptionTable::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read subscription store {:?}", path))
            }
        };

        log::info!(
            "[Store] Loaded {} push subscription(s) from {:?}",
            table.subscriptions.len(),
            path
        );
        Ok(Self {
            table: RwLock::new(table),
            path: Some(path),
        })
    }

    /// Add or update a subscription for an owner.
    ///
    /// Re-subscribing the same endpoint for the same owner overwrites its
    /// keys and keeps the id.
    pub async fn upsert(&self, owner_id: &str, subscription: PushSubscription) -> Result<String> {
        let mut table = self.table.write().await;
        let id = table.upsert(owner_id, subscription);
        self.persist(&table).await?;
        Ok(id)
    }

    /// Remove an owner's subscription by endpoint. Returns whether one existed.
    pub async fn remove(&self, owner_id: &str, endpoint: &str) -> Result<bool> {
        let mut table = self.table.write().await;
        let removed = table.remove(owner_id, endpoint);
        if removed {
            self.persist(&table).await?;
        }
        Ok(removed)
    }

    /// Number of stored subscriptions across all owners.
    pub async fn len(&self) -> usize {
        self.table.read().await.subscriptions.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.table.read().await.subscriptions.is_empty()
    }

    async fn persist(&self, table: &SubscriptionTable) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create subscription store directory")?;
        }

        let content =
            serde_json::to_vec_pretty(table).context("Failed to serialize push subscriptions")?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .context("Failed to write push subscriptions file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp_path, perms)
                .await
                .context("Failed to set push subscriptions file permissions")?;
        }

        tokio::fs::rename(&tmp_path, path)
            .await
            .context("Failed to replace push subscriptions file")?;

        log::debug!("[Store] Saved push subscriptions to {:?}", path);
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for JsonSubscriptionStore {
    async fn select(&self, owner_id: &str) -> Result<Vec<StoredSubscription>> {
        Ok(self.table.read().await.select(owner_id))
    }

    async fn delete_many(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut table = self.table.write().await;
        let removed = table.delete_many(ids);
        if removed > 0 {
            log::info!("[Store] Deleted {} push subscription(s)", removed);
            self.persist(&table).await?;
        }
        Ok(())
    }
}
