//! Durable subscription store backed by a JSON file
//!
//! Every mutation is applied to a copy of the map, written to a temporary file
//! and renamed into place, and only then committed in memory. A failed write
//! leaves both the file and the in-memory map untouched.
//!
//! `clear` releases the in-memory copy and closes the store. A closed store
//! rejects mutations, so it never overwrites the file with the emptied map.

use super::memory::{insert_new, remove_existing, replace_existing};
use super::SubscriptionStore;
use crate::error::{AdapterError, Result};
use crate::model::Subscription;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

pub struct FileStore {
    path: PathBuf,
    subscriptions: RwLock<HashMap<String, Subscription>>,
    closed: AtomicBool,
}

impl FileStore {
    /// Open a store, loading any subscriptions already on disk
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let subscriptions = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => {
                let records: Vec<Subscription> = serde_json::from_str(&content)
                    .map_err(|e| storage_error(&path, format!("corrupt subscription file: {e}")))?;
                records
                    .into_iter()
                    .map(|s| (s.subscription_id.clone(), s))
                    .collect()
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(storage_error(&path, e.to_string())),
        };

        tracing::info!(
            "Loaded {} subscriptions from {}",
            subscriptions.len(),
            path.display()
        );

        Ok(Self {
            path,
            subscriptions: RwLock::new(subscriptions),
            closed: AtomicBool::new(false),
        })
    }

    /// Default location for a backend's subscription file
    pub fn default_path(backend: &str) -> Option<PathBuf> {
        dirs::data_dir().map(|p| {
            p.join("ocloud-adapters")
                .join(format!("subscriptions-{backend}.json"))
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn commit<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, Subscription>) -> Result<()>,
    {
        let mut subscriptions = self.subscriptions.write().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(storage_error(&self.path, "store is closed".to_string()));
        }
        let mut next = subscriptions.clone();
        f(&mut next)?;
        self.persist(&next).await?;
        *subscriptions = next;
        Ok(())
    }

    async fn persist(&self, map: &HashMap<String, Subscription>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(parent, e.to_string()))?;
        }

        let mut records: Vec<&Subscription> = map.values().collect();
        records.sort_by(|a, b| a.subscription_id.cmp(&b.subscription_id));
        let content = serde_json::to_string_pretty(&records)
            .map_err(|e| storage_error(&self.path, e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| storage_error(&tmp, e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| storage_error(&self.path, e.to_string()))?;
        Ok(())
    }
}

fn storage_error(path: &Path, message: String) -> AdapterError {
    AdapterError::Storage {
        path: path.display().to_string(),
        message,
    }
}

#[async_trait]
impl SubscriptionStore for FileStore {
    async fn insert(&self, subscription: Subscription) -> Result<()> {
        self.commit(|map| insert_new(map, subscription)).await
    }

    async fn get(&self, id: &str) -> Result<Subscription> {
        self.subscriptions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AdapterError::SubscriptionNotFound { id: id.to_string() })
    }

    async fn replace(&self, subscription: Subscription) -> Result<()> {
        self.commit(|map| replace_existing(map, subscription)).await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.commit(|map| remove_existing(map, id)).await
    }

    async fn list(&self) -> Result<Vec<Subscription>> {
        Ok(self.subscriptions.read().await.values().cloned().collect())
    }

    async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Releases memory only; the file keeps its records for the next open
    async fn clear(&self) {
        let mut subscriptions = self.subscriptions.write().await;
        self.closed.store(true, Ordering::SeqCst);
        subscriptions.clear();
    }
}
