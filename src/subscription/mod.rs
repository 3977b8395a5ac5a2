//! Subscription registry
//!
//! Stores notification subscriptions for one adapter instance. Delivery is not
//! handled here; external pollers read the registry.
//!
//! # Module Structure
//!
//! - [`memory`] - process-local store, lost on restart
//! - [`file`] - durable store persisted to a JSON file

pub mod file;
pub mod memory;

use crate::error::{AdapterError, Result};
use crate::model::Subscription;
use crate::observability::Observer;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage port for subscriptions
///
/// Implementations surface `SubscriptionNotFound` for absent ids and must be
/// safe to call concurrently.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert a subscription whose id is already populated
    async fn insert(&self, subscription: Subscription) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Subscription>;

    /// Replace an existing subscription
    async fn replace(&self, subscription: Subscription) -> Result<()>;

    async fn remove(&self, id: &str) -> Result<()>;

    /// Snapshot of every stored subscription
    async fn list(&self) -> Result<Vec<Subscription>>;

    async fn len(&self) -> usize;

    /// Release in-memory state
    async fn clear(&self);
}

/// Validating front for a [`SubscriptionStore`]
pub struct SubscriptionRegistry {
    backend: String,
    store: Option<Arc<dyn SubscriptionStore>>,
    observer: Arc<dyn Observer>,
}

impl SubscriptionRegistry {
    pub fn new(
        backend: &str,
        store: Arc<dyn SubscriptionStore>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            backend: backend.to_string(),
            store: Some(store),
            observer,
        }
    }

    /// In-memory registry
    pub fn in_memory(backend: &str, observer: Arc<dyn Observer>) -> Self {
        Self::new(backend, Arc::new(MemoryStore::new()), observer)
    }

    /// Registry with no store; every operation is `NotImplemented`
    pub fn disabled(backend: &str, observer: Arc<dyn Observer>) -> Self {
        Self {
            backend: backend.to_string(),
            store: None,
            observer,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self, operation: &str) -> Result<&Arc<dyn SubscriptionStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| AdapterError::not_implemented(&self.backend, operation))
    }

    pub async fn create(&self, mut subscription: Subscription) -> Result<Subscription> {
        let store = self.store("create_subscription")?;
        validate_callback(&subscription)?;

        if subscription.subscription_id.is_empty() {
            subscription.subscription_id = Uuid::new_v4().to_string();
        }

        store.insert(subscription.clone()).await?;
        self.report_count(store).await;
        tracing::info!(
            backend = %self.backend,
            id = %subscription.subscription_id,
            "Subscription created"
        );
        Ok(subscription)
    }

    pub async fn get(&self, id: &str) -> Result<Subscription> {
        self.store("get_subscription")?.get(id).await
    }

    /// Replace callback, consumer id and filter; the id is preserved
    pub async fn update(&self, id: &str, subscription: Subscription) -> Result<Subscription> {
        let store = self.store("update_subscription")?;
        validate_callback(&subscription)?;

        let updated = Subscription {
            subscription_id: id.to_string(),
            ..subscription
        };
        store.replace(updated.clone()).await?;
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let store = self.store("delete_subscription")?;
        store.remove(id).await?;
        self.report_count(store).await;
        tracing::info!(backend = %self.backend, id, "Subscription deleted");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Subscription>> {
        self.store("list_subscriptions")?.list().await
    }

    pub async fn len(&self) -> usize {
        match &self.store {
            Some(store) => store.len().await,
            None => 0,
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop in-memory subscriptions; safe to call repeatedly
    pub async fn close(&self) {
        if let Some(store) = &self.store {
            store.clear().await;
            self.observer.set_subscription_count(&self.backend, 0);
        }
    }

    async fn report_count(&self, store: &Arc<dyn SubscriptionStore>) {
        self.observer
            .set_subscription_count(&self.backend, store.len().await);
    }
}

fn validate_callback(subscription: &Subscription) -> Result<()> {
    if subscription.callback.trim().is_empty() {
        return Err(AdapterError::validation("callback", "callback URL is required"));
    }
    Ok(())
}
