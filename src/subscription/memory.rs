//! In-memory subscription store

use super::SubscriptionStore;
use crate::error::{AdapterError, Result};
use crate::model::Subscription;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Subscriptions held in process memory only
#[derive(Default)]
pub struct MemoryStore {
    subscriptions: RwLock<HashMap<String, Subscription>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing records
    pub fn from_records(records: Vec<Subscription>) -> Self {
        let map = records
            .into_iter()
            .map(|s| (s.subscription_id.clone(), s))
            .collect();
        Self {
            subscriptions: RwLock::new(map),
        }
    }
}

pub(crate) fn insert_new(
    map: &mut HashMap<String, Subscription>,
    subscription: Subscription,
) -> Result<()> {
    if map.contains_key(&subscription.subscription_id) {
        return Err(AdapterError::validation(
            "subscriptionId",
            format!("subscription {} already exists", subscription.subscription_id),
        ));
    }
    map.insert(subscription.subscription_id.clone(), subscription);
    Ok(())
}

pub(crate) fn replace_existing(
    map: &mut HashMap<String, Subscription>,
    subscription: Subscription,
) -> Result<()> {
    match map.get_mut(&subscription.subscription_id) {
        Some(existing) => {
            *existing = subscription;
            Ok(())
        },
        None => Err(AdapterError::SubscriptionNotFound {
            id: subscription.subscription_id,
        }),
    }
}

pub(crate) fn remove_existing(map: &mut HashMap<String, Subscription>, id: &str) -> Result<()> {
    map.remove(id)
        .map(|_| ())
        .ok_or_else(|| AdapterError::SubscriptionNotFound { id: id.to_string() })
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn insert(&self, subscription: Subscription) -> Result<()> {
        insert_new(&mut *self.subscriptions.write().await, subscription)
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
        replace_existing(&mut *self.subscriptions.write().await, subscription)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        remove_existing(&mut *self.subscriptions.write().await, id)
    }

    async fn list(&self) -> Result<Vec<Subscription>> {
        Ok(self.subscriptions.read().await.values().cloned().collect())
    }

    async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    async fn clear(&self) {
        self.subscriptions.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sub(id: &str) -> Subscription {
        Subscription {
            subscription_id: id.into(),
            callback: "https://x".into(),
            ..Subscription::default()
        }
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = MemoryStore::new();
        store.insert(sub("a")).await.unwrap();
        let err = store.insert(sub("a")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_list_is_a_snapshot() {
        let store = MemoryStore::from_records(vec![sub("a"), sub("b")]);
        let snapshot = store.list().await.unwrap();
        store.remove("a").await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
