//! Capability-checked, observed dispatch onto any [`Adapter`]

use super::{bounded_health, Adapter, Capabilities, Capability};
use crate::error::{AdapterError, Result};
use crate::model::{
    DeploymentManager, Filter, Resource, ResourcePool, ResourceType, Subscription,
};
use crate::observability::Observer;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Wraps a backend so unadvertised method groups fail with `NotImplemented`
/// before reaching it, and every call is reported to the observer.
pub struct InstrumentedAdapter {
    inner: Arc<dyn Adapter>,
    observer: Arc<dyn Observer>,
}

impl InstrumentedAdapter {
    pub fn new(inner: Arc<dyn Adapter>, observer: Arc<dyn Observer>) -> Self {
        Self { inner, observer }
    }

    async fn dispatch<T, F>(&self, capability: Capability, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let start = Instant::now();
        let result = if self.inner.capabilities().supports(capability) {
            call.await
        } else {
            Err(AdapterError::not_implemented(self.inner.name(), operation))
        };
        self.observer
            .record_operation(self.inner.name(), operation, start, result.as_ref().err());
        result
    }
}

#[async_trait]
impl Adapter for InstrumentedAdapter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn version(&self) -> &str {
        self.inner.version()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    async fn health(&self) -> Result<()> {
        let start = Instant::now();
        let result = if self.inner.capabilities().supports(Capability::HealthChecks) {
            bounded_health(self.inner.health()).await
        } else {
            Err(AdapterError::not_implemented(self.inner.name(), "health"))
        };
        self.observer
            .record_health_check(self.inner.name(), start, result.as_ref().err());
        result
    }

    async fn close(&self) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.close().await;
        self.observer
            .record_operation(self.inner.name(), "close", start, result.as_ref().err());
        result
    }

    async fn list_resource_pools(&self, filter: Option<&Filter>) -> Result<Vec<ResourcePool>> {
        self.dispatch(
            Capability::ResourcePools,
            "list_resource_pools",
            self.inner.list_resource_pools(filter),
        )
        .await
    }

    async fn get_resource_pool(&self, id: &str) -> Result<ResourcePool> {
        self.dispatch(
            Capability::ResourcePools,
            "get_resource_pool",
            self.inner.get_resource_pool(id),
        )
        .await
    }

    async fn create_resource_pool(&self, pool: ResourcePool) -> Result<ResourcePool> {
        self.dispatch(
            Capability::ResourcePools,
            "create_resource_pool",
            self.inner.create_resource_pool(pool),
        )
        .await
    }

    async fn update_resource_pool(&self, id: &str, pool: ResourcePool) -> Result<ResourcePool> {
        self.dispatch(
            Capability::ResourcePools,
            "update_resource_pool",
            self.inner.update_resource_pool(id, pool),
        )
        .await
    }

    async fn delete_resource_pool(&self, id: &str) -> Result<()> {
        self.dispatch(
            Capability::ResourcePools,
            "delete_resource_pool",
            self.inner.delete_resource_pool(id),
        )
        .await
    }

    async fn list_resources(&self, filter: Option<&Filter>) -> Result<Vec<Resource>> {
        self.dispatch(
            Capability::Resources,
            "list_resources",
            self.inner.list_resources(filter),
        )
        .await
    }

    async fn get_resource(&self, id: &str) -> Result<Resource> {
        self.dispatch(Capability::Resources, "get_resource", self.inner.get_resource(id))
            .await
    }

    async fn create_resource(&self, resource: Resource) -> Result<Resource> {
        self.dispatch(
            Capability::Resources,
            "create_resource",
            self.inner.create_resource(resource),
        )
        .await
    }

    async fn update_resource(&self, id: &str, resource: Resource) -> Result<Resource> {
        self.dispatch(
            Capability::Resources,
            "update_resource",
            self.inner.update_resource(id, resource),
        )
        .await
    }

    async fn delete_resource(&self, id: &str) -> Result<()> {
        self.dispatch(
            Capability::Resources,
            "delete_resource",
            self.inner.delete_resource(id),
        )
        .await
    }

    async fn list_resource_types(&self, filter: Option<&Filter>) -> Result<Vec<ResourceType>> {
        self.dispatch(
            Capability::ResourceTypes,
            "list_resource_types",
            self.inner.list_resource_types(filter),
        )
        .await
    }

    async fn get_resource_type(&self, id: &str) -> Result<ResourceType> {
        self.dispatch(
            Capability::ResourceTypes,
            "get_resource_type",
            self.inner.get_resource_type(id),
        )
        .await
    }

    async fn get_deployment_manager(&self, id: &str) -> Result<DeploymentManager> {
        self.dispatch(
            Capability::DeploymentManagers,
            "get_deployment_manager",
            self.inner.get_deployment_manager(id),
        )
        .await
    }

    async fn create_subscription(&self, subscription: Subscription) -> Result<Subscription> {
        self.dispatch(
            Capability::Subscriptions,
            "create_subscription",
            self.inner.create_subscription(subscription),
        )
        .await
    }

    async fn get_subscription(&self, id: &str) -> Result<Subscription> {
        self.dispatch(
            Capability::Subscriptions,
            "get_subscription",
            self.inner.get_subscription(id),
        )
        .await
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.dispatch(
            Capability::Subscriptions,
            "list_subscriptions",
            self.inner.list_subscriptions(),
        )
        .await
    }

    async fn update_subscription(
        &self,
        id: &str,
        subscription: Subscription,
    ) -> Result<Subscription> {
        self.dispatch(
            Capability::Subscriptions,
            "update_subscription",
            self.inner.update_subscription(id, subscription),
        )
        .await
    }

    async fn delete_subscription(&self, id: &str) -> Result<()> {
        self.dispatch(
            Capability::Subscriptions,
            "delete_subscription",
            self.inner.delete_subscription(id),
        )
        .await
    }
}
