//! Adapter capability contract
//!
//! Every backend implements [`Adapter`]. Method groups a backend does not wire
//! fall through to default bodies that return `NotImplemented`, and the
//! backend advertises what it does wire through [`Adapter::capabilities`].
//! Callers should go through [`InstrumentedAdapter`], which consults the
//! capability set before dispatch and reports every outcome to the observer.

mod instrumented;

pub use instrumented::InstrumentedAdapter;

use crate::error::{AdapterError, Result};
use crate::model::{
    DeploymentManager, Filter, Resource, ResourcePool, ResourceType, Subscription,
};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Ceiling on a single health check, independent of caller deadlines
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// An optional feature group a backend may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    ResourcePools,
    Resources,
    ResourceTypes,
    DeploymentManagers,
    Subscriptions,
    HealthChecks,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::ResourcePools,
        Capability::Resources,
        Capability::ResourceTypes,
        Capability::DeploymentManagers,
        Capability::Subscriptions,
        Capability::HealthChecks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourcePools => "resource-pools",
            Self::Resources => "resources",
            Self::ResourceTypes => "resource-types",
            Self::DeploymentManagers => "deployment-managers",
            Self::Subscriptions => "subscriptions",
            Self::HealthChecks => "health-checks",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of capabilities a backend advertises
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self(Capability::ALL.into_iter().collect())
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn without(mut self, capability: Capability) -> Self {
        self.0.remove(&capability);
        self
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Tag strings for a deployment manager record
    pub fn tags(&self) -> Vec<String> {
        self.iter().map(|c| c.as_str().to_string()).collect()
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Contract every backend translator implements
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Check backend reachability, bounded by [`HEALTH_CHECK_TIMEOUT`]
    async fn health(&self) -> Result<()> {
        Err(AdapterError::not_implemented(self.name(), "health"))
    }

    /// Release in-memory state. Idempotent.
    async fn close(&self) -> Result<()>;

    async fn list_resource_pools(&self, _filter: Option<&Filter>) -> Result<Vec<ResourcePool>> {
        Err(AdapterError::not_implemented(self.name(), "list_resource_pools"))
    }

    async fn get_resource_pool(&self, _id: &str) -> Result<ResourcePool> {
        Err(AdapterError::not_implemented(self.name(), "get_resource_pool"))
    }

    async fn create_resource_pool(&self, _pool: ResourcePool) -> Result<ResourcePool> {
        Err(AdapterError::not_implemented(self.name(), "create_resource_pool"))
    }

    async fn update_resource_pool(&self, _id: &str, _pool: ResourcePool) -> Result<ResourcePool> {
        Err(AdapterError::not_implemented(self.name(), "update_resource_pool"))
    }

    async fn delete_resource_pool(&self, _id: &str) -> Result<()> {
        Err(AdapterError::not_implemented(self.name(), "delete_resource_pool"))
    }

    async fn list_resources(&self, _filter: Option<&Filter>) -> Result<Vec<Resource>> {
        Err(AdapterError::not_implemented(self.name(), "list_resources"))
    }

    async fn get_resource(&self, _id: &str) -> Result<Resource> {
        Err(AdapterError::not_implemented(self.name(), "get_resource"))
    }

    async fn create_resource(&self, _resource: Resource) -> Result<Resource> {
        Err(AdapterError::not_implemented(self.name(), "create_resource"))
    }

    async fn update_resource(&self, _id: &str, _resource: Resource) -> Result<Resource> {
        Err(AdapterError::not_implemented(self.name(), "update_resource"))
    }

    async fn delete_resource(&self, _id: &str) -> Result<()> {
        Err(AdapterError::not_implemented(self.name(), "delete_resource"))
    }

    async fn list_resource_types(&self, _filter: Option<&Filter>) -> Result<Vec<ResourceType>> {
        Err(AdapterError::not_implemented(self.name(), "list_resource_types"))
    }

    async fn get_resource_type(&self, _id: &str) -> Result<ResourceType> {
        Err(AdapterError::not_implemented(self.name(), "get_resource_type"))
    }

    async fn get_deployment_manager(&self, _id: &str) -> Result<DeploymentManager> {
        Err(AdapterError::not_implemented(self.name(), "get_deployment_manager"))
    }

    async fn create_subscription(&self, _subscription: Subscription) -> Result<Subscription> {
        Err(AdapterError::not_implemented(self.name(), "create_subscription"))
    }

    async fn get_subscription(&self, _id: &str) -> Result<Subscription> {
        Err(AdapterError::not_implemented(self.name(), "get_subscription"))
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        Err(AdapterError::not_implemented(self.name(), "list_subscriptions"))
    }

    async fn update_subscription(
        &self,
        _id: &str,
        _subscription: Subscription,
    ) -> Result<Subscription> {
        Err(AdapterError::not_implemented(self.name(), "update_subscription"))
    }

    async fn delete_subscription(&self, _id: &str) -> Result<()> {
        Err(AdapterError::not_implemented(self.name(), "delete_subscription"))
    }
}

/// Run a health probe under [`HEALTH_CHECK_TIMEOUT`]
pub async fn bounded_health<F>(probe: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    bounded_health_within(HEALTH_CHECK_TIMEOUT, probe).await
}

/// Run a health probe under an explicit ceiling
pub async fn bounded_health_within<F>(ceiling: Duration, probe: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match tokio::time::timeout(ceiling, probe).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout {
            operation: "health".to_string(),
            seconds: ceiling.as_secs_f64(),
        }),
    }
}
