//! OpenStack backend
//!
//! Talks to Nova with a Keystone-scoped session token. Pools are either Nova
//! availability zones (read-only) or host aggregates (created and managed
//! through the adapter).

mod translate;

use self::translate::{
    aggregate_to_pool, availability_zone_to_pool, flavor_to_resource_type, server_to_resource,
    Aggregate, AZ_FIELD, HOST_FIELD,
};
use crate::adapter::{bounded_health, Adapter, Capabilities};
use crate::backends::json::{ext_str, extract_items, labels_to_value, str_field};
use crate::backends::AdapterSettings;
use crate::error::{AdapterError, Result};
use crate::filter::{matches_filter, matches_resource_type, paginate};
use crate::model::{
    DeploymentManager, Filter, Resource, ResourcePool, ResourceType, Subscription,
};
use crate::pool::PoolStrategy;
use crate::session::{
    ApiClient, AuthScheme, HttpTransport, IdentityCredentials, SessionManager, TokenSource,
};
use crate::subscription::SubscriptionRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const AVAILABILITY_ZONE_POOLS: PoolStrategy =
    PoolStrategy::backend_managed("os-az-", "availability zone");
pub const AGGREGATE_POOLS: PoolStrategy =
    PoolStrategy::adapter_managed("os-agg-", "host aggregate");

const TOKEN_HEADER: &str = "X-Auth-Token";

/// Safety valve for `*_links` pagination
const MAX_PAGES: usize = 1000;

/// Which Nova construct represents a resource pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenStackPoolMode {
    #[default]
    AvailabilityZones,
    Aggregates,
}

impl OpenStackPoolMode {
    pub fn strategy(&self) -> PoolStrategy {
        match self {
            Self::AvailabilityZones => AVAILABILITY_ZONE_POOLS,
            Self::Aggregates => AGGREGATE_POOLS,
        }
    }
}

fn default_domain() -> String {
    "Default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenStackConfig {
    /// Keystone root, without `/v3`
    pub identity_endpoint: String,
    /// Nova root, e.g. `https://nova.example.com:8774/v2.1`
    pub compute_endpoint: String,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Environment variable holding the password
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default = "default_domain")]
    pub user_domain: String,
    pub project: String,
    #[serde(default = "default_domain")]
    pub project_domain: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub pool_mode: OpenStackPoolMode,
}

impl OpenStackConfig {
    /// Password from the config, or from the named environment variable
    pub fn resolve_password(&self) -> Result<String> {
        if let Some(password) = self.password.as_ref().filter(|p| !p.is_empty()) {
            return Ok(password.clone());
        }
        if let Some(var) = &self.password_env {
            return std::env::var(var).map_err(|_| AdapterError::Config {
                message: format!("environment variable {var} is not set"),
            });
        }
        Err(AdapterError::Config {
            message: "openstack backend needs password or password_env".to_string(),
        })
    }

    pub fn credentials(&self) -> Result<IdentityCredentials> {
        Ok(IdentityCredentials {
            endpoint: self.identity_endpoint.clone(),
            username: self.username.clone(),
            password: self.resolve_password()?,
            user_domain: self.user_domain.clone(),
            project: self.project.clone(),
            project_domain: self.project_domain.clone(),
        })
    }
}

pub struct OpenStackAdapter {
    settings: AdapterSettings,
    config: OpenStackConfig,
    strategy: PoolStrategy,
    session: SessionManager,
    api: ApiClient,
    registry: SubscriptionRegistry,
}

impl OpenStackAdapter {
    pub fn new(
        settings: AdapterSettings,
        config: OpenStackConfig,
        registry: SubscriptionRegistry,
    ) -> Result<Self> {
        let http = HttpTransport::new(AuthScheme::Header(TOKEN_HEADER))?;
        let session = SessionManager::new(http.client().clone(), config.credentials()?);
        Ok(Self::with_session(settings, config, session, http, registry))
    }

    /// Build around an existing session, e.g. one with a manual clock
    pub fn with_session(
        settings: AdapterSettings,
        config: OpenStackConfig,
        session: SessionManager,
        http: HttpTransport,
        registry: SubscriptionRegistry,
    ) -> Self {
        let tokens: Arc<dyn TokenSource> = Arc::new(session.clone());
        Self {
            strategy: config.pool_mode.strategy(),
            api: ApiClient::new(tokens, http),
            settings,
            config,
            session,
            registry,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn deployment_manager_id(&self) -> String {
        let scope = if self.config.region.is_empty() {
            &self.config.project
        } else {
            &self.config.region
        };
        format!("openstack-{scope}")
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.compute_endpoint.trim_end_matches('/'), path)
    }

    /// Fetch a listing, following `{key}_links` next pointers
    async fn fetch_all(&self, path: &str, key: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(self.url(path));
        let links_key = format!("{key}_links");

        for _ in 0..MAX_PAGES {
            let Some(url) = next.take() else {
                break;
            };
            let response = self.api.get(&url).await?;
            items.extend(extract_items(&response, key));
            next = response
                .get(&links_key)
                .and_then(|v| v.as_array())
                .and_then(|links| {
                    links
                        .iter()
                        .find(|l| l.get("rel").and_then(|r| r.as_str()) == Some("next"))
                })
                .and_then(|l| l.get("href").and_then(|h| h.as_str()))
                .map(|href| resolve_link(&url, href));
        }

        Ok(items)
    }

    async fn list_aggregates(&self) -> Result<Vec<Aggregate>> {
        let response = self.api.get(&self.url("os-aggregates")).await?;
        Ok(extract_items(&response, "aggregates")
            .iter()
            .map(Aggregate::from)
            .collect())
    }

    async fn find_aggregate(&self, pool_id: &str) -> Result<Aggregate> {
        let name = self.strategy.native_name(pool_id)?;
        self.list_aggregates()
            .await?
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| AdapterError::ResourcePoolNotFound {
                id: pool_id.to_string(),
            })
    }

    async fn list_availability_zones(&self) -> Result<Vec<Value>> {
        let response = self.api.get(&self.url("os-availability-zone")).await?;
        Ok(extract_items(&response, "availabilityZoneInfo"))
    }

    async fn all_pools(&self) -> Result<Vec<ResourcePool>> {
        let ocloud_id = &self.settings.ocloud_id;
        if self.strategy.is_mutable() {
            Ok(self
                .list_aggregates()
                .await?
                .iter()
                .map(|a| aggregate_to_pool(a, &self.strategy, ocloud_id))
                .collect())
        } else {
            Ok(self
                .list_availability_zones()
                .await?
                .iter()
                .map(|z| availability_zone_to_pool(z, &self.strategy, ocloud_id))
                .collect())
        }
    }

    async fn set_aggregate_metadata(&self, id: u64, pool: &ResourcePool) -> Result<()> {
        if pool.labels.is_empty() {
            return Ok(());
        }
        let body = json!({ "set_metadata": { "metadata": labels_to_value(&pool.labels) } });
        self.api
            .post(&self.url(&format!("os-aggregates/{id}/action")), Some(&body))
            .await?;
        Ok(())
    }

    /// Pool id owning a server under the active strategy
    fn pool_of(&self, server: &Value, aggregates: &[Aggregate]) -> String {
        if self.strategy.is_mutable() {
            let host = str_field(server, HOST_FIELD);
            aggregates
                .iter()
                .find(|a| !host.is_empty() && a.hosts.contains(&host))
                .map(|a| self.strategy.pool_id(&a.name))
                .unwrap_or_default()
        } else {
            let zone = str_field(server, AZ_FIELD);
            if zone.is_empty() {
                String::new()
            } else {
                self.strategy.pool_id(&zone)
            }
        }
    }

    async fn aggregates_for_mapping(&self) -> Result<Vec<Aggregate>> {
        if self.strategy.is_mutable() {
            self.list_aggregates().await
        } else {
            Ok(Vec::new())
        }
    }

    async fn flavor_id(&self, flavor_name: &str) -> Result<String> {
        self.fetch_all("flavors/detail", "flavors")
            .await?
            .iter()
            .find(|f| str_field(f, "name") == flavor_name || str_field(f, "id") == flavor_name)
            .map(|f| str_field(f, "id"))
            .ok_or_else(|| AdapterError::ResourceTypeNotFound {
                id: flavor_name.to_string(),
            })
    }

    /// Availability zone a new server lands in, derived from its pool
    async fn placement_zone(&self, pool_id: &str) -> Result<Option<String>> {
        if pool_id.is_empty() {
            return Ok(None);
        }
        if self.strategy.is_mutable() {
            let aggregate = self.find_aggregate(pool_id).await?;
            Ok(Some(aggregate.availability_zone).filter(|z| !z.is_empty()))
        } else {
            Ok(Some(self.strategy.native_name(pool_id)?.to_string()))
        }
    }
}

fn resolve_link(base: &str, href: &str) -> String {
    match url::Url::parse(base).and_then(|b| b.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}

#[async_trait]
impl Adapter for OpenStackAdapter {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn version(&self) -> &str {
        "v2.1"
    }

    fn capabilities(&self) -> Capabilities {
        let caps = Capabilities::all();
        if self.registry.is_enabled() {
            caps
        } else {
            caps.without(crate::adapter::Capability::Subscriptions)
        }
    }

    async fn health(&self) -> Result<()> {
        bounded_health(async {
            self.api.get(&self.url("")).await?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        self.registry.close().await;
        self.session.invalidate_token().await;
        tracing::info!(backend = %self.settings.name, "Adapter closed");
        Ok(())
    }

    async fn list_resource_pools(&self, filter: Option<&Filter>) -> Result<Vec<ResourcePool>> {
        let pools: Vec<ResourcePool> = self
            .all_pools()
            .await?
            .into_iter()
            .filter(|p| matches_filter(filter, &p.resource_pool_id, "", &p.location, &p.labels))
            .collect();
        Ok(paginate(filter, pools))
    }

    async fn get_resource_pool(&self, id: &str) -> Result<ResourcePool> {
        let name = self.strategy.native_name(id)?;
        if self.strategy.is_mutable() {
            let aggregate = self.find_aggregate(id).await?;
            return Ok(aggregate_to_pool(&aggregate, &self.strategy, &self.settings.ocloud_id));
        }
        self.list_availability_zones()
            .await?
            .iter()
            .find(|z| str_field(z, "zoneName") == name)
            .map(|z| availability_zone_to_pool(z, &self.strategy, &self.settings.ocloud_id))
            .ok_or_else(|| AdapterError::ResourcePoolNotFound { id: id.to_string() })
    }

    async fn create_resource_pool(&self, pool: ResourcePool) -> Result<ResourcePool> {
        self.strategy
            .ensure_mutable(&self.settings.name, "create_resource_pool")?;
        if pool.name.is_empty() {
            return Err(AdapterError::validation("name", "aggregate name is required"));
        }

        let mut aggregate = json!({ "name": pool.name });
        if !pool.location.is_empty() {
            aggregate["availability_zone"] = json!(pool.location);
        }
        let response = self
            .api
            .post(&self.url("os-aggregates"), Some(&json!({ "aggregate": aggregate })))
            .await?;
        let created = response
            .get("aggregate")
            .filter(|a| a.get("id").and_then(Value::as_u64).is_some())
            .map(Aggregate::from)
            .ok_or_else(|| {
                AdapterError::upstream("POST /os-aggregates", "response carries no aggregate id")
            })?;
        self.set_aggregate_metadata(created.id, &pool).await?;

        tracing::info!(backend = %self.settings.name, aggregate = %created.name, "Aggregate created");
        let mut result = aggregate_to_pool(&created, &self.strategy, &self.settings.ocloud_id);
        result.labels = pool.labels;
        Ok(result)
    }

    async fn update_resource_pool(&self, id: &str, pool: ResourcePool) -> Result<ResourcePool> {
        self.strategy
            .ensure_mutable(&self.settings.name, "update_resource_pool")?;
        let existing = self.find_aggregate(id).await?;

        let name = if pool.name.is_empty() {
            existing.name.clone()
        } else {
            pool.name.clone()
        };
        let mut aggregate = json!({ "name": name });
        if !pool.location.is_empty() {
            aggregate["availability_zone"] = json!(pool.location);
        }
        let response = self
            .api
            .put(
                &self.url(&format!("os-aggregates/{}", existing.id)),
                Some(&json!({ "aggregate": aggregate })),
            )
            .await
            .map_err(|e| {
                e.or_not_found(|| AdapterError::ResourcePoolNotFound { id: id.to_string() })
            })?;
        self.set_aggregate_metadata(existing.id, &pool).await?;

        let updated = Aggregate::from(response.get("aggregate").unwrap_or(&existing.raw));
        let mut result = aggregate_to_pool(&updated, &self.strategy, &self.settings.ocloud_id);
        if !pool.labels.is_empty() {
            result.labels = pool.labels;
        }
        Ok(result)
    }

    async fn delete_resource_pool(&self, id: &str) -> Result<()> {
        self.strategy
            .ensure_mutable(&self.settings.name, "delete_resource_pool")?;
        let existing = self.find_aggregate(id).await?;
        self.api
            .delete(&self.url(&format!("os-aggregates/{}", existing.id)))
            .await
            .map_err(|e| {
                e.or_not_found(|| AdapterError::ResourcePoolNotFound { id: id.to_string() })
            })?;
        tracing::info!(backend = %self.settings.name, pool = id, "Aggregate deleted");
        Ok(())
    }

    async fn list_resources(&self, filter: Option<&Filter>) -> Result<Vec<Resource>> {
        let servers = self.fetch_all("servers/detail", "servers").await?;
        let aggregates = self.aggregates_for_mapping().await?;

        let resources: Vec<Resource> = servers
            .iter()
            .filter_map(|server| {
                let resource = server_to_resource(server, self.pool_of(server, &aggregates));
                let location = str_field(server, AZ_FIELD);
                matches_filter(
                    filter,
                    &resource.resource_pool_id,
                    &resource.resource_type_id,
                    &location,
                    &resource.labels,
                )
                .then_some(resource)
            })
            .collect();
        Ok(paginate(filter, resources))
    }

    async fn get_resource(&self, id: &str) -> Result<Resource> {
        let response = self
            .api
            .get(&self.url(&format!("servers/{}", urlencoding::encode(id))))
            .await
            .map_err(|e| e.or_not_found(|| AdapterError::ResourceNotFound { id: id.to_string() }))?;
        let server = response
            .get("server")
            .filter(|s| s.is_object())
            .cloned()
            .ok_or_else(|| {
                AdapterError::upstream("GET /servers/{id}", "response carries no server")
            })?;
        let aggregates = self.aggregates_for_mapping().await?;
        Ok(server_to_resource(&server, self.pool_of(&server, &aggregates)))
    }

    async fn create_resource(&self, resource: Resource) -> Result<Resource> {
        if resource.resource_type_id.is_empty() {
            return Err(AdapterError::ResourceTypeRequired {
                operation: "create_resource".to_string(),
            });
        }
        let name = ext_str(&resource.extensions, "name")
            .or_else(|| Some(resource.description.clone()).filter(|d| !d.is_empty()))
            .ok_or_else(|| AdapterError::validation("extensions.name", "server name is required"))?;
        let image = ext_str(&resource.extensions, "imageRef")
            .ok_or_else(|| AdapterError::validation("extensions.imageRef", "image is required"))?;

        let flavor_ref = self.flavor_id(&resource.resource_type_id).await?;
        let mut server = json!({
            "name": name,
            "flavorRef": flavor_ref,
            "imageRef": image,
            "metadata": labels_to_value(&resource.labels),
        });
        if let Some(zone) = self.placement_zone(&resource.resource_pool_id).await? {
            server["availability_zone"] = json!(zone);
        }
        if let Some(network) = ext_str(&resource.extensions, "networkId") {
            server["networks"] = json!([{ "uuid": network }]);
        } else {
            server["networks"] = json!("auto");
        }

        let response = self
            .api
            .post(&self.url("servers"), Some(&json!({ "server": server })))
            .await?;
        let id = response
            .get("server")
            .map(|s| str_field(s, "id"))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AdapterError::upstream("POST /servers", "response carries no server id")
            })?;

        tracing::info!(backend = %self.settings.name, server = %id, "Server created");
        self.get_resource(&id).await
    }

    async fn update_resource(&self, id: &str, resource: Resource) -> Result<Resource> {
        let not_found = || AdapterError::ResourceNotFound { id: id.to_string() };
        let encoded = urlencoding::encode(id);

        if !resource.description.is_empty() {
            let body = json!({ "server": { "name": resource.description } });
            self.api
                .put(&self.url(&format!("servers/{encoded}")), Some(&body))
                .await
                .map_err(|e| e.or_not_found(not_found))?;
        }

        let body = json!({ "metadata": labels_to_value(&resource.labels) });
        self.api
            .put(&self.url(&format!("servers/{encoded}/metadata")), Some(&body))
            .await
            .map_err(|e| e.or_not_found(not_found))?;

        self.get_resource(id).await
    }

    async fn delete_resource(&self, id: &str) -> Result<()> {
        self.api
            .delete(&self.url(&format!("servers/{}", urlencoding::encode(id))))
            .await
            .map_err(|e| e.or_not_found(|| AdapterError::ResourceNotFound { id: id.to_string() }))?;
        tracing::info!(backend = %self.settings.name, server = id, "Server deleted");
        Ok(())
    }

    async fn list_resource_types(&self, filter: Option<&Filter>) -> Result<Vec<ResourceType>> {
        let types: Vec<ResourceType> = self
            .fetch_all("flavors/detail", "flavors")
            .await?
            .iter()
            .map(flavor_to_resource_type)
            .filter(|t| matches_resource_type(filter, &t.resource_type_id))
            .collect();
        Ok(paginate(filter, types))
    }

    async fn get_resource_type(&self, id: &str) -> Result<ResourceType> {
        self.fetch_all("flavors/detail", "flavors")
            .await?
            .iter()
            .map(flavor_to_resource_type)
            .find(|t| t.resource_type_id == id)
            .ok_or_else(|| AdapterError::ResourceTypeNotFound { id: id.to_string() })
    }

    async fn get_deployment_manager(&self, id: &str) -> Result<DeploymentManager> {
        let dm_id = self.deployment_manager_id();
        if id != dm_id {
            return Err(AdapterError::DeploymentManagerNotFound { id: id.to_string() });
        }

        let supported_locations = self
            .list_availability_zones()
            .await?
            .iter()
            .map(|z| str_field(z, "zoneName"))
            .filter(|z| !z.is_empty())
            .collect();

        Ok(DeploymentManager {
            deployment_manager_id: dm_id,
            name: self.settings.name.clone(),
            description: format!("OpenStack project {}", self.config.project),
            ocloud_id: self.settings.ocloud_id.clone(),
            service_uri: self.config.compute_endpoint.clone(),
            supported_locations,
            capabilities: self.capabilities().tags(),
            extensions: crate::backends::json::extensions([
                ("region", json!(self.config.region)),
                ("project", json!(self.config.project)),
                ("poolConstruct", json!(self.strategy.construct())),
            ]),
        })
    }

    async fn create_subscription(&self, subscription: Subscription) -> Result<Subscription> {
        self.registry.create(subscription).await
    }

    async fn get_subscription(&self, id: &str) -> Result<Subscription> {
        self.registry.get(id).await
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.registry.list().await
    }

    async fn update_subscription(
        &self,
        id: &str,
        subscription: Subscription,
    ) -> Result<Subscription> {
        self.registry.update(id, subscription).await
    }

    async fn delete_subscription(&self, id: &str) -> Result<()> {
        self.registry.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OpenStackConfig {
        OpenStackConfig {
            identity_endpoint: "https://keystone.example.com:5000".into(),
            compute_endpoint: "https://nova.example.com:8774/v2.1/".into(),
            username: "admin".into(),
            password: Some("pw".into()),
            password_env: None,
            user_domain: "Default".into(),
            project: "ran".into(),
            project_domain: "Default".into(),
            region: String::new(),
            pool_mode: OpenStackPoolMode::AvailabilityZones,
        }
    }

    #[test]
    fn test_resolve_password_prefers_inline() {
        assert_eq!(config().resolve_password().unwrap(), "pw");
        let missing = OpenStackConfig {
            password: None,
            password_env: Some("OCLOUD_ADAPTERS_TEST_UNSET_VAR".into()),
            ..config()
        };
        assert!(missing.resolve_password().is_err());
    }

    #[test]
    fn test_resolve_link_joins_relative() {
        assert_eq!(
            resolve_link("https://nova.example.com/v2.1/servers/detail", "/v2.1/servers/detail?marker=x"),
            "https://nova.example.com/v2.1/servers/detail?marker=x"
        );
        assert_eq!(
            resolve_link("https://a/x", "https://b/y?marker=1"),
            "https://b/y?marker=1"
        );
    }

    #[test]
    fn test_pool_modes_map_to_strategies() {
        assert!(!OpenStackPoolMode::AvailabilityZones.strategy().is_mutable());
        assert!(OpenStackPoolMode::Aggregates.strategy().is_mutable());
    }

    #[test]
    fn test_deployment_manager_id_falls_back_to_project() {
        let adapter = OpenStackAdapter::new(
            AdapterSettings {
                name: "edge".into(),
                ocloud_id: "oc".into(),
            },
            config(),
            SubscriptionRegistry::in_memory("edge", Arc::new(crate::observability::NoopObserver)),
        )
        .unwrap();
        assert_eq!(adapter.deployment_manager_id(), "openstack-ran");
        assert_eq!(adapter.url("servers"), "https://nova.example.com:8774/v2.1/servers");
    }
}
