//! GCP Compute Engine backend
//!
//! Pools are either the zones of one region (read-only) or the regional
//! managed instance groups the adapter creates. Resources are VM instances,
//! resource types are machine types.

pub mod auth;
pub mod client;
mod translate;

use self::auth::{get_default_project, GcpCredentials};
use self::client::ComputeClient;
use self::translate::{
    group_to_pool, instance_to_resource, machine_type_to_resource_type, owning_group,
    parse_resource_id, short_field, zone_to_pool,
};
use crate::adapter::{bounded_health, Adapter, Capabilities, Capability};
use crate::backends::json::{ext_str, ext_u64, extensions, labels_to_value, str_field};
use crate::backends::AdapterSettings;
use crate::error::{AdapterError, Result};
use crate::filter::{matches_filter, matches_resource_type, paginate};
use crate::model::{
    DeploymentManager, Filter, Resource, ResourcePool, ResourceType, Subscription,
};
use crate::pool::PoolStrategy;
use crate::session::{ApiClient, AuthScheme, HttpTransport, TokenSource};
use crate::subscription::SubscriptionRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const ZONE_POOLS: PoolStrategy = PoolStrategy::backend_managed("gcp-zone-", "zone");
pub const INSTANCE_GROUP_POOLS: PoolStrategy =
    PoolStrategy::adapter_managed("gcp-mig-", "managed instance group");

pub const DEFAULT_COMPUTE_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1";

const DEFAULT_NETWORK: &str = "global/networks/default";

/// Which Compute Engine construct represents a resource pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcpPoolMode {
    #[default]
    Zones,
    InstanceGroups,
}

impl GcpPoolMode {
    pub fn strategy(&self) -> PoolStrategy {
        match self {
            Self::Zones => ZONE_POOLS,
            Self::InstanceGroups => INSTANCE_GROUP_POOLS,
        }
    }
}

fn default_compute_endpoint() -> String {
    DEFAULT_COMPUTE_ENDPOINT.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    /// Falls back to the gcloud default project
    #[serde(default)]
    pub project: Option<String>,
    pub region: String,
    #[serde(default = "default_compute_endpoint")]
    pub compute_endpoint: String,
    #[serde(default)]
    pub pool_mode: GcpPoolMode,
}

pub struct GcpAdapter {
    settings: AdapterSettings,
    config: GcpConfig,
    strategy: PoolStrategy,
    compute: ComputeClient,
    registry: SubscriptionRegistry,
}

impl GcpAdapter {
    /// Connect with Application Default Credentials
    pub async fn connect(
        settings: AdapterSettings,
        config: GcpConfig,
        registry: SubscriptionRegistry,
    ) -> Result<Self> {
        let project = match config.project.clone().filter(|p| !p.is_empty()) {
            Some(project) => project,
            None => get_default_project().ok_or_else(|| AdapterError::Config {
                message: format!(
                    "backend {} has no project and no gcloud default project is set",
                    settings.name
                ),
            })?,
        };
        let credentials = GcpCredentials::new().await?;
        let http = HttpTransport::new(AuthScheme::Bearer)?;

        tracing::info!(backend = %settings.name, project = %project, region = %config.region, "Connected to Compute Engine");
        Ok(Self::new(settings, config, &project, Arc::new(credentials), http, registry))
    }

    pub fn new(
        settings: AdapterSettings,
        config: GcpConfig,
        project: &str,
        tokens: Arc<dyn TokenSource>,
        http: HttpTransport,
        registry: SubscriptionRegistry,
    ) -> Self {
        let compute = ComputeClient::new(
            ApiClient::new(tokens, http),
            &config.compute_endpoint,
            project,
            &config.region,
        );
        Self {
            strategy: config.pool_mode.strategy(),
            settings,
            config,
            compute,
            registry,
        }
    }

    pub fn deployment_manager_id(&self) -> String {
        format!("gcp-{}-{}", self.compute.project_id(), self.config.region)
    }

    fn in_region(&self, zone: &str) -> bool {
        self.config.region.is_empty() || zone.starts_with(&format!("{}-", self.config.region))
    }

    fn group_url(&self, name: &str) -> String {
        self.compute
            .compute_regional_url(&format!("instanceGroupManagers/{}", urlencoding::encode(name)))
    }

    fn instance_url(&self, zone: &str, name: &str) -> String {
        self.compute
            .compute_zonal_url(zone, &format!("instances/{}", urlencoding::encode(name)))
    }

    async fn region_zones(&self) -> Result<Vec<Value>> {
        Ok(self
            .compute
            .list_all(&self.compute.compute_url("zones"))
            .await?
            .into_iter()
            .filter(|z| self.in_region(&str_field(z, "name")))
            .collect())
    }

    async fn all_pools(&self) -> Result<Vec<ResourcePool>> {
        let ocloud_id = &self.settings.ocloud_id;
        if self.strategy.is_mutable() {
            let url = self.compute.compute_regional_url("instanceGroupManagers");
            Ok(self
                .compute
                .list_all(&url)
                .await?
                .iter()
                .map(|g| group_to_pool(g, &self.strategy, ocloud_id))
                .collect())
        } else {
            Ok(self
                .region_zones()
                .await?
                .iter()
                .map(|z| zone_to_pool(z, &self.strategy, ocloud_id))
                .collect())
        }
    }

    /// Pool id owning an instance under the active strategy
    fn pool_of(&self, instance: &Value) -> String {
        if self.strategy.is_mutable() {
            owning_group(instance)
                .map(|group| self.strategy.pool_id(&group))
                .unwrap_or_default()
        } else {
            self.strategy.pool_id(&short_field(instance, "zone"))
        }
    }

    /// Template references may be short names or partial URLs
    fn template_url(&self, template: &str) -> String {
        if template.starts_with("https://") || template.starts_with("projects/") {
            template.to_string()
        } else if template.starts_with("global/") || template.starts_with("regions/") {
            format!("projects/{}/{}", self.compute.project_id(), template)
        } else {
            format!(
                "projects/{}/global/instanceTemplates/{}",
                self.compute.project_id(),
                template
            )
        }
    }

    /// Zone a new instance is placed in
    ///
    /// Group pools are rejected; instances join a group through its template.
    fn placement_zone(&self, resource: &Resource) -> Result<String> {
        if !resource.resource_pool_id.is_empty() {
            if self.strategy.is_mutable() {
                return Err(AdapterError::validation(
                    "resourcePoolId",
                    "instances are added to a managed instance group by resizing the pool",
                ));
            }
            let zone = self.strategy.native_name(&resource.resource_pool_id)?;
            if !self.in_region(zone) {
                return Err(AdapterError::ResourcePoolNotFound {
                    id: resource.resource_pool_id.clone(),
                });
            }
            return Ok(zone.to_string());
        }
        let zone = ext_str(&resource.extensions, "zone").ok_or_else(|| {
            AdapterError::validation("extensions.zone", "a zone pool or zone extension is required")
        })?;
        if !self.in_region(&zone) {
            return Err(AdapterError::validation(
                "extensions.zone",
                format!("zone {zone} is outside region {}", self.config.region),
            ));
        }
        Ok(zone)
    }

    async fn fetch_instance(&self, id: &str) -> Result<Value> {
        let (zone, name) = parse_resource_id(id)?;
        self.compute
            .get(&self.instance_url(zone, name))
            .await
            .map_err(|e| e.or_not_found(|| AdapterError::ResourceNotFound { id: id.to_string() }))
    }

    async fn machine_types(&self) -> Result<Vec<ResourceType>> {
        let mut by_name = BTreeMap::new();
        for machine_type in self.compute.list_aggregated("machineTypes").await? {
            if !self.in_region(&short_field(&machine_type, "zone")) {
                continue;
            }
            let name = str_field(&machine_type, "name");
            by_name.entry(name).or_insert(machine_type);
        }
        Ok(by_name.values().map(machine_type_to_resource_type).collect())
    }
}

#[async_trait]
impl Adapter for GcpAdapter {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn version(&self) -> &str {
        "v1"
    }

    fn capabilities(&self) -> Capabilities {
        let caps = Capabilities::all();
        if self.registry.is_enabled() {
            caps
        } else {
            caps.without(Capability::Subscriptions)
        }
    }

    async fn health(&self) -> Result<()> {
        bounded_health(async {
            self.compute
                .get(&self.compute.compute_regional_url(""))
                .await?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        self.registry.close().await;
        self.compute.api().tokens().invalidate().await;
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
        let not_found = || AdapterError::ResourcePoolNotFound { id: id.to_string() };

        if self.strategy.is_mutable() {
            let group = self
                .compute
                .get(&self.group_url(name))
                .await
                .map_err(|e| e.or_not_found(not_found))?;
            return Ok(group_to_pool(&group, &self.strategy, &self.settings.ocloud_id));
        }

        if !self.in_region(name) {
            return Err(not_found());
        }
        let url = self
            .compute
            .compute_url(&format!("zones/{}", urlencoding::encode(name)));
        let zone = self
            .compute
            .get(&url)
            .await
            .map_err(|e| e.or_not_found(not_found))?;
        Ok(zone_to_pool(&zone, &self.strategy, &self.settings.ocloud_id))
    }

    async fn create_resource_pool(&self, pool: ResourcePool) -> Result<ResourcePool> {
        self.strategy
            .ensure_mutable(&self.settings.name, "create_resource_pool")?;
        if pool.name.is_empty() {
            return Err(AdapterError::validation("name", "instance group name is required"));
        }
        let template = ext_str(&pool.extensions, "instanceTemplate").ok_or_else(|| {
            AdapterError::validation("extensions.instanceTemplate", "instance template is required")
        })?;
        let target_size = ext_u64(&pool.extensions, "targetSize").unwrap_or(0);

        let body = json!({
            "name": pool.name,
            "description": pool.description,
            "baseInstanceName": pool.name,
            "instanceTemplate": self.template_url(&template),
            "targetSize": target_size,
        });
        self.compute
            .post(&self.compute.compute_regional_url("instanceGroupManagers"), Some(&body))
            .await?;
        tracing::info!(backend = %self.settings.name, group = %pool.name, "Instance group insert requested");

        let mut created = body;
        created["region"] = json!(self.config.region);
        let mut result = group_to_pool(&created, &self.strategy, &self.settings.ocloud_id);
        result.labels = pool.labels;
        Ok(result)
    }

    async fn update_resource_pool(&self, id: &str, pool: ResourcePool) -> Result<ResourcePool> {
        self.strategy
            .ensure_mutable(&self.settings.name, "update_resource_pool")?;
        let name = self.strategy.native_name(id)?;
        let url = self.group_url(name);
        let not_found = || AdapterError::ResourcePoolNotFound { id: id.to_string() };

        self.compute
            .get(&url)
            .await
            .map_err(|e| e.or_not_found(not_found))?;

        if let Some(template) = ext_str(&pool.extensions, "instanceTemplate") {
            let body = json!({ "instanceTemplate": self.template_url(&template) });
            self.compute
                .post(&format!("{url}/setInstanceTemplate"), Some(&body))
                .await?;
        }
        if let Some(size) = ext_u64(&pool.extensions, "targetSize") {
            self.compute
                .post(&format!("{url}/resize?size={size}"), None)
                .await?;
        }

        let group = self
            .compute
            .get(&url)
            .await
            .map_err(|e| e.or_not_found(not_found))?;
        Ok(group_to_pool(&group, &self.strategy, &self.settings.ocloud_id))
    }

    async fn delete_resource_pool(&self, id: &str) -> Result<()> {
        self.strategy
            .ensure_mutable(&self.settings.name, "delete_resource_pool")?;
        let name = self.strategy.native_name(id)?;
        self.compute
            .delete(&self.group_url(name))
            .await
            .map_err(|e| {
                e.or_not_found(|| AdapterError::ResourcePoolNotFound { id: id.to_string() })
            })?;
        tracing::info!(backend = %self.settings.name, pool = id, "Instance group delete requested");
        Ok(())
    }

    async fn list_resources(&self, filter: Option<&Filter>) -> Result<Vec<Resource>> {
        let project = self.compute.project_id();
        let resources: Vec<Resource> = self
            .compute
            .list_aggregated("instances")
            .await?
            .iter()
            .filter_map(|instance| {
                let zone = short_field(instance, "zone");
                if !self.in_region(&zone) {
                    return None;
                }
                let resource = instance_to_resource(instance, project, self.pool_of(instance));
                matches_filter(
                    filter,
                    &resource.resource_pool_id,
                    &resource.resource_type_id,
                    &zone,
                    &resource.labels,
                )
                .then_some(resource)
            })
            .collect();
        Ok(paginate(filter, resources))
    }

    async fn get_resource(&self, id: &str) -> Result<Resource> {
        let instance = self.fetch_instance(id).await?;
        Ok(instance_to_resource(
            &instance,
            self.compute.project_id(),
            self.pool_of(&instance),
        ))
    }

    async fn create_resource(&self, resource: Resource) -> Result<Resource> {
        if resource.resource_type_id.is_empty() {
            return Err(AdapterError::ResourceTypeRequired {
                operation: "create_resource".to_string(),
            });
        }
        let name = ext_str(&resource.extensions, "name").ok_or_else(|| {
            AdapterError::validation("extensions.name", "instance name is required")
        })?;
        let image = ext_str(&resource.extensions, "sourceImage").ok_or_else(|| {
            AdapterError::validation("extensions.sourceImage", "boot image is required")
        })?;
        let zone = self.placement_zone(&resource)?;
        let network =
            ext_str(&resource.extensions, "network").unwrap_or_else(|| DEFAULT_NETWORK.to_string());

        let body = json!({
            "name": name,
            "description": resource.description,
            "machineType": format!("zones/{}/machineTypes/{}", zone, resource.resource_type_id),
            "labels": labels_to_value(&resource.labels),
            "disks": [{
                "boot": true,
                "autoDelete": true,
                "initializeParams": { "sourceImage": image }
            }],
            "networkInterfaces": [{ "network": network }],
        });
        self.compute
            .post(&self.compute.compute_zonal_url(&zone, "instances"), Some(&body))
            .await?;
        tracing::info!(backend = %self.settings.name, zone = %zone, instance = %name, "Instance insert requested");

        let mut created = body;
        created["zone"] = json!(zone);
        created["status"] = json!("PROVISIONING");
        // A standalone instance belongs to no managed group
        let pool_id = if self.strategy.is_mutable() {
            String::new()
        } else {
            self.strategy.pool_id(&zone)
        };
        Ok(instance_to_resource(&created, self.compute.project_id(), pool_id))
    }

    async fn update_resource(&self, id: &str, resource: Resource) -> Result<Resource> {
        let (zone, name) = parse_resource_id(id)?;
        let instance = self.fetch_instance(id).await?;

        let body = json!({
            "labels": labels_to_value(&resource.labels),
            "labelFingerprint": instance.get("labelFingerprint").cloned().unwrap_or(Value::Null),
        });
        self.compute
            .post(&format!("{}/setLabels", self.instance_url(zone, name)), Some(&body))
            .await
            .map_err(|e| e.or_not_found(|| AdapterError::ResourceNotFound { id: id.to_string() }))?;

        let mut updated = instance;
        updated["labels"] = labels_to_value(&resource.labels);
        Ok(instance_to_resource(
            &updated,
            self.compute.project_id(),
            self.pool_of(&updated),
        ))
    }

    async fn delete_resource(&self, id: &str) -> Result<()> {
        let (zone, name) = parse_resource_id(id)?;
        self.compute
            .delete(&self.instance_url(zone, name))
            .await
            .map_err(|e| e.or_not_found(|| AdapterError::ResourceNotFound { id: id.to_string() }))?;
        tracing::info!(backend = %self.settings.name, resource = id, "Instance delete requested");
        Ok(())
    }

    async fn list_resource_types(&self, filter: Option<&Filter>) -> Result<Vec<ResourceType>> {
        let types: Vec<ResourceType> = self
            .machine_types()
            .await?
            .into_iter()
            .filter(|t| matches_resource_type(filter, &t.resource_type_id))
            .collect();
        Ok(paginate(filter, types))
    }

    async fn get_resource_type(&self, id: &str) -> Result<ResourceType> {
        self.machine_types()
            .await?
            .into_iter()
            .find(|t| t.resource_type_id == id)
            .ok_or_else(|| AdapterError::ResourceTypeNotFound { id: id.to_string() })
    }

    async fn get_deployment_manager(&self, id: &str) -> Result<DeploymentManager> {
        let dm_id = self.deployment_manager_id();
        if id != dm_id {
            return Err(AdapterError::DeploymentManagerNotFound { id: id.to_string() });
        }

        let supported_locations = self
            .region_zones()
            .await?
            .iter()
            .map(|z| str_field(z, "name"))
            .collect();

        Ok(DeploymentManager {
            deployment_manager_id: dm_id,
            name: self.settings.name.clone(),
            description: format!(
                "Compute Engine project {} in {}",
                self.compute.project_id(),
                self.config.region
            ),
            ocloud_id: self.settings.ocloud_id.clone(),
            service_uri: self.compute.compute_url(""),
            supported_locations,
            capabilities: self.capabilities().tags(),
            extensions: extensions([
                ("project", json!(self.compute.project_id())),
                ("region", json!(self.config.region)),
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
