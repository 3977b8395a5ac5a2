//! Nova objects to the normalized model

use crate::backends::json::{extensions, labels_from, opt_str_field, str_field};
use crate::model::{Resource, ResourceClass, ResourceKind, ResourcePool, ResourceType};
use crate::pool::PoolStrategy;
use serde_json::{json, Value};

pub const AZ_FIELD: &str = "OS-EXT-AZ:availability_zone";
pub const HOST_FIELD: &str = "OS-EXT-SRV-ATTR:host";

/// Host aggregate as returned by `os-aggregates`
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub id: u64,
    pub name: String,
    pub availability_zone: String,
    pub hosts: Vec<String>,
    pub raw: Value,
}

impl From<&Value> for Aggregate {
    fn from(value: &Value) -> Self {
        Self {
            id: value.get("id").and_then(|v| v.as_u64()).unwrap_or_default(),
            name: str_field(value, "name"),
            availability_zone: str_field(value, "availability_zone"),
            hosts: value
                .get("hosts")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|h| h.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            raw: value.clone(),
        }
    }
}

pub fn availability_zone_to_pool(zone: &Value, strategy: &PoolStrategy, ocloud_id: &str) -> ResourcePool {
    let name = str_field(zone, "zoneName");
    let available = zone
        .get("zoneState")
        .and_then(|s| s.get("available"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    ResourcePool {
        resource_pool_id: strategy.pool_id(&name),
        description: format!("Nova availability zone {name}"),
        location: name.clone(),
        ocloud_id: ocloud_id.to_string(),
        extensions: extensions([("available", json!(available))]),
        name,
        ..ResourcePool::default()
    }
}

pub fn aggregate_to_pool(aggregate: &Aggregate, strategy: &PoolStrategy, ocloud_id: &str) -> ResourcePool {
    ResourcePool {
        resource_pool_id: strategy.pool_id(&aggregate.name),
        name: aggregate.name.clone(),
        description: format!("Nova host aggregate {}", aggregate.name),
        location: aggregate.availability_zone.clone(),
        ocloud_id: ocloud_id.to_string(),
        labels: labels_from(aggregate.raw.get("metadata"))
            .into_iter()
            .filter(|(k, _)| k != "availability_zone")
            .collect(),
        extensions: extensions([
            ("aggregateId", json!(aggregate.id)),
            ("hosts", json!(aggregate.hosts)),
        ]),
    }
}

/// Flavor name used as the resource type id, falling back to its id
pub fn server_flavor(server: &Value) -> String {
    let flavor = server.get("flavor");
    flavor
        .and_then(|f| opt_str_field(f, "original_name"))
        .or_else(|| flavor.and_then(|f| opt_str_field(f, "id")))
        .unwrap_or_default()
}

pub fn server_to_resource(server: &Value, resource_pool_id: String) -> Resource {
    let id = str_field(server, "id");
    Resource {
        global_asset_id: Some(format!("urn:openstack:compute:server:{id}")),
        resource_type_id: server_flavor(server),
        resource_pool_id,
        description: str_field(server, "name"),
        tenant_id: opt_str_field(server, "tenant_id"),
        labels: labels_from(server.get("metadata")),
        extensions: extensions([
            ("name", json!(str_field(server, "name"))),
            ("status", json!(str_field(server, "status"))),
            ("availabilityZone", json!(str_field(server, AZ_FIELD))),
            ("host", server.get(HOST_FIELD).cloned().unwrap_or(Value::Null)),
            ("created", server.get("created").cloned().unwrap_or(Value::Null)),
        ]),
        resource_id: id,
    }
}

pub fn flavor_to_resource_type(flavor: &Value) -> ResourceType {
    let name = str_field(flavor, "name");
    ResourceType {
        resource_type_id: name.clone(),
        description: format!("Nova flavor {name}"),
        vendor: "OpenStack".to_string(),
        model: name.clone(),
        version: String::new(),
        resource_class: ResourceClass::Compute,
        resource_kind: ResourceKind::Virtual,
        extensions: extensions([
            ("flavorId", json!(str_field(flavor, "id"))),
            ("vcpus", flavor.get("vcpus").cloned().unwrap_or(Value::Null)),
            ("ramMb", flavor.get("ram").cloned().unwrap_or(Value::Null)),
            ("diskGb", flavor.get("disk").cloned().unwrap_or(Value::Null)),
        ]),
        name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AZ: PoolStrategy = PoolStrategy::backend_managed("os-az-", "availability zone");
    const AGG: PoolStrategy = PoolStrategy::adapter_managed("os-agg-", "host aggregate");

    #[test]
    fn test_availability_zone_to_pool() {
        let zone = json!({"zoneName": "az1", "zoneState": {"available": true}, "hosts": null});
        let pool = availability_zone_to_pool(&zone, &AZ, "oc-1");
        assert_eq!(pool.resource_pool_id, "os-az-az1");
        assert_eq!(pool.location, "az1");
        assert_eq!(pool.extensions["available"], json!(true));
    }

    #[test]
    fn test_aggregate_to_pool_drops_az_metadata() {
        let raw = json!({
            "id": 7, "name": "gpu", "availability_zone": "az1",
            "hosts": ["h1", "h2"],
            "metadata": {"availability_zone": "az1", "accel": "gpu"}
        });
        let pool = aggregate_to_pool(&Aggregate::from(&raw), &AGG, "oc-1");
        assert_eq!(pool.resource_pool_id, "os-agg-gpu");
        assert_eq!(pool.labels.len(), 1);
        assert_eq!(pool.labels["accel"], "gpu");
        assert_eq!(pool.extensions["aggregateId"], json!(7));
    }

    #[test]
    fn test_server_to_resource() {
        let server = json!({
            "id": "abc", "name": "vm-1", "status": "ACTIVE", "tenant_id": "t1",
            "metadata": {"role": "du"},
            "flavor": {"original_name": "m1.small", "vcpus": 1},
            "OS-EXT-AZ:availability_zone": "az1"
        });
        let resource = server_to_resource(&server, "os-az-az1".into());
        assert_eq!(resource.resource_id, "abc");
        assert_eq!(resource.resource_type_id, "m1.small");
        assert_eq!(resource.tenant_id.as_deref(), Some("t1"));
        assert_eq!(resource.labels["role"], "du");
        assert!(!resource.extensions.contains_key("host"));
    }

    #[test]
    fn test_server_flavor_falls_back_to_id() {
        let server = json!({"flavor": {"id": "42"}});
        assert_eq!(server_flavor(&server), "42");
    }
}
