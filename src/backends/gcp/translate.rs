//! Compute Engine objects to the normalized model

use crate::backends::json::{extensions, extract_short_name, labels_from, opt_str_field, str_field};
use crate::error::{AdapterError, Result};
use crate::model::{Resource, ResourceClass, ResourceKind, ResourcePool, ResourceType};
use crate::pool::PoolStrategy;
use serde_json::{json, Value};

/// Split a `{zone}/{name}` resource id
pub fn parse_resource_id(id: &str) -> Result<(&str, &str)> {
    match id.split_once('/') {
        Some((zone, name)) if !zone.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((zone, name))
        },
        _ => Err(AdapterError::ResourceNotFound { id: id.to_string() }),
    }
}

pub fn resource_id(zone: &str, name: &str) -> String {
    format!("{zone}/{name}")
}

/// Short field value, e.g. a zone URL reduced to its last path segment
pub fn short_field(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(|v| v.as_str())
        .map(extract_short_name)
        .unwrap_or_default()
}

/// Name of the managed instance group that created an instance, if any
pub fn owning_group(instance: &Value) -> Option<String> {
    instance
        .get("metadata")
        .and_then(|m| m.get("items"))
        .and_then(|items| items.as_array())?
        .iter()
        .find(|item| item.get("key").and_then(|k| k.as_str()) == Some("created-by"))
        .and_then(|item| item.get("value").and_then(|v| v.as_str()))
        .filter(|value| value.contains("/instanceGroupManagers/"))
        .map(extract_short_name)
}

pub fn zone_to_pool(zone: &Value, strategy: &PoolStrategy, ocloud_id: &str) -> ResourcePool {
    let name = str_field(zone, "name");
    ResourcePool {
        resource_pool_id: strategy.pool_id(&name),
        description: opt_str_field(zone, "description")
            .unwrap_or_else(|| format!("Compute Engine zone {name}")),
        location: name.clone(),
        ocloud_id: ocloud_id.to_string(),
        extensions: extensions([
            ("status", json!(str_field(zone, "status"))),
            ("region", json!(short_field(zone, "region"))),
        ]),
        name,
        ..ResourcePool::default()
    }
}

pub fn group_to_pool(group: &Value, strategy: &PoolStrategy, ocloud_id: &str) -> ResourcePool {
    let name = str_field(group, "name");
    let zones: Vec<String> = group
        .get("distributionPolicy")
        .and_then(|d| d.get("zones"))
        .and_then(|z| z.as_array())
        .map(|zones| zones.iter().map(|z| short_field(z, "zone")).collect())
        .unwrap_or_default();

    ResourcePool {
        resource_pool_id: strategy.pool_id(&name),
        description: str_field(group, "description"),
        location: short_field(group, "region"),
        ocloud_id: ocloud_id.to_string(),
        extensions: extensions([
            ("targetSize", group.get("targetSize").cloned().unwrap_or(Value::Null)),
            ("instanceTemplate", json!(short_field(group, "instanceTemplate"))),
            ("baseInstanceName", group.get("baseInstanceName").cloned().unwrap_or(Value::Null)),
            ("zones", json!(zones)),
        ]),
        name,
        ..ResourcePool::default()
    }
}

pub fn instance_to_resource(instance: &Value, project: &str, resource_pool_id: String) -> Resource {
    let zone = short_field(instance, "zone");
    let name = str_field(instance, "name");
    let numeric_id = str_field(instance, "id");

    Resource {
        resource_id: resource_id(&zone, &name),
        resource_type_id: short_field(instance, "machineType"),
        resource_pool_id,
        global_asset_id: Some(format!(
            "//compute.googleapis.com/projects/{project}/zones/{zone}/instances/{numeric_id}"
        )),
        description: opt_str_field(instance, "description")
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| name.clone()),
        tenant_id: Some(project.to_string()),
        labels: labels_from(instance.get("labels")),
        extensions: extensions([
            ("name", json!(name)),
            ("zone", json!(zone)),
            ("status", json!(str_field(instance, "status"))),
            ("instanceId", json!(numeric_id)),
            ("creationTimestamp", instance.get("creationTimestamp").cloned().unwrap_or(Value::Null)),
            ("labelFingerprint", instance.get("labelFingerprint").cloned().unwrap_or(Value::Null)),
        ]),
    }
}

pub fn machine_type_to_resource_type(machine_type: &Value) -> ResourceType {
    let name = str_field(machine_type, "name");
    ResourceType {
        resource_type_id: name.clone(),
        description: opt_str_field(machine_type, "description").unwrap_or_else(|| name.clone()),
        vendor: "Google".to_string(),
        model: name.clone(),
        version: "v1".to_string(),
        resource_class: ResourceClass::Compute,
        resource_kind: ResourceKind::Virtual,
        extensions: extensions([
            ("guestCpus", machine_type.get("guestCpus").cloned().unwrap_or(Value::Null)),
            ("memoryMb", machine_type.get("memoryMb").cloned().unwrap_or(Value::Null)),
            ("isSharedCpu", machine_type.get("isSharedCpu").cloned().unwrap_or(Value::Null)),
        ]),
        name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONES: PoolStrategy = PoolStrategy::backend_managed("gcp-zone-", "zone");
    const GROUPS: PoolStrategy = PoolStrategy::adapter_managed("gcp-mig-", "managed instance group");

    fn instance() -> Value {
        json!({
            "id": "123456",
            "name": "du-1",
            "zone": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a",
            "machineType": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a/machineTypes/n2-standard-4",
            "status": "RUNNING",
            "labels": {"role": "du"},
            "labelFingerprint": "abc=",
            "metadata": {"items": [
                {"key": "created-by", "value": "projects/1/regions/us-central1/instanceGroupManagers/du-pool"}
            ]}
        })
    }

    #[test]
    fn test_parse_resource_id() {
        assert_eq!(parse_resource_id("us-central1-a/vm").unwrap(), ("us-central1-a", "vm"));
        assert!(parse_resource_id("vm").is_err());
        assert!(parse_resource_id("/vm").is_err());
        assert!(parse_resource_id("a/b/c").is_err());
    }

    #[test]
    fn test_instance_to_resource() {
        let resource = instance_to_resource(&instance(), "p", "gcp-zone-us-central1-a".into());
        assert_eq!(resource.resource_id, "us-central1-a/du-1");
        assert_eq!(resource.resource_type_id, "n2-standard-4");
        assert_eq!(resource.description, "du-1");
        assert_eq!(resource.labels["role"], "du");
        assert_eq!(resource.extensions["status"], json!("RUNNING"));
    }

    #[test]
    fn test_owning_group() {
        assert_eq!(owning_group(&instance()).as_deref(), Some("du-pool"));
        assert_eq!(owning_group(&json!({"name": "lonely"})), None);
    }

    #[test]
    fn test_zone_and_group_pools() {
        let zone = json!({"name": "us-central1-b", "status": "UP", "region": "https://x/regions/us-central1"});
        let pool = zone_to_pool(&zone, &ZONES, "oc");
        assert_eq!(pool.resource_pool_id, "gcp-zone-us-central1-b");
        assert_eq!(pool.extensions["region"], json!("us-central1"));

        let group = json!({
            "name": "du-pool", "targetSize": 3,
            "region": "https://x/regions/us-central1",
            "instanceTemplate": "https://x/global/instanceTemplates/du-template"
        });
        let pool = group_to_pool(&group, &GROUPS, "oc");
        assert_eq!(pool.resource_pool_id, "gcp-mig-du-pool");
        assert_eq!(pool.location, "us-central1");
        assert_eq!(pool.extensions["instanceTemplate"], json!("du-template"));
        assert_eq!(pool.extensions["targetSize"], json!(3));
    }

    #[test]
    fn test_machine_type_to_resource_type() {
        let mt = json!({"name": "e2-small", "guestCpus": 2, "memoryMb": 2048});
        let rt = machine_type_to_resource_type(&mt);
        assert_eq!(rt.resource_type_id, "e2-small");
        assert_eq!(rt.extensions["memoryMb"], json!(2048));
        assert!(!rt.extensions.contains_key("isSharedCpu"));
    }
}
