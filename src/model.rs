//! Normalized resource model
//!
//! Every backend translates its native objects into these shapes. Extension
//! maps carry backend-specific attributes and always serialize as an object,
//! even when empty.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Backend-specific attributes
pub type Extensions = Map<String, Value>;

/// Label map used for filtering
pub type Labels = HashMap<String, String>;

/// A single manageable compute unit (VM, instance, host)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub resource_type_id: String,
    #[serde(default)]
    pub resource_pool_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_asset_id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub extensions: Extensions,
}

/// A grouping construct under which resources are allocated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePool {
    #[serde(default)]
    pub resource_pool_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub ocloud_id: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceClass {
    #[default]
    Compute,
    Storage,
    Network,
    ControlPlane,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Physical,
    #[default]
    Virtual,
}

/// Catalog entry describing a class of provisionable resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceType {
    pub resource_type_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub resource_class: ResourceClass,
    #[serde(default)]
    pub resource_kind: ResourceKind,
    #[serde(default)]
    pub extensions: Extensions,
}

/// Metadata describing the deployment behind one backend connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentManager {
    pub deployment_manager_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ocloud_id: String,
    #[serde(default)]
    pub service_uri: String,
    #[serde(default)]
    pub supported_locations: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub extensions: Extensions,
}

/// Optional narrowing of which changes a subscriber cares about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_pool_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

/// A notification subscription
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub callback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<SubscriptionFilter>,
}

impl Subscription {
    /// Create a subscription with only a callback set
    pub fn with_callback(callback: &str) -> Self {
        Self {
            callback: callback.to_string(),
            ..Self::default()
        }
    }
}

/// Listing filter shared by every backend
///
/// An empty string means "no constraint" on that dimension. A `limit` of 0
/// means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(default)]
    pub resource_pool_id: String,
    #[serde(default)]
    pub resource_type_id: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Filter {
    pub fn for_pool(resource_pool_id: &str) -> Self {
        Self {
            resource_pool_id: resource_pool_id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions_serialize_as_object_when_empty() {
        let resource = Resource {
            resource_id: "r1".into(),
            ..Resource::default()
        };
        let json = serde_json::to_value(&resource).unwrap();
        assert!(json["extensions"].is_object());
        assert_eq!(json["resourceId"], "r1");
        assert!(json.get("tenantId").is_none());
    }

    #[test]
    fn test_resource_class_wire_names() {
        let json = serde_json::to_value(ResourceClass::ControlPlane).unwrap();
        assert_eq!(json, "control-plane");
        let kind: ResourceKind = serde_json::from_str("\"physical\"").unwrap();
        assert_eq!(kind, ResourceKind::Physical);
    }

    #[test]
    fn test_subscription_deserializes_without_optional_fields() {
        let sub: Subscription =
            serde_json::from_str(r#"{"callback": "https://example.com/notify"}"#).unwrap();
        assert!(sub.subscription_id.is_empty());
        assert!(sub.filter.is_none());
    }
}
