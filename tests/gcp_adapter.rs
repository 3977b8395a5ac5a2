//! Integration tests for the Compute Engine backend using wiremock
//!
//! Tokens come from a static source; the compute endpoint points at the mock.

use ocloud_adapters::backends::gcp::{GcpAdapter, GcpConfig, GcpPoolMode};
use ocloud_adapters::backends::AdapterSettings;
use ocloud_adapters::model::{Filter, Resource, ResourcePool};
use ocloud_adapters::observability::NoopObserver;
use ocloud_adapters::session::{AuthScheme, HttpTransport, StaticToken};
use ocloud_adapters::subscription::SubscriptionRegistry;
use ocloud_adapters::{Adapter, ErrorKind};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{bearer_token, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROJECT: &str = "demo-project";

async fn setup(mode: GcpPoolMode) -> (MockServer, GcpAdapter) {
    let server = MockServer::start().await;
    let config = GcpConfig {
        project: Some(PROJECT.into()),
        region: "us-central1".into(),
        compute_endpoint: server.uri(),
        pool_mode: mode,
    };
    let adapter = GcpAdapter::new(
        AdapterSettings {
            name: "cloud".into(),
            ocloud_id: "ocloud-2".into(),
        },
        config,
        PROJECT,
        Arc::new(StaticToken::new("gcp-token")),
        HttpTransport::new(AuthScheme::Bearer).unwrap(),
        SubscriptionRegistry::in_memory("cloud", Arc::new(NoopObserver)),
    );
    (server, adapter)
}

fn project_path(rest: &str) -> String {
    format!("/projects/{PROJECT}/{rest}")
}

fn zone(name: &str) -> Value {
    let region = name.rsplit_once('-').map(|(r, _)| r).unwrap_or(name);
    json!({
        "name": name,
        "status": "UP",
        "region": format!("https://compute.googleapis.com/compute/v1/projects/{PROJECT}/regions/{region}")
    })
}

fn instance(name: &str, zone: &str, machine_type: &str, labels: Value) -> Value {
    json!({
        "id": "1001",
        "name": name,
        "zone": format!("https://compute.googleapis.com/compute/v1/projects/{PROJECT}/zones/{zone}"),
        "machineType": format!("zones/{zone}/machineTypes/{machine_type}"),
        "status": "RUNNING",
        "labels": labels,
        "labelFingerprint": "fp-1"
    })
}

mod zone_pool_tests {
    use super::*;

    #[tokio::test]
    async fn test_zones_paginate_and_stay_in_region() {
        let (server, adapter) = setup(GcpPoolMode::Zones).await;
        Mock::given(method("GET"))
            .and(path(project_path("zones")))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [zone("us-central1-c"), zone("europe-west1-b")]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(project_path("zones")))
            .and(bearer_token("gcp-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [zone("us-central1-a"), zone("us-central1-b")],
                "nextPageToken": "page-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let pools = adapter.list_resource_pools(None).await.unwrap();
        let ids: Vec<_> = pools.iter().map(|p| p.resource_pool_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["gcp-zone-us-central1-a", "gcp-zone-us-central1-b", "gcp-zone-us-central1-c"]
        );
    }

    #[tokio::test]
    async fn test_zone_pool_mutations_not_supported() {
        let (_server, adapter) = setup(GcpPoolMode::Zones).await;
        let pool = ResourcePool {
            name: "us-central1-z".into(),
            ..ResourcePool::default()
        };

        let err = adapter.create_resource_pool(pool.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
        let err = adapter
            .update_resource_pool("gcp-zone-us-central1-a", pool)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
        let err = adapter
            .delete_resource_pool("gcp-zone-us-central1-a")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[tokio::test]
    async fn test_get_zone_pool_outside_region_not_found() {
        let (server, adapter) = setup(GcpPoolMode::Zones).await;
        Mock::given(method("GET"))
            .and(path(project_path("zones/us-central1-a")))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone("us-central1-a")))
            .mount(&server)
            .await;

        let pool = adapter.get_resource_pool("gcp-zone-us-central1-a").await.unwrap();
        assert_eq!(pool.location, "us-central1-a");

        let err = adapter
            .get_resource_pool("gcp-zone-europe-west1-b")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourcePoolNotFound);
    }

    #[tokio::test]
    async fn test_list_instances_filters_region_and_labels() {
        let (server, adapter) = setup(GcpPoolMode::Zones).await;
        Mock::given(method("GET"))
            .and(path(project_path("aggregated/instances")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": {
                    "zones/us-central1-a": {
                        "instances": [
                            instance("du-1", "us-central1-a", "n2-standard-4", json!({"role": "du"})),
                            instance("cu-1", "us-central1-a", "n2-standard-2", json!({"role": "cu"}))
                        ]
                    },
                    "zones/us-central1-b": { "warning": { "code": "NO_RESULTS_ON_PAGE" } },
                    "zones/europe-west1-b": {
                        "instances": [instance("du-2", "europe-west1-b", "n2-standard-4", json!({"role": "du"}))]
                    }
                }
            })))
            .mount(&server)
            .await;

        let filter = Filter::default().with_label("role", "du");
        let resources = adapter.list_resources(Some(&filter)).await.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].resource_id, "us-central1-a/du-1");
        assert_eq!(resources[0].resource_pool_id, "gcp-zone-us-central1-a");
        assert_eq!(resources[0].resource_type_id, "n2-standard-4");

        let page = adapter
            .list_resources(Some(&Filter::default().with_page(1, 1)))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_update_instance_sets_fingerprinted_labels() {
        let (server, adapter) = setup(GcpPoolMode::Zones).await;
        let instance_path = project_path("zones/us-central1-a/instances/du-1");
        Mock::given(method("GET"))
            .and(path(instance_path.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(instance(
                "du-1",
                "us-central1-a",
                "n2-standard-4",
                json!({"role": "du"}),
            )))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{instance_path}/setLabels")))
            .and(body_partial_json(json!({
                "labels": { "role": "du", "tier": "edge" },
                "labelFingerprint": "fp-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "kind": "compute#operation" })))
            .expect(1)
            .mount(&server)
            .await;

        let resource = Resource {
            labels: [("role", "du"), ("tier", "edge")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Resource::default()
        };
        let updated = adapter
            .update_resource("us-central1-a/du-1", resource)
            .await
            .unwrap();
        assert_eq!(updated.labels["tier"], "edge");
    }

    #[tokio::test]
    async fn test_missing_instance_and_bad_id() {
        let (server, adapter) = setup(GcpPoolMode::Zones).await;
        Mock::given(method("GET"))
            .and(path(project_path("zones/us-central1-a/instances/ghost")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": 404, "message": "The resource was not found" }
            })))
            .mount(&server)
            .await;

        let err = adapter.get_resource("us-central1-a/ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
        let err = adapter.get_resource("no-zone").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
    }

    #[tokio::test]
    async fn test_create_instance_validation() {
        let (_server, adapter) = setup(GcpPoolMode::Zones).await;
        let err = adapter.create_resource(Resource::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceTypeRequired);

        let resource = Resource {
            resource_type_id: "e2-small".into(),
            resource_pool_id: "gcp-zone-us-central1-a".into(),
            ..Resource::default()
        };
        let err = adapter.create_resource(resource).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_create_instance_in_zone_pool() {
        let (server, adapter) = setup(GcpPoolMode::Zones).await;
        Mock::given(method("POST"))
            .and(path(project_path("zones/us-central1-b/instances")))
            .and(body_partial_json(json!({
                "name": "du-9",
                "machineType": "zones/us-central1-b/machineTypes/e2-small"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "kind": "compute#operation" })))
            .expect(1)
            .mount(&server)
            .await;

        let mut resource = Resource {
            resource_type_id: "e2-small".into(),
            resource_pool_id: "gcp-zone-us-central1-b".into(),
            ..Resource::default()
        };
        resource.extensions.insert("name".into(), json!("du-9"));
        resource
            .extensions
            .insert("sourceImage".into(), json!("projects/debian-cloud/global/images/family/debian-12"));

        let created = adapter.create_resource(resource).await.unwrap();
        assert_eq!(created.resource_id, "us-central1-b/du-9");
        assert_eq!(created.resource_pool_id, "gcp-zone-us-central1-b");
        assert_eq!(created.extensions["status"], json!("PROVISIONING"));
    }

    #[tokio::test]
    async fn test_create_instance_outside_region_rejected() {
        let (server, adapter) = setup(GcpPoolMode::Zones).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "kind": "compute#operation" })))
            .expect(0)
            .mount(&server)
            .await;

        let mut resource = Resource {
            resource_type_id: "e2-small".into(),
            resource_pool_id: "gcp-zone-europe-west1-b".into(),
            ..Resource::default()
        };
        resource.extensions.insert("name".into(), json!("du-9"));
        resource.extensions.insert("sourceImage".into(), json!("debian-12"));

        let err = adapter.create_resource(resource).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourcePoolNotFound);
    }

    #[tokio::test]
    async fn test_machine_types_deduplicated() {
        let (server, adapter) = setup(GcpPoolMode::Zones).await;
        Mock::given(method("GET"))
            .and(path(project_path("aggregated/machineTypes")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": {
                    "zones/us-central1-a": { "machineTypes": [
                        { "name": "e2-small", "guestCpus": 2, "memoryMb": 2048, "zone": "us-central1-a" },
                        { "name": "n2-standard-4", "guestCpus": 4, "memoryMb": 16384, "zone": "us-central1-a" }
                    ]},
                    "zones/us-central1-b": { "machineTypes": [
                        { "name": "e2-small", "guestCpus": 2, "memoryMb": 2048, "zone": "us-central1-b" }
                    ]}
                }
            })))
            .mount(&server)
            .await;

        let types = adapter.list_resource_types(None).await.unwrap();
        let names: Vec<_> = types.iter().map(|t| t.resource_type_id.as_str()).collect();
        assert_eq!(names, vec!["e2-small", "n2-standard-4"]);

        let err = adapter.get_resource_type("m1.small").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceTypeNotFound);
    }

    #[tokio::test]
    async fn test_health_probes_region() {
        let (server, adapter) = setup(GcpPoolMode::Zones).await;
        Mock::given(method("GET"))
            .and(path(project_path("regions/us-central1")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "us-central1" })))
            .expect(1)
            .mount(&server)
            .await;

        adapter.health().await.unwrap();
    }

    #[tokio::test]
    async fn test_health_reports_upstream_failure() {
        let (server, adapter) = setup(GcpPoolMode::Zones).await;
        Mock::given(method("GET"))
            .and(path(project_path("regions/us-central1")))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = adapter.health().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_deployment_manager_record() {
        let (server, adapter) = setup(GcpPoolMode::Zones).await;
        Mock::given(method("GET"))
            .and(path(project_path("zones")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [zone("us-central1-a"), zone("asia-east1-a")]
            })))
            .mount(&server)
            .await;

        let dm = adapter
            .get_deployment_manager("gcp-demo-project-us-central1")
            .await
            .unwrap();
        assert_eq!(dm.supported_locations, vec!["us-central1-a"]);
        assert_eq!(dm.ocloud_id, "ocloud-2");
        assert!(dm.capabilities.contains(&"resource-pools".to_string()));
    }
}

mod instance_group_tests {
    use super::*;

    fn group(name: &str, size: u64) -> Value {
        json!({
            "name": name,
            "targetSize": size,
            "baseInstanceName": name,
            "region": format!("https://compute.googleapis.com/compute/v1/projects/{PROJECT}/regions/us-central1"),
            "instanceTemplate": format!("https://compute.googleapis.com/compute/v1/projects/{PROJECT}/global/instanceTemplates/du-template")
        })
    }

    #[tokio::test]
    async fn test_create_group_requires_template() {
        let (_server, adapter) = setup(GcpPoolMode::InstanceGroups).await;
        let pool = ResourcePool {
            name: "du-pool".into(),
            ..ResourcePool::default()
        };
        let err = adapter.create_resource_pool(pool).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_create_group_posts_manager() {
        let (server, adapter) = setup(GcpPoolMode::InstanceGroups).await;
        Mock::given(method("POST"))
            .and(path(project_path("regions/us-central1/instanceGroupManagers")))
            .and(body_partial_json(json!({
                "name": "du-pool",
                "targetSize": 2,
                "instanceTemplate": "projects/demo-project/global/instanceTemplates/du-template"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "kind": "compute#operation" })))
            .expect(1)
            .mount(&server)
            .await;

        let mut pool = ResourcePool {
            name: "du-pool".into(),
            ..ResourcePool::default()
        };
        pool.extensions.insert("instanceTemplate".into(), json!("du-template"));
        pool.extensions.insert("targetSize".into(), json!(2));

        let created = adapter.create_resource_pool(pool).await.unwrap();
        assert_eq!(created.resource_pool_id, "gcp-mig-du-pool");
        assert_eq!(created.location, "us-central1");
    }

    #[tokio::test]
    async fn test_update_group_resizes() {
        let (server, adapter) = setup(GcpPoolMode::InstanceGroups).await;
        let group_path = project_path("regions/us-central1/instanceGroupManagers/du-pool");
        Mock::given(method("GET"))
            .and(path(group_path.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(group("du-pool", 5)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{group_path}/resize")))
            .and(query_param("size", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "kind": "compute#operation" })))
            .expect(1)
            .mount(&server)
            .await;

        let mut pool = ResourcePool::default();
        pool.extensions.insert("targetSize".into(), json!(5));
        let updated = adapter.update_resource_pool("gcp-mig-du-pool", pool).await.unwrap();
        assert_eq!(updated.extensions["targetSize"], json!(5));
    }

    #[tokio::test]
    async fn test_delete_missing_group_not_found() {
        let (server, adapter) = setup(GcpPoolMode::InstanceGroups).await;
        Mock::given(method("DELETE"))
            .and(path(project_path("regions/us-central1/instanceGroupManagers/nope")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = adapter.delete_resource_pool("gcp-mig-nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourcePoolNotFound);
    }

    #[tokio::test]
    async fn test_create_instance_with_group_pool_rejected() {
        let (server, adapter) = setup(GcpPoolMode::InstanceGroups).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "kind": "compute#operation" })))
            .expect(0)
            .mount(&server)
            .await;

        let mut resource = Resource {
            resource_type_id: "e2-small".into(),
            resource_pool_id: "gcp-mig-web".into(),
            ..Resource::default()
        };
        resource.extensions.insert("name".into(), json!("web-1"));
        resource.extensions.insert("sourceImage".into(), json!("debian-12"));
        resource.extensions.insert("zone".into(), json!("us-central1-a"));

        let err = adapter.create_resource(resource).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_standalone_instance_has_no_pool() {
        let (server, adapter) = setup(GcpPoolMode::InstanceGroups).await;
        Mock::given(method("POST"))
            .and(path(project_path("zones/us-central1-a/instances")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "kind": "compute#operation" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(project_path("aggregated/instances")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": { "zones/us-central1-a": {
                    "instances": [instance("web-1", "us-central1-a", "e2-small", json!({}))]
                } }
            })))
            .mount(&server)
            .await;

        let mut resource = Resource {
            resource_type_id: "e2-small".into(),
            ..Resource::default()
        };
        resource.extensions.insert("name".into(), json!("web-1"));
        resource.extensions.insert("sourceImage".into(), json!("debian-12"));
        resource.extensions.insert("zone".into(), json!("us-central1-a"));

        let created = adapter.create_resource(resource).await.unwrap();
        assert_eq!(created.resource_pool_id, "");

        let listed = adapter.list_resources(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].resource_pool_id, created.resource_pool_id);
    }

    #[tokio::test]
    async fn test_instances_map_to_owning_group() {
        let (server, adapter) = setup(GcpPoolMode::InstanceGroups).await;
        let mut owned = instance("du-pool-abcd", "us-central1-a", "n2-standard-4", json!({}));
        owned["metadata"] = json!({ "items": [{
            "key": "created-by",
            "value": "projects/123/regions/us-central1/instanceGroupManagers/du-pool"
        }]});
        let loose = instance("bastion", "us-central1-b", "e2-small", json!({}));

        Mock::given(method("GET"))
            .and(path(project_path("aggregated/instances")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": { "zones/us-central1-a": { "instances": [owned] }, "zones/us-central1-b": { "instances": [loose] } }
            })))
            .mount(&server)
            .await;

        let resources = adapter
            .list_resources(Some(&Filter::for_pool("gcp-mig-du-pool")))
            .await
            .unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].resource_id, "us-central1-a/du-pool-abcd");
    }
}
