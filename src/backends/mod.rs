//! Backend translators
//!
//! - [`gcp`] - Compute Engine; zones or regional managed instance groups as pools
//! - [`openstack`] - Nova behind a Keystone session; availability zones or host
//!   aggregates as pools
//!
//! [`build_adapter`] turns a [`BackendConfig`] into a ready adapter wrapped in
//! [`InstrumentedAdapter`].

pub mod gcp;
pub mod json;
pub mod openstack;

use crate::adapter::{Adapter, InstrumentedAdapter};
use crate::config::{BackendConfig, BackendKind, SubscriptionStorage};
use crate::error::{AdapterError, Result};
use crate::observability::Observer;
use crate::subscription::{FileStore, SubscriptionRegistry};
use std::sync::Arc;

/// Identity shared by every backend instance
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub name: String,
    pub ocloud_id: String,
}

/// Build the subscription registry a backend config asks for
pub async fn build_registry(
    config: &BackendConfig,
    observer: Arc<dyn Observer>,
) -> Result<SubscriptionRegistry> {
    match &config.subscriptions {
        SubscriptionStorage::Memory => Ok(SubscriptionRegistry::in_memory(&config.name, observer)),
        SubscriptionStorage::File { path } => {
            let path = match path {
                Some(p) => p.clone(),
                None => FileStore::default_path(&config.name).ok_or_else(|| AdapterError::Config {
                    message: "no data directory for the subscription file; set subscriptions.path"
                        .to_string(),
                })?,
            };
            let store = FileStore::open(path).await?;
            Ok(SubscriptionRegistry::new(&config.name, Arc::new(store), observer))
        },
        SubscriptionStorage::None => Ok(SubscriptionRegistry::disabled(&config.name, observer)),
    }
}

/// Construct the configured backend behind capability checks and observation
pub async fn build_adapter(
    config: &BackendConfig,
    observer: Arc<dyn Observer>,
) -> Result<Arc<dyn Adapter>> {
    let settings = AdapterSettings {
        name: config.name.clone(),
        ocloud_id: config.ocloud_id.clone(),
    };
    let registry = build_registry(config, observer.clone()).await?;

    tracing::info!(
        backend = %config.name,
        kind = config.kind.as_str(),
        "Building adapter"
    );

    let inner: Arc<dyn Adapter> = match &config.kind {
        BackendKind::Gcp(gcp_config) => {
            Arc::new(gcp::GcpAdapter::connect(settings, gcp_config.clone(), registry).await?)
        },
        BackendKind::Openstack(os_config) => Arc::new(openstack::OpenStackAdapter::new(
            settings,
            os_config.clone(),
            registry,
        )?),
    };

    Ok(Arc::new(InstrumentedAdapter::new(inner, observer)))
}
