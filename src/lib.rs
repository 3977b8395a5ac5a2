//! O-Cloud infrastructure adapters
//!
//! A uniform contract for exposing cloud backends as O-Cloud inventory:
//! resource pools, resources, resource types, a deployment manager record and
//! inventory change subscriptions.
//!
//! # Module Structure
//!
//! - [`adapter`] - capability contract and the instrumented dispatcher
//! - [`backends`] - GCP and OpenStack translators
//! - [`config`] - backend definitions loaded from YAML or JSON
//! - [`error`] - error taxonomy
//! - [`filter`] - filter matching and pagination
//! - [`model`] - normalized inventory records
//! - [`observability`] - observer hooks
//! - [`pool`] - resource pool strategies
//! - [`session`] - token caching and the retrying API client
//! - [`subscription`] - subscription registry and stores

pub mod adapter;
pub mod backends;
pub mod config;
pub mod error;
pub mod filter;
pub mod model;
pub mod observability;
pub mod pool;
pub mod session;
pub mod subscription;

pub use adapter::{Adapter, Capabilities, Capability, InstrumentedAdapter};
pub use error::{AdapterError, ErrorKind, Result};

/// Version injected at compile time via OCLOUD_ADAPTERS_VERSION (set by CI),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("OCLOUD_ADAPTERS_VERSION") {
    Some(v) => v,
    None => "dev",
};
