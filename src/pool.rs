//! Resource pool strategies
//!
//! A backend picks exactly one native grouping construct to represent resource
//! pools when it is constructed. Pool ids are the strategy prefix followed by
//! the native name, so the native name can always be recovered from an id.

use crate::error::{AdapterError, Result};

/// Who owns the lifecycle of the native construct behind a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolManagement {
    /// Provider-native groupings (zones); read-only through the adapter
    BackendManaged,
    /// Mutable constructs (instance groups, aggregates) the adapter creates
    AdapterManaged,
}

/// The active pool representation of one adapter instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStrategy {
    management: PoolManagement,
    prefix: &'static str,
    construct: &'static str,
}

impl PoolStrategy {
    pub const fn backend_managed(prefix: &'static str, construct: &'static str) -> Self {
        Self {
            management: PoolManagement::BackendManaged,
            prefix,
            construct,
        }
    }

    pub const fn adapter_managed(prefix: &'static str, construct: &'static str) -> Self {
        Self {
            management: PoolManagement::AdapterManaged,
            prefix,
            construct,
        }
    }

    pub fn is_mutable(&self) -> bool {
        self.management == PoolManagement::AdapterManaged
    }

    /// Human-readable name of the native construct
    pub fn construct(&self) -> &'static str {
        self.construct
    }

    /// Build the pool id for a native name
    pub fn pool_id(&self, native_name: &str) -> String {
        format!("{}{}", self.prefix, native_name)
    }

    /// Recover the native name from a pool id
    pub fn native_name<'a>(&self, pool_id: &'a str) -> Result<&'a str> {
        match pool_id.strip_prefix(self.prefix) {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(AdapterError::ResourcePoolNotFound {
                id: pool_id.to_string(),
            }),
        }
    }

    /// Fail with `NotSupported` unless pools are adapter-managed
    pub fn ensure_mutable(&self, backend: &str, operation: &str) -> Result<()> {
        if self.is_mutable() {
            return Ok(());
        }
        Err(AdapterError::NotSupported {
            backend: backend.to_string(),
            operation: operation.to_string(),
            reason: format!(
                "resource pools are backed by {}s, which are read-only",
                self.construct
            ),
        })
    }
}
