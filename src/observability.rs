//! Observability hooks
//!
//! The core reports operation outcomes through an injected [`Observer`].
//! Nothing here is global: each adapter receives its observer at construction.

use crate::error::AdapterError;
use std::time::Instant;

/// Narrow sink for operation outcomes
pub trait Observer: Send + Sync {
    fn record_operation(
        &self,
        backend: &str,
        operation: &str,
        start: Instant,
        error: Option<&AdapterError>,
    );

    fn record_health_check(&self, backend: &str, start: Instant, error: Option<&AdapterError>);

    fn set_subscription_count(&self, backend: &str, count: usize);
}

/// Emits structured tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn record_operation(
        &self,
        backend: &str,
        operation: &str,
        start: Instant,
        error: Option<&AdapterError>,
    ) {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match error {
            None => tracing::debug!(backend, operation, elapsed_ms, "operation succeeded"),
            Some(err) => tracing::warn!(
                backend,
                operation,
                elapsed_ms,
                kind = ?err.kind(),
                error = %err,
                "operation failed"
            ),
        }
    }

    fn record_health_check(&self, backend: &str, start: Instant, error: Option<&AdapterError>) {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match error {
            None => tracing::info!(backend, elapsed_ms, healthy = true, "health check"),
            Some(err) => {
                tracing::warn!(backend, elapsed_ms, healthy = false, error = %err, "health check")
            },
        }
    }

    fn set_subscription_count(&self, backend: &str, count: usize) {
        tracing::debug!(backend, count, "subscription count");
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn record_operation(&self, _: &str, _: &str, _: Instant, _: Option<&AdapterError>) {}
    fn record_health_check(&self, _: &str, _: Instant, _: Option<&AdapterError>) {}
    fn set_subscription_count(&self, _: &str, _: usize) {}
}
