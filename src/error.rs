//! Error types shared by every adapter
//!
//! Each variant carries the operation and target it failed on so a caller can
//! diagnose a failure from the message alone. Use [`AdapterError::kind`] to
//! test for a condition programmatically.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Programmatic condition of an [`AdapterError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    ResourceNotFound,
    ResourcePoolNotFound,
    ResourceTypeNotFound,
    SubscriptionNotFound,
    DeploymentManagerNotFound,
    ResourceTypeRequired,
    NotImplemented,
    NotSupported,
    Unauthorized,
    Authentication,
    Upstream,
    Timeout,
    Storage,
    Config,
}

/// Main error type for adapter operations
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Required input missing or malformed; raised before any I/O
    #[error("validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("resource not found: {id}")]
    ResourceNotFound { id: String },

    #[error("resource pool not found: {id}")]
    ResourcePoolNotFound { id: String },

    #[error("resource type not found: {id}")]
    ResourceTypeNotFound { id: String },

    #[error("subscription not found: {id}")]
    SubscriptionNotFound { id: String },

    #[error("deployment manager not found: {id}")]
    DeploymentManagerNotFound { id: String },

    #[error("resource type is required for {operation}")]
    ResourceTypeRequired { operation: String },

    /// The backend does not wire this capability
    #[error("{operation} is not implemented by backend {backend}")]
    NotImplemented { backend: String, operation: String },

    /// The operation is meaningless for the active pool strategy
    #[error("{operation} is not supported by backend {backend}: {reason}")]
    NotSupported {
        backend: String,
        operation: String,
        reason: String,
    },

    /// Request rejected with 401. Surfaces to callers only after the single
    /// refresh-and-resend cycle has also been rejected.
    #[error("unauthorized: {operation}")]
    Unauthorized { operation: String },

    /// Identity exchange failed
    #[error("authentication failed (status {status:?}): {message}")]
    Authentication {
        status: Option<u16>,
        message: String,
    },

    /// Backend API returned an error unrelated to authentication
    #[error("upstream error during {operation} (status {status:?}): {message}")]
    Upstream {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    #[error("{operation} timed out after {seconds:.1}s")]
    Timeout { operation: String, seconds: f64 },

    /// Durable subscription store failure
    #[error("storage error at {path}: {message}")]
    Storage { path: String, message: String },

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl AdapterError {
    /// Get the programmatic condition for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::ResourceNotFound { .. } => ErrorKind::ResourceNotFound,
            Self::ResourcePoolNotFound { .. } => ErrorKind::ResourcePoolNotFound,
            Self::ResourceTypeNotFound { .. } => ErrorKind::ResourceTypeNotFound,
            Self::SubscriptionNotFound { .. } => ErrorKind::SubscriptionNotFound,
            Self::DeploymentManagerNotFound { .. } => ErrorKind::DeploymentManagerNotFound,
            Self::ResourceTypeRequired { .. } => ErrorKind::ResourceTypeRequired,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::NotSupported { .. } => ErrorKind::NotSupported,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// HTTP status attached to this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } | Self::Authentication { status, .. } => *status,
            Self::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }

    /// True for upstream 404 responses
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Upstream { status: Some(404), .. })
    }

    /// Only an unauthorized rejection earns a token refresh and resend
    pub fn is_retryable_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Replace an upstream 404 with a domain not-found condition
    pub fn or_not_found(self, not_found: impl FnOnce() -> AdapterError) -> AdapterError {
        if self.is_not_found() {
            not_found()
        } else {
            self
        }
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_implemented(backend: &str, operation: &str) -> Self {
        Self::NotImplemented {
            backend: backend.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn upstream(operation: &str, message: impl Into<String>) -> Self {
        Self::Upstream {
            operation: operation.to_string(),
            status: None,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let err = AdapterError::SubscriptionNotFound { id: "abc".into() };
        assert_eq!(err.kind(), ErrorKind::SubscriptionNotFound);
        assert_eq!(err.to_string(), "subscription not found: abc");
    }

    #[test]
    fn test_or_not_found_only_rewrites_404() {
        let err = AdapterError::Upstream {
            operation: "GET /servers/1".into(),
            status: Some(404),
            message: "missing".into(),
        };
        let mapped = err.or_not_found(|| AdapterError::ResourceNotFound { id: "1".into() });
        assert_eq!(mapped.kind(), ErrorKind::ResourceNotFound);

        let err = AdapterError::Upstream {
            operation: "GET /servers/1".into(),
            status: Some(500),
            message: "boom".into(),
        };
        let mapped = err.or_not_found(|| AdapterError::ResourceNotFound { id: "1".into() });
        assert_eq!(mapped.kind(), ErrorKind::Upstream);
        assert_eq!(mapped.status(), Some(500));
    }

    #[test]
    fn test_only_unauthorized_is_retryable() {
        assert!(AdapterError::Unauthorized { operation: "GET /".into() }.is_retryable_auth());
        assert!(!AdapterError::upstream("GET /", "fail").is_retryable_auth());
        assert!(!AdapterError::Authentication { status: Some(401), message: "x".into() }
            .is_retryable_auth());
    }
}
