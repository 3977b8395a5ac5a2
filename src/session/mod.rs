//! Authenticated access to backend APIs
//!
//! # Module Structure
//!
//! - [`auth`] - Keystone session manager with cached, self-refreshing tokens
//! - [`http`] - HTTP transport and error formatting
//! - [`client`] - API client that retries once after an unauthorized response
//!
//! Backends obtain tokens through the [`TokenSource`] trait, so the same
//! retrying client serves both session-token backends and bearer-token
//! backends.

pub mod auth;
pub mod client;
pub mod http;

use crate::error::Result;
use async_trait::async_trait;

pub use auth::{IdentityCredentials, SessionManager, SessionState};
pub use client::ApiClient;
pub use http::{AuthScheme, HttpTransport};

/// Anything that can hand out a credential for outbound requests
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a token that is valid right now
    async fn token(&self) -> Result<String>;

    /// Forget the current token so the next `token` call fetches a new one
    async fn invalidate(&self);

    /// Forget the current token only if it is still the one the server
    /// rejected; a token refreshed by a concurrent caller is kept
    async fn invalidate_rejected(&self, _rejected: &str) {
        self.invalidate().await
    }
}

/// A pre-issued token that never changes
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: &str) -> Self {
        Self(token.to_string())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }

    async fn invalidate(&self) {}
}
