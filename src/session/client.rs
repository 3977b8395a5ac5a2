//! API client
//!
//! Combines a token source with the HTTP transport. A request rejected as
//! unauthorized gets exactly one more attempt with a fresh token; a second
//! rejection is final.

use super::http::HttpTransport;
use super::TokenSource;
use crate::error::{AdapterError, Result};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

/// Authenticated client for one backend API
#[derive(Clone)]
pub struct ApiClient {
    tokens: Arc<dyn TokenSource>,
    http: HttpTransport,
}

impl ApiClient {
    pub fn new(tokens: Arc<dyn TokenSource>, http: HttpTransport) -> Self {
        Self { tokens, http }
    }

    pub fn tokens(&self) -> &Arc<dyn TokenSource> {
        &self.tokens
    }

    pub async fn get(&self, url: &str) -> Result<Value> {
        self.send(Method::GET, url, None).await
    }

    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        self.send(Method::POST, url, body).await
    }

    pub async fn put(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        self.send(Method::PUT, url, body).await
    }

    pub async fn delete(&self, url: &str) -> Result<Value> {
        self.send(Method::DELETE, url, None).await
    }

    /// Send with one refresh-and-resend cycle on 401
    pub async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let token = self.tokens.token().await?;
        match self.http.send(method.clone(), url, &token, body).await {
            Err(err) if err.is_retryable_auth() => {
                tracing::warn!("{}; refreshing credentials and retrying once", err);
                self.tokens.invalidate_rejected(&token).await;
                let token = self.tokens.token().await?;
                match self.http.send(method, url, &token, body).await {
                    Err(AdapterError::Unauthorized { operation }) => {
                        tracing::error!("{} still unauthorized after token refresh", operation);
                        Err(AdapterError::Unauthorized { operation })
                    },
                    other => other,
                }
            },
            other => other,
        }
    }
}
