//! Keystone session management
//!
//! Acquires a scoped token through the Identity v3 password flow, caches it
//! with a safety margin before the server-declared expiry, and refreshes it
//! when stale. Refresh is serialized behind the write half of an `RwLock`; the
//! steady state only ever takes the read half.

use super::TokenSource;
use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// Refresh tokens this many minutes before the server says they expire
/// so a request never starts with an already-expired token
pub const TOKEN_EXPIRY_MARGIN_MINUTES: i64 = 5;

/// Assumed lifetime in minutes when the server does not declare an expiry
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 55;

/// Header carrying the issued token on a successful exchange
pub const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Password credentials scoped to a project
#[derive(Clone)]
pub struct IdentityCredentials {
    /// Identity service root, e.g. `https://keystone.example.com:5000`
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub user_domain: String,
    pub project: String,
    pub project_domain: String,
}

impl std::fmt::Debug for IdentityCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCredentials")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("user_domain", &self.user_domain)
            .field("project", &self.project)
            .field("project_domain", &self.project_domain)
            .finish()
    }
}

impl IdentityCredentials {
    fn tokens_url(&self) -> String {
        format!("{}/v3/auth/tokens", self.endpoint.trim_end_matches('/'))
    }

    fn request_body(&self) -> serde_json::Value {
        json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": self.username,
                            "domain": { "name": self.user_domain },
                            "password": self.password,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": self.project,
                        "domain": { "name": self.project_domain },
                    }
                }
            }
        })
    }
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token goes stale (margin already applied)
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Deserialize)]
struct TokenBody {
    #[serde(default)]
    expires_at: Option<String>,
}

/// Observable state of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated { expires_at: DateTime<Utc> },
    /// A writer holds the lock; a refresh or invalidation is in flight
    Refreshing,
}

/// Cached, self-refreshing Keystone session
#[derive(Clone)]
pub struct SessionManager {
    client: Client,
    credentials: Arc<IdentityCredentials>,
    cache: Arc<RwLock<Option<CachedToken>>>,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(client: Client, credentials: IdentityCredentials) -> Self {
        Self::with_clock(client, credentials, Arc::new(SystemClock))
    }

    pub fn with_clock(
        client: Client,
        credentials: IdentityCredentials,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            credentials: Arc::new(credentials),
            cache: Arc::new(RwLock::new(None)),
            clock,
        }
    }

    /// Get a valid token, authenticating only when the cached one is stale
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if self.clock.now() < cached.expires_at {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached session token is stale");
            }
        }

        let mut cache = self.cache.write().await;
        // Another caller may have refreshed while this one waited for the lock
        if let Some(cached) = cache.as_ref() {
            if self.clock.now() < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }

        let fresh = self.authenticate().await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }

    /// Drop the cached token; the next `get_token` re-authenticates
    pub async fn invalidate_token(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
        tracing::debug!("Session token invalidated");
    }

    /// Drop the cached token if it is the one that was rejected
    pub async fn invalidate_rejected_token(&self, rejected: &str) {
        let mut cache = self.cache.write().await;
        if cache.as_ref().is_some_and(|c| c.token == rejected) {
            *cache = None;
            tracing::debug!("Rejected session token invalidated");
        }
    }

    pub fn state(&self) -> SessionState {
        match self.cache.try_read() {
            Err(_) => SessionState::Refreshing,
            Ok(cache) => match cache.as_ref() {
                None => SessionState::Unauthenticated,
                Some(cached) => SessionState::Authenticated {
                    expires_at: cached.expires_at,
                },
            },
        }
    }

    async fn authenticate(&self) -> Result<CachedToken> {
        let url = self.credentials.tokens_url();
        tracing::info!(
            user = %self.credentials.username,
            project = %self.credentials.project,
            "Authenticating against {}",
            url
        );

        let response = self
            .client
            .post(&url)
            .json(&self.credentials.request_body())
            .send()
            .await
            .map_err(|e| AdapterError::Authentication {
                status: None,
                message: format!("failed to reach identity endpoint: {e}"),
            })?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                "Identity exchange failed: {} - {}",
                status,
                super::http::sanitize_for_log(&body)
            );
            return Err(AdapterError::Authentication {
                status: Some(status.as_u16()),
                message: format!("identity endpoint returned {status}"),
            });
        }

        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AdapterError::Authentication {
                status: Some(status.as_u16()),
                message: format!("response is missing the {SUBJECT_TOKEN_HEADER} header"),
            })?;

        let declared = response
            .json::<TokenResponse>()
            .await
            .ok()
            .and_then(|r| r.token.expires_at)
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let now = self.clock.now();
        let expires_at = match declared {
            Some(server_expiry) => server_expiry - Duration::minutes(TOKEN_EXPIRY_MARGIN_MINUTES),
            None => now + Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES),
        };

        tracing::debug!(
            "New session token cached, stale in ~{} minutes",
            (expires_at - now).num_minutes()
        );

        Ok(CachedToken { token, expires_at })
    }
}

#[async_trait]
impl TokenSource for SessionManager {
    async fn token(&self) -> Result<String> {
        self.get_token().await
    }

    async fn invalidate(&self) {
        self.invalidate_token().await
    }

    async fn invalidate_rejected(&self, rejected: &str) {
        self.invalidate_rejected_token(rejected).await
    }
}
