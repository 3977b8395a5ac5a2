//! GCP Authentication
//!
//! Application Default Credentials through `gcp_auth`, cached with an expiry
//! buffer, plus default project discovery from the gcloud environment.

use crate::error::{AdapterError, Result};
use crate::session::TokenSource;
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Refresh tokens this long before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Conservative lifetime assumed for ADC tokens
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// GCP credentials holder with token caching
#[derive(Clone)]
pub struct GcpCredentials {
    provider: Arc<dyn TokenProvider>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl GcpCredentials {
    /// Create credentials from Application Default Credentials
    pub async fn new() -> Result<Self> {
        let provider = gcp_auth::provider().await.map_err(|e| AdapterError::Authentication {
            status: None,
            message: format!(
                "failed to initialize GCP authentication ({e}); run 'gcloud auth application-default login'"
            ),
        })?;

        Ok(Self {
            provider,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_valid()) {
                return Ok(cached.token.clone());
            }
        }

        let mut cache = self.token_cache.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(cached) = cache.as_ref().filter(|c| c.is_valid()) {
            return Ok(cached.token.clone());
        }

        let token = self
            .provider
            .token(DEFAULT_SCOPES)
            .await
            .map_err(|e| AdapterError::Authentication {
                status: None,
                message: format!("failed to get access token: {e}"),
            })?;
        let token_str = token.as_str().to_string();

        *cache = Some(CachedToken {
            token: token_str.clone(),
            expires_at: Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER,
        });
        tracing::debug!(
            "New GCP token cached, expires in ~{} minutes",
            (DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token_str)
    }

    pub async fn clear(&self) {
        *self.token_cache.write().await = None;
    }

    /// Clear the cache only while it still holds `rejected`
    pub async fn clear_if(&self, rejected: &str) {
        let mut cache = self.token_cache.write().await;
        if cache.as_ref().is_some_and(|c| c.token == rejected) {
            *cache = None;
        }
    }
}

#[async_trait]
impl TokenSource for GcpCredentials {
    async fn token(&self) -> Result<String> {
        self.get_token().await
    }

    async fn invalidate(&self) {
        self.clear().await;
    }

    async fn invalidate_rejected(&self, rejected: &str) {
        self.clear_if(rejected).await;
    }
}

/// Get the gcloud configuration directory
pub fn get_gcloud_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|p| p.join("gcloud"))
}

/// Project IDs are 6-30 chars of lowercase letters, digits and hyphens,
/// starting with a letter and not ending with a hyphen
pub fn validate_project_id(project: &str) -> bool {
    if project.len() < 6 || project.len() > 30 {
        return false;
    }
    if !project.starts_with(|c: char| c.is_ascii_lowercase()) || project.ends_with('-') {
        return false;
    }
    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Value of `key` inside `[section]` of an INI-style gcloud file
fn ini_value(content: &str, section: &str, key: &str) -> Option<String> {
    let header = format!("[{section}]");
    let mut in_section = false;
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            in_section = line == header;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            if k.trim() == key {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}

/// Default project from the environment or the active gcloud configuration
pub fn get_default_project() -> Option<String> {
    for var in ["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"] {
        if let Ok(project) = std::env::var(var) {
            if validate_project_id(&project) {
                return Some(project);
            }
            tracing::warn!("Invalid project ID format in {}", var);
        }
    }

    let config_dir = get_gcloud_config_dir()?;
    let active = std::fs::read_to_string(config_dir.join("active_config")).ok()?;
    let name = active.trim();
    // Rejects path traversal through the config name
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        tracing::warn!("Invalid characters in active_config name");
        return None;
    }

    let content =
        std::fs::read_to_string(config_dir.join("configurations").join(format!("config_{name}")))
            .ok()?;
    ini_value(&content, "core", "project").filter(|p| validate_project_id(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_project_id() {
        assert!(validate_project_id("my-project-123"));
        assert!(!validate_project_id("short"));
        assert!(!validate_project_id("1starts-with-digit"));
        assert!(!validate_project_id("ends-with-hyphen-"));
        assert!(!validate_project_id("Has-Uppercase"));
    }

    #[test]
    fn test_ini_value_reads_section() {
        let content = "[compute]\nregion = europe-west1\n\n[core]\n# comment\naccount = a@b.c\nproject = demo-project\n";
        assert_eq!(ini_value(content, "core", "project").as_deref(), Some("demo-project"));
        assert_eq!(ini_value(content, "compute", "region").as_deref(), Some("europe-west1"));
        assert_eq!(ini_value(content, "compute", "project"), None);
    }
}
