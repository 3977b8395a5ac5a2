//! Configuration Management
//!
//! Loads backend definitions from a YAML (or JSON) file.

use crate::backends::gcp::GcpConfig;
use crate::backends::openstack::OpenStackConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backend used when none is named on the command line
    #[serde(default)]
    pub default_backend: Option<String>,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

/// One backend connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    /// Identifier of the owning deployment, copied onto pools and the
    /// deployment manager record
    #[serde(default)]
    pub ocloud_id: String,
    #[serde(default)]
    pub subscriptions: SubscriptionStorage,
    #[serde(flatten)]
    pub kind: BackendKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendKind {
    Gcp(GcpConfig),
    Openstack(OpenStackConfig),
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gcp(_) => "gcp",
            Self::Openstack(_) => "openstack",
        }
    }
}

/// Where subscriptions are kept
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SubscriptionStorage {
    /// Process memory; lost on restart
    #[default]
    Memory,
    /// JSON file; defaults to the user data directory
    File {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// Subscriptions are not offered
    None,
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ocloud-adapters").join("config.yaml"))
    }

    /// Load configuration from an explicit path or the default location
    ///
    /// A missing default file yields an empty configuration; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if explicit {
                bail!("Config file not found: {}", path.display());
            }
            tracing::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&content, &path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse by file extension: `.json` as JSON, anything else as YAML
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            serde_json::from_str(content)
                .with_context(|| format!("Failed to parse config JSON {}", path.display()))
        } else {
            serde_yaml::from_str(content)
                .with_context(|| format!("Failed to parse config YAML {}", path.display()))
        }
    }

    /// Check names are unique and endpoints are well-formed URLs
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for backend in &self.backends {
            if backend.name.is_empty() {
                bail!("Backend name must not be empty");
            }
            if !seen.insert(backend.name.as_str()) {
                bail!("Duplicate backend name: {}", backend.name);
            }

            let endpoints: Vec<&str> = match &backend.kind {
                BackendKind::Gcp(gcp) => vec![gcp.compute_endpoint.as_str()],
                BackendKind::Openstack(os) => {
                    vec![os.identity_endpoint.as_str(), os.compute_endpoint.as_str()]
                },
            };
            for endpoint in endpoints {
                url::Url::parse(endpoint).with_context(|| {
                    format!("Invalid endpoint '{}' for backend {}", endpoint, backend.name)
                })?;
            }
        }

        if let Some(default) = &self.default_backend {
            if !seen.contains(default.as_str()) {
                bail!("Default backend '{}' is not defined", default);
            }
        }

        Ok(())
    }

    /// Pick a backend: explicit name > configured default > the only one
    pub fn backend(&self, name: Option<&str>) -> Result<&BackendConfig> {
        let wanted = name.or(self.default_backend.as_deref());
        match wanted {
            Some(wanted) => self
                .backends
                .iter()
                .find(|b| b.name == wanted)
                .with_context(|| format!("Unknown backend: {}", wanted)),
            None => match self.backends.as_slice() {
                [only] => Ok(only),
                [] => bail!("No backends configured"),
                _ => bail!("Several backends configured; choose one with --backend"),
            },
        }
    }
}
