//! Configuration Management
//!
//! Persistent user configuration plus the validated runtime settings the
//! engine reads at call time.

use crate::error::{GraphError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com";
pub const DEFAULT_SCHEMA_VERSION: &str = "v1.0";
pub const USER_AGENT: &str = concat!("graphverb/", env!("CARGO_PKG_VERSION"));

pub const BASE_URL_ENV: &str = "GRAPH_BASE_URL";
pub const SCHEMA_VERSION_ENV: &str = "GRAPH_SCHEMA_VERSION";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Service root, without the schema version segment
    #[serde(default)]
    pub base_url: Option<String>,
    /// Schema version segment, e.g. `v1.0` or `beta`
    #[serde(default)]
    pub schema_version: Option<String>,
}

impl Config {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("graphverb").join("config.json"))
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;

        Ok(())
    }

    /// Effective base URL (env > config > default)
    pub fn effective_base_url(&self) -> String {
        std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    /// Effective schema version (env > config > default)
    pub fn effective_schema_version(&self) -> String {
        std::env::var(SCHEMA_VERSION_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.schema_version.clone())
            .unwrap_or_else(|| DEFAULT_SCHEMA_VERSION.to_string())
    }

    /// Build runtime settings from the effective values
    pub fn settings(&self) -> Result<GraphSettings> {
        GraphSettings::new(&self.effective_base_url(), &self.effective_schema_version())
    }
}

/// Validated environment parameters for one or more calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSettings {
    base_url: String,
    schema_version: String,
    pub user_agent: String,
}

impl GraphSettings {
    pub fn new(base_url: &str, schema_version: &str) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| GraphError::invalid_argument(format!("base URL {:?}: {}", base_url, e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GraphError::invalid_argument(format!(
                "base URL must be http or https, got {:?}",
                parsed.scheme()
            )));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            schema_version: schema_version.trim_matches('/').to_string(),
            user_agent: USER_AGENT.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Address every relative resource path is resolved against
    pub fn base_address(&self) -> String {
        if self.schema_version.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, self.schema_version)
        }
    }
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            user_agent: USER_AGENT.to_string(),
        }
    }
}
