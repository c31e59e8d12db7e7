//! Configuration Management
//!
//! Optional defaults for knative-cleanup, read from a JSON file. Command line
//! flags always win over values found here.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// User configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Registry host to clean images in
    #[serde(default)]
    pub gcr: Option<String>,
    /// Regex used to pick project names out of resource files
    #[serde(default)]
    pub re_project_name: Option<String>,
    #[serde(default)]
    pub concurrent_operations: Option<usize>,
    /// Service account key file used for all API calls
    #[serde(default)]
    pub service_account: Option<PathBuf>,
    /// Deadline for cleaning a single project
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("knative-cleanup").join("config.json"))
    }

    /// Load the config file at the default location. Missing or unreadable
    /// files yield the default configuration.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load an explicitly named config file. Any failure is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let body = serde_json::json!({
            "gcr": "us.gcr.io",
            "concurrent_operations": 4,
            "service_account": "/secrets/sa.json",
            "operation_timeout_secs": 600
        });
        std::fs::write(&path, body.to_string()).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(
            config,
            Config {
                gcr: Some("us.gcr.io".into()),
                concurrent_operations: Some(4),
                service_account: Some(PathBuf::from("/secrets/sa.json")),
                operation_timeout_secs: Some(600),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"re_project_name": "knative-e2e-[0-9]+"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.re_project_name.as_deref(), Some("knative-e2e-[0-9]+"));
        assert!(config.gcr.is_none());
        assert!(config.service_account.is_none());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"concurrency": 3}"#).unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(&dir.path().join("absent.json")).is_err());
    }
}
