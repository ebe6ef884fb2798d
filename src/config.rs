//! Operator configuration
//!
//! Loaded from `notesctl.toml`. Every section is optional except the domain,
//! which is validated later when the backend spec is built (a missing domain
//! is a configuration error that must abort before anything is mutated).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DeployResult;

/// Top-level operator configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Public domain the proxy serves, e.g. "notes.example.com"
    #[serde(default)]
    pub domain: String,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub network: NetworkConfig,
}

/// Which backends to deploy and how they are addressed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// "document_database", "relay", or "both"
    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_relay_path")]
    pub relay_path: String,

    /// Host-published CouchDB port, used when proxy and backend talk over loopback
    #[serde(default = "default_db_port")]
    pub db_port: u16,

    /// Host-published relay port
    #[serde(default = "default_relay_port")]
    pub relay_port: u16,

    /// Must match the document database's own max request payload
    #[serde(default = "default_max_body_size")]
    pub max_body_size: String,
}

fn default_kind() -> String {
    "both".to_string()
}
fn default_db_path() -> String {
    "/sync".to_string()
}
fn default_relay_path() -> String {
    "/relay".to_string()
}
fn default_db_port() -> u16 {
    5984
}
fn default_relay_port() -> u16 {
    8080
}
fn default_max_body_size() -> String {
    "20m".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            db_path: default_db_path(),
            relay_path: default_relay_path(),
            db_port: default_db_port(),
            relay_port: default_relay_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

/// Network topology overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NetworkConfig {
    /// Custom network name - set to bypass inventory-based resolution
    #[serde(default)]
    pub name: Option<String>,

    /// Allow creating the custom network when it does not exist
    #[serde(default)]
    pub create: bool,

    /// Preferred network in shared mode, when several exist
    #[serde(default)]
    pub prefer: Option<String>,
}

impl Config {
    /// Load from a TOML file; a missing file yields defaults
    pub fn load(path: &Path) -> DeployResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("notesctl.toml")).unwrap();
        assert!(config.domain.is_empty());
        assert_eq!(config.backend.kind, "both");
        assert_eq!(config.backend.db_port, 5984);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notesctl.toml");
        std::fs::write(
            &path,
            r#"
domain = "notes.example.com"

[backend]
kind = "document_database"
"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.domain, "notes.example.com");
        assert_eq!(config.backend.kind, "document_database");
        assert_eq!(config.backend.db_path, "/sync");
        assert!(config.network.name.is_none());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notesctl.toml");
        std::fs::write(&path, "domain = [unclosed").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn custom_network_section_parses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notesctl.toml");
        std::fs::write(
            &path,
            r#"
domain = "n.example.com"

[network]
name = "my-net"
create = true
"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.network.name.as_deref(), Some("my-net"));
        assert!(config.network.create);
    }
}
