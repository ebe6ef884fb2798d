//! Backend specification
//!
//! Which sync services are being deployed, where the proxy routes them, and
//! what upstream address each one answers on. Validation happens at
//! construction so every later stage can trust the invariants.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Config;
use crate::error::{DeployError, DeployResult};

/// Conventional container name for the document database backend
pub const DB_CONTAINER: &str = "notes-couchdb";
/// Conventional container name for the realtime relay backend
pub const RELAY_CONTAINER: &str = "notes-relay";

/// Which backend services this deployment fronts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    DocumentDatabase,
    Relay,
    Both,
}

impl BackendKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document_database" | "db" | "couchdb" => Some(Self::DocumentDatabase),
            "relay" => Some(Self::Relay),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn includes_database(self) -> bool {
        matches!(self, Self::DocumentDatabase | Self::Both)
    }

    pub fn includes_relay(self) -> bool {
        matches!(self, Self::Relay | Self::Both)
    }
}

/// Address the proxy connects to for one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Validated backend routing specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSpec {
    pub kind: BackendKind,
    pub domain: String,
    pub db_prefix: String,
    pub relay_prefix: String,
    pub db_upstream: Upstream,
    pub relay_upstream: Upstream,
    pub max_body_size: String,
}

/// Whether one prefix would capture traffic belonging to the other
///
/// Equal prefixes shadow trivially. A nested prefix (`/sync` under
/// `/sync/extra`) shadows too. A textual-only prefix like `/sync` vs `/sync2`
/// does not: the path segment boundary keeps the routes distinct.
fn prefixes_overlap(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let nested = |outer: &str, inner: &str| inner.starts_with(&format!("{}/", outer));
    nested(a, b) || nested(b, a)
}

impl BackendSpec {
    /// Build and validate a spec from operator config
    ///
    /// `shared_network` selects upstream addressing: container names when the
    /// proxy sits on the same docker network as the backends, loopback with
    /// host-published ports otherwise.
    pub fn from_config(config: &Config, shared_network: bool) -> DeployResult<Self> {
        if config.domain.trim().is_empty() {
            return Err(DeployError::MissingDomain);
        }
        let kind = BackendKind::parse(&config.backend.kind).unwrap_or(BackendKind::Both);

        if kind == BackendKind::Both
            && prefixes_overlap(&config.backend.db_path, &config.backend.relay_path)
        {
            return Err(DeployError::OverlappingPrefixes {
                db: config.backend.db_path.clone(),
                relay: config.backend.relay_path.clone(),
            });
        }

        let (db_upstream, relay_upstream) = if shared_network {
            (
                Upstream {
                    host: DB_CONTAINER.to_string(),
                    port: 5984,
                },
                Upstream {
                    host: RELAY_CONTAINER.to_string(),
                    port: 8080,
                },
            )
        } else {
            (
                Upstream {
                    host: "127.0.0.1".to_string(),
                    port: config.backend.db_port,
                },
                Upstream {
                    host: "127.0.0.1".to_string(),
                    port: config.backend.relay_port,
                },
            )
        };

        Ok(Self {
            kind,
            domain: config.domain.trim().to_string(),
            db_prefix: normalize_prefix(&config.backend.db_path),
            relay_prefix: normalize_prefix(&config.backend.relay_path),
            db_upstream,
            relay_upstream,
            max_body_size: config.backend.max_body_size.clone(),
        })
    }

    /// Site file name derived from the domain: "notes.example.com" -> "notes.conf"
    pub fn site_file_name(&self) -> String {
        let label = self.domain.split('.').next().unwrap_or(&self.domain);
        format!("{}.conf", label)
    }

    /// Container names of the backends this deployment includes
    pub fn container_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.kind.includes_database() {
            names.push(DB_CONTAINER);
        }
        if self.kind.includes_relay() {
            names.push(RELAY_CONTAINER);
        }
        names
    }
}

/// Ensure a leading slash and strip any trailing one
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
