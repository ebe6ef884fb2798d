//! Network topology resolution
//!
//! Decides which docker network the deployment joins. Empty inventory means
//! an isolated, owned network will be created; anything already there means
//! we join it in shared mode and never touch its lifecycle. A custom name
//! from the operator bypasses enumeration entirely.

use serde::{Deserialize, Serialize};

use crate::config::NetworkConfig;
use crate::docker::Docker;
use crate::error::{DeployError, DeployResult};

/// Default name for the isolated network this tool creates and owns
pub const ISOLATED_NETWORK_NAME: &str = "notes-net";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    Shared,
    Isolated,
    Custom,
}

/// Resolved network wiring for the deployment
///
/// `external` marks a network this tool did not create and must never
/// delete. Owned (isolated, or custom-created) networks carry the allocated
/// subnet; external ones keep `subnet` empty because their addressing is not
/// ours to manage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub mode: NetworkMode,
    pub subnet: Option<String>,
    pub gateway: Option<String>,
    pub external: bool,
}

impl NetworkSpec {
    /// Whether this tool is responsible for creating the network
    pub fn owned(&self) -> bool {
        !self.external
    }
}

/// Resolve the target network from live inventory and operator overrides
///
/// A previously persisted spec is reused verbatim; pass `None` when the
/// operator asked for a reset.
pub fn resolve(
    docker: &Docker,
    network: &NetworkConfig,
    prior: Option<NetworkSpec>,
) -> DeployResult<NetworkSpec> {
    if let Some(prior) = prior {
        return Ok(prior);
    }

    if let Some(name) = network.name.as_deref().filter(|n| !n.is_empty()) {
        return resolve_custom(docker, name, network.create);
    }

    let inventory = docker.list_networks()?;
    if inventory.is_empty() {
        return Ok(NetworkSpec {
            name: ISOLATED_NETWORK_NAME.to_string(),
            mode: NetworkMode::Isolated,
            subnet: None,
            gateway: None,
            external: false,
        });
    }

    let name = match network.prefer.as_deref() {
        Some(preferred) if inventory.iter().any(|n| n == preferred) => preferred.to_string(),
        _ => inventory[0].clone(),
    };
    Ok(NetworkSpec {
        name,
        mode: NetworkMode::Shared,
        subnet: None,
        gateway: None,
        external: true,
    })
}

fn resolve_custom(docker: &Docker, name: &str, create: bool) -> DeployResult<NetworkSpec> {
    if docker.network_exists(name)? {
        return Ok(NetworkSpec {
            name: name.to_string(),
            mode: NetworkMode::Custom,
            subnet: None,
            gateway: None,
            external: true,
        });
    }
    if !create {
        return Err(DeployError::NetworkNotFound {
            name: name.to_string(),
        });
    }
    // Created on request, so owned: subnet gets allocated downstream
    Ok(NetworkSpec {
        name: name.to_string(),
        mode: NetworkMode::Custom,
        subnet: None,
        gateway: None,
        external: false,
    })
}
