//! Typed wrapper over the docker CLI
//!
//! Inventory and mutation of networks and containers, driven through the
//! `CommandRunner` seam. Inspect output is parsed from `docker inspect` JSON;
//! anything that does not parse surfaces as `DeployError::Docker` with the
//! raw output attached.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{DeployError, DeployResult};
use crate::runner::CommandRunner;

/// Built-in docker networks that are never deployment candidates
pub const BUILTIN_NETWORKS: [&str; 3] = ["bridge", "host", "none"];

/// A volume mount on a running container
#[derive(Debug, Clone)]
pub struct MountInfo {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Observed state of a container, from `docker inspect`
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub name: String,
    pub running: bool,
    pub restarting: bool,
    pub networks: Vec<String>,
    pub mounts: Vec<MountInfo>,
}

impl ContainerInfo {
    pub fn is_on_network(&self, network: &str) -> bool {
        self.networks.iter().any(|n| n == network)
    }

    /// The mount whose in-container destination matches `dest`, if any
    pub fn mount_at(&self, dest: &Path) -> Option<&MountInfo> {
        self.mounts.iter().find(|m| m.destination == dest)
    }
}

#[derive(Deserialize)]
struct RawNetwork {
    #[serde(rename = "IPAM", default)]
    ipam: RawIpam,
}

#[derive(Deserialize, Default)]
struct RawIpam {
    #[serde(rename = "Config", default)]
    config: Vec<RawIpamConfig>,
}

#[derive(Deserialize)]
struct RawIpamConfig {
    #[serde(rename = "Subnet")]
    subnet: Option<String>,
}

#[derive(Deserialize)]
struct RawContainer {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "State", default)]
    state: RawState,
    #[serde(rename = "Mounts", default)]
    mounts: Vec<RawMount>,
    #[serde(rename = "NetworkSettings", default)]
    network_settings: RawNetworkSettings,
}

#[derive(Deserialize, Default)]
struct RawState {
    #[serde(rename = "Running", default)]
    running: bool,
    #[serde(rename = "Restarting", default)]
    restarting: bool,
}

#[derive(Deserialize)]
struct RawMount {
    #[serde(rename = "Source", default)]
    source: String,
    #[serde(rename = "Destination", default)]
    destination: String,
}

#[derive(Deserialize, Default)]
struct RawNetworkSettings {
    #[serde(rename = "Networks", default)]
    networks: std::collections::BTreeMap<String, serde_json::Value>,
}

/// Docker CLI client
pub struct Docker<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Docker<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Names of all networks except the built-in defaults
    pub fn list_networks(&self) -> DeployResult<Vec<String>> {
        let output = self
            .runner
            .run_checked("docker", &["network", "ls", "--format", "{{.Name}}"])?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|n| !n.is_empty() && !BUILTIN_NETWORKS.contains(n))
            .map(String::from)
            .collect())
    }

    /// Names of every network, built-ins included
    ///
    /// Subnet accounting must see all assignments, not just deployment
    /// candidates.
    pub fn all_networks(&self) -> DeployResult<Vec<String>> {
        let output = self
            .runner
            .run_checked("docker", &["network", "ls", "--format", "{{.Name}}"])?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect())
    }

    /// Union of subnets assigned to the given networks
    pub fn network_subnets(&self, names: &[String]) -> DeployResult<Vec<String>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec!["network", "inspect"];
        args.extend(names.iter().map(String::as_str));
        let output = self.runner.run_checked("docker", &args)?;
        let raw: Vec<RawNetwork> =
            serde_json::from_str(&output.stdout).map_err(|e| DeployError::Docker {
                message: format!("network inspect: {}: {}", e, output.stdout.trim()),
            })?;
        Ok(raw
            .into_iter()
            .flat_map(|n| n.ipam.config)
            .filter_map(|c| c.subnet)
            .collect())
    }

    pub fn network_exists(&self, name: &str) -> DeployResult<bool> {
        let output = self.runner.run("docker", &["network", "inspect", name])?;
        Ok(output.success())
    }

    pub fn create_network(&self, name: &str, subnet: &str, gateway: &str) -> DeployResult<()> {
        self.runner.run_checked(
            "docker",
            &[
                "network", "create", "--subnet", subnet, "--gateway", gateway, name,
            ],
        )?;
        Ok(())
    }

    /// Attach a container to a network
    pub fn connect_network(&self, network: &str, container: &str) -> DeployResult<()> {
        self.runner
            .run_checked("docker", &["network", "connect", network, container])?;
        Ok(())
    }

    /// Inspect one container; `None` if it does not exist
    pub fn inspect_container(&self, name: &str) -> DeployResult<Option<ContainerInfo>> {
        let output = self.runner.run("docker", &["inspect", name])?;
        if !output.success() {
            return Ok(None);
        }
        let raw: Vec<RawContainer> =
            serde_json::from_str(&output.stdout).map_err(|e| DeployError::Docker {
                message: format!("container inspect: {}: {}", e, output.stdout.trim()),
            })?;
        let raw = match raw.into_iter().next() {
            Some(c) => c,
            None => return Ok(None),
        };
        Ok(Some(ContainerInfo {
            name: raw.name.trim_start_matches('/').to_string(),
            running: raw.state.running,
            restarting: raw.state.restarting,
            networks: raw.network_settings.networks.into_keys().collect(),
            mounts: raw
                .mounts
                .into_iter()
                .map(|m| MountInfo {
                    source: PathBuf::from(m.source),
                    destination: PathBuf::from(m.destination),
                })
                .collect(),
        }))
    }

    /// Names of all running containers
    pub fn running_containers(&self) -> DeployResult<Vec<String>> {
        let output = self
            .runner
            .run_checked("docker", &["ps", "--format", "{{.Names}}"])?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect())
    }

    /// Run a command inside a container
    pub fn exec(&self, container: &str, cmd: &[&str]) -> DeployResult<crate::runner::CmdOutput> {
        let mut args = vec!["exec", container];
        args.extend_from_slice(cmd);
        self.runner.run("docker", &args)
    }

    /// Copy a host file into a container's private filesystem
    pub fn cp_into(&self, local: &Path, container: &str, dest: &Path) -> DeployResult<()> {
        let local = local.display().to_string();
        let target = format!("{}:{}", container, dest.display());
        self.runner
            .run_checked("docker", &["cp", &local, &target])?;
        Ok(())
    }
}
