//! Reverse proxy discovery
//!
//! Probes the host for an existing nginx instance, in fixed priority order:
//! a running container first, then a systemd unit, then a bare process.
//! Finding nothing selects self-provisioning. Hosting is a closed enum so
//! every later stage dispatches on the variant, never on a string tag.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::docker::Docker;
use crate::error::{DeployError, DeployResult};
use crate::runner::CommandRunner;

/// Per-site config directory inside an nginx container
pub const CONTAINER_CONF_D: &str = "/etc/nginx/conf.d";
/// Root nginx config directory inside a container
pub const CONTAINER_NGINX_ROOT: &str = "/etc/nginx";

/// How the reverse proxy is currently being run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProxyHosting {
    /// Running in a container we can exec into
    Docker { container: String },
    /// Managed as an OS service
    Systemd,
    /// Bare nginx process, no supervisor
    Standalone,
    /// Nothing found - this tool will provision its own instance
    SelfProvisioned { container: String },
}

impl ProxyHosting {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Docker { .. } => "docker",
            Self::Systemd => "systemd",
            Self::Standalone => "standalone",
            Self::SelfProvisioned { .. } => "self-provisioned",
        }
    }

    /// The container to exec into, when hosting is containerized
    pub fn container(&self) -> Option<&str> {
        match self {
            Self::Docker { container } | Self::SelfProvisioned { container } => Some(container),
            _ => None,
        }
    }
}

/// How rendered config reaches the proxy's effective configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStrategy {
    /// Write to a host path the proxy sees through a mount (or directly)
    VolumeMounted,
    /// Copy into the running container's private filesystem
    DirectInjection,
}

/// Where and how the rendered site config lands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseProxyTarget {
    pub hosting: ProxyHosting,
    /// Full path of the site config file at its destination
    pub config_destination: PathBuf,
    pub delivery: DeliveryStrategy,
}

/// Name given to a self-provisioned proxy container
pub const SELF_PROVISIONED_CONTAINER: &str = "notes-proxy";

/// Locate the reverse proxy instance fronting this deployment
///
/// `host_root` is the filesystem root for host-side directory probing
/// (always `/` outside tests). `state_dir` anchors the config tree of a
/// self-provisioned instance. A persisted target is reused verbatim.
pub fn locate(
    docker: &Docker,
    runner: &dyn CommandRunner,
    host_root: &Path,
    state_dir: &Path,
    site_file: &str,
    prior: Option<ReverseProxyTarget>,
) -> DeployResult<ReverseProxyTarget> {
    if let Some(prior) = prior {
        return Ok(prior);
    }

    if let Some(container) = find_proxy_container(docker)? {
        return locate_in_container(docker, &container, site_file);
    }

    let systemd = runner.run("systemctl", &["is-active", "--quiet", "nginx"])?;
    if systemd.success() {
        let dir = host_config_dir(host_root, "systemd")?;
        return Ok(ReverseProxyTarget {
            hosting: ProxyHosting::Systemd,
            config_destination: dir.join(site_file),
            delivery: DeliveryStrategy::VolumeMounted,
        });
    }

    let bare = runner.run("pidof", &["nginx"])?;
    if bare.success() {
        let dir = host_config_dir(host_root, "standalone")?;
        return Ok(ReverseProxyTarget {
            hosting: ProxyHosting::Standalone,
            config_destination: dir.join(site_file),
            delivery: DeliveryStrategy::VolumeMounted,
        });
    }

    // Nothing to adopt: plan a container of our own, configured from a
    // host directory we control.
    Ok(ReverseProxyTarget {
        hosting: ProxyHosting::SelfProvisioned {
            container: SELF_PROVISIONED_CONTAINER.to_string(),
        },
        config_destination: state_dir.join("nginx/conf.d").join(site_file),
        delivery: DeliveryStrategy::VolumeMounted,
    })
}

/// Start the self-provisioned proxy container if it is not already up
///
/// Assumes the nginx image is present locally (image provisioning is an
/// external collaborator). Adopted proxies and host-managed nginx are left
/// untouched.
pub fn ensure_self_provisioned(
    runner: &dyn CommandRunner,
    target: &ReverseProxyTarget,
    network: &str,
) -> DeployResult<()> {
    let ProxyHosting::SelfProvisioned { container } = &target.hosting else {
        return Ok(());
    };

    let docker = Docker::new(runner);
    if let Some(info) = docker.inspect_container(container)? {
        if !info.running {
            runner.run_checked("docker", &["start", container])?;
        }
        return Ok(());
    }

    let conf_dir = target
        .config_destination
        .parent()
        .ok_or_else(|| DeployError::NoConfigDestination {
            hosting: target.hosting.label().to_string(),
        })?;
    std::fs::create_dir_all(conf_dir)?;

    let conf_mount = format!("{}:{}:ro", conf_dir.display(), CONTAINER_CONF_D);
    runner.run_checked(
        "docker",
        &[
            "run",
            "-d",
            "--name",
            container,
            "--network",
            network,
            "--restart",
            "unless-stopped",
            "-p",
            "80:80",
            "-p",
            "443:443",
            "-v",
            &conf_mount,
            "-v",
            "/etc/letsencrypt:/etc/letsencrypt:ro",
            "nginx:alpine",
        ],
    )?;
    Ok(())
}

/// Connect an adopted proxy container to the target network if it is not
/// already a member
///
/// Self-provisioned containers are created attached; host-managed nginx
/// reaches backends through published ports and never joins the network.
pub fn ensure_attached(
    runner: &dyn CommandRunner,
    target: &ReverseProxyTarget,
    network: &str,
) -> DeployResult<()> {
    let ProxyHosting::Docker { container } = &target.hosting else {
        return Ok(());
    };

    let docker = Docker::new(runner);
    let info = docker
        .inspect_container(container)?
        .ok_or_else(|| DeployError::Docker {
            message: format!("proxy container '{}' not found", container),
        })?;
    if info.is_on_network(network) {
        return Ok(());
    }
    docker.connect_network(network, container)
}

/// First running container whose name follows the proxy naming convention
fn find_proxy_container(docker: &Docker) -> DeployResult<Option<String>> {
    let running = docker.running_containers()?;
    Ok(running
        .into_iter()
        .find(|name| name.contains("nginx") || name.contains("proxy")))
}

/// Resolve delivery for a containerized proxy from its mounts
///
/// Prefers a mount of the per-site directory, then of the nginx root. With
/// no usable mount the only route left is direct injection into the
/// container's own filesystem.
fn locate_in_container(
    docker: &Docker,
    container: &str,
    site_file: &str,
) -> DeployResult<ReverseProxyTarget> {
    let info = docker
        .inspect_container(container)?
        .ok_or_else(|| DeployError::Docker {
            message: format!("container '{}' disappeared during probe", container),
        })?;

    if let Some(mount) = info.mount_at(Path::new(CONTAINER_CONF_D)) {
        return Ok(ReverseProxyTarget {
            hosting: ProxyHosting::Docker {
                container: container.to_string(),
            },
            config_destination: mount.source.join(site_file),
            delivery: DeliveryStrategy::VolumeMounted,
        });
    }
    if let Some(mount) = info.mount_at(Path::new(CONTAINER_NGINX_ROOT)) {
        return Ok(ReverseProxyTarget {
            hosting: ProxyHosting::Docker {
                container: container.to_string(),
            },
            config_destination: mount.source.join("conf.d").join(site_file),
            delivery: DeliveryStrategy::VolumeMounted,
        });
    }

    Ok(ReverseProxyTarget {
        hosting: ProxyHosting::Docker {
            container: container.to_string(),
        },
        config_destination: Path::new(CONTAINER_CONF_D).join(site_file),
        delivery: DeliveryStrategy::DirectInjection,
    })
}

/// Host-side config directory, preferring the per-site convention
fn host_config_dir(root: &Path, hosting: &str) -> DeployResult<PathBuf> {
    let conf_d = root.join("etc/nginx/conf.d");
    if conf_d.is_dir() {
        return Ok(conf_d);
    }
    let sites = root.join("etc/nginx/sites-enabled");
    if sites.is_dir() {
        return Ok(sites);
    }
    Err(DeployError::NoConfigDestination {
        hosting: hosting.to_string(),
    })
}
