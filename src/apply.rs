//! Config delivery, validation, and reload
//!
//! Stage 1: deliver rendered text to the destination (host write or copy
//! into the container). Stage 2: run the proxy's own syntax check, scoped to
//! the hosting kind. Stage 3: reload, only after the check passed.
//!
//! The destination is overwritten before validation runs, so a failed check
//! leaves the new file in place; host-side writes are at least atomic
//! (temp file + rename), so no reader ever sees a half-written config.

use std::path::Path;
use std::time::Duration;

use crate::docker::Docker;
use crate::error::{DeployError, DeployResult};
use crate::proxy::{DeliveryStrategy, ProxyHosting, ReverseProxyTarget};
use crate::runner::CommandRunner;

/// Observed stabilization state of a supervised proxy container
///
/// Explicit finite-state machine for the restart wait: a container under
/// restart supervision may be cycling when we probe it, and we give it a
/// bounded number of checks to settle before declaring it stuck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Stable,
    Restarting,
    StuckRestarting,
}

impl ProxyState {
    /// One transition, driven by an observation and the attempt counter
    pub fn step(self, observed_restarting: bool, attempt: u32, ceiling: u32) -> ProxyState {
        match self {
            ProxyState::StuckRestarting => ProxyState::StuckRestarting,
            _ if !observed_restarting => ProxyState::Stable,
            _ if attempt >= ceiling => ProxyState::StuckRestarting,
            _ => ProxyState::Restarting,
        }
    }
}

/// Applies rendered configuration to the located proxy
pub struct ConfigApplier<'a> {
    runner: &'a dyn CommandRunner,
    /// Sleep between restart-stabilization probes
    pub poll_interval: Duration,
    /// Probe ceiling before a restarting container is a hard failure
    pub max_attempts: u32,
}

impl<'a> ConfigApplier<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            poll_interval: Duration::from_secs(2),
            max_attempts: 15,
        }
    }

    /// Deliver, validate, reload - halting on the first failure
    pub fn apply(&self, target: &ReverseProxyTarget, rendered: &str) -> DeployResult<()> {
        if let Some(container) = target.hosting.container() {
            self.wait_until_stable(container)?;
        }
        self.deliver(target, rendered)?;
        self.validate(target)?;
        self.reload(target)
    }

    /// Bounded poll until the container is no longer restarting
    fn wait_until_stable(&self, container: &str) -> DeployResult<()> {
        let docker = Docker::new(self.runner);
        let mut state = ProxyState::Restarting;
        for attempt in 1..=self.max_attempts {
            let info = docker
                .inspect_container(container)?
                .ok_or_else(|| DeployError::Docker {
                    message: format!("proxy container '{}' not found", container),
                })?;
            state = state.step(info.restarting, attempt, self.max_attempts);
            match state {
                ProxyState::Stable => return Ok(()),
                ProxyState::StuckRestarting => break,
                ProxyState::Restarting => std::thread::sleep(self.poll_interval),
            }
        }
        Err(DeployError::RestartCeiling {
            container: container.to_string(),
            attempts: self.max_attempts,
        })
    }

    fn deliver(&self, target: &ReverseProxyTarget, rendered: &str) -> DeployResult<()> {
        match target.delivery {
            DeliveryStrategy::VolumeMounted => {
                write_host_config(&target.config_destination, rendered)
            }
            DeliveryStrategy::DirectInjection => {
                let container =
                    target
                        .hosting
                        .container()
                        .ok_or_else(|| DeployError::NoConfigDestination {
                            hosting: target.hosting.label().to_string(),
                        })?;
                let staged = tempfile::NamedTempFile::new()?;
                std::fs::write(staged.path(), rendered)?;
                Docker::new(self.runner).cp_into(
                    staged.path(),
                    container,
                    &target.config_destination,
                )
            }
        }
    }

    /// Run `nginx -t` where the proxy actually lives
    fn validate(&self, target: &ReverseProxyTarget) -> DeployResult<()> {
        let output = match target.hosting.container() {
            Some(container) => Docker::new(self.runner).exec(container, &["nginx", "-t"])?,
            None => self.runner.run("nginx", &["-t"])?,
        };
        if output.success() {
            Ok(())
        } else {
            // Surface the validator's own words, untouched
            Err(DeployError::ValidationFailed {
                output: output.diagnostic().to_string(),
            })
        }
    }

    fn reload(&self, target: &ReverseProxyTarget) -> DeployResult<()> {
        match &target.hosting {
            ProxyHosting::Docker { container }
            | ProxyHosting::SelfProvisioned { container } => {
                self.runner
                    .run_checked("docker", &["exec", container, "nginx", "-s", "reload"])?;
            }
            ProxyHosting::Systemd => {
                self.runner.run_checked("systemctl", &["reload", "nginx"])?;
            }
            ProxyHosting::Standalone => {
                self.runner.run_checked("nginx", &["-s", "reload"])?;
            }
        }
        Ok(())
    }
}

/// Atomic host-side write with conventional config permissions
fn write_host_config(dest: &Path, content: &str) -> DeployResult<()> {
    let parent = dest.parent().ok_or_else(|| DeployError::NoConfigDestination {
        hosting: "host".to_string(),
    })?;
    std::fs::create_dir_all(parent)?;
    let staged = tempfile::NamedTempFile::new_in(parent)?;
    std::fs::write(staged.path(), content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(staged.path(), std::fs::Permissions::from_mode(0o644))?;
    }
    staged
        .persist(dest)
        .map_err(|e| DeployError::Io(e.error))?;
    Ok(())
}
