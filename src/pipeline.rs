//! Deployment orchestrator
//!
//! Strictly sequential, synchronous pipeline. Each stage is named; the first
//! failure aborts the run and the report carries the failing stage plus the
//! raw diagnostic. There is no partial undo - deployment is all-or-nothing
//! from the operator's point of view.
//!
//! Stage order: load-state, resolve-topology, allocate-subnet, locate-proxy,
//! ensure-network, ensure-proxy, apply-config, validate-connectivity,
//! persist-plan. Probing stages run before mutating ones, so configuration
//! errors leave the host untouched.

use std::path::PathBuf;

use thiserror::Error;

use crate::apply::ConfigApplier;
use crate::backend::BackendSpec;
use crate::config::Config;
use crate::connectivity::{self, ConnectivityReport};
use crate::docker::Docker;
use crate::error::{DeployError, DeployResult};
use crate::plan::{DeploymentPlan, State};
use crate::proxy::{self, ReverseProxyTarget};
use crate::render;
use crate::runner::CommandRunner;
use crate::subnet::{self, SubnetLease};
use crate::topology::{self, NetworkSpec};

/// A pipeline failure, labeled with the stage that produced it
#[derive(Error, Debug)]
#[error("stage '{stage}' failed: {source}")]
pub struct PipelineFailure {
    pub stage: &'static str,
    #[source]
    pub source: DeployError,
}

fn stage<T>(name: &'static str, result: DeployResult<T>) -> Result<T, PipelineFailure> {
    result.map_err(|source| PipelineFailure {
        stage: name,
        source,
    })
}

/// Run-scoped options from the CLI
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Resolve and render, but mutate nothing
    pub dry_run: bool,
    /// Ignore persisted state and re-resolve from live inventory
    pub reset: bool,
    pub state_dir: PathBuf,
    /// Filesystem root for host-side probing; "/" outside tests
    pub host_root: PathBuf,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            reset: false,
            state_dir: PathBuf::from("/opt/notes"),
            host_root: PathBuf::from("/"),
        }
    }
}

/// Outcome of a completed (or dry) run
#[derive(Debug)]
pub struct RunOutcome {
    pub plan: DeploymentPlan,
    /// None on a dry run
    pub connectivity: Option<ConnectivityReport>,
}

/// Detection-only report: what a run would adopt, with nothing mutated
#[derive(Debug)]
pub struct Detection {
    pub network: NetworkSpec,
    /// The subnet an owned network would get, when one would be created
    pub subnet_preview: Option<SubnetLease>,
    pub proxy: ReverseProxyTarget,
}

/// Owns the stage sequence and the plan's lifecycle
pub struct Orchestrator<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a Config,
    options: PipelineOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a Config, options: PipelineOptions) -> Self {
        Self {
            runner,
            config,
            options,
        }
    }

    /// Full deployment run
    pub fn apply(&self) -> Result<RunOutcome, PipelineFailure> {
        let docker = Docker::new(self.runner);

        let prior = if self.options.reset {
            State::default()
        } else {
            stage("load-state", State::load(&self.options.state_dir))?
        };

        let mut network = stage(
            "resolve-topology",
            topology::resolve(&docker, &self.config.network, prior.network.clone()),
        )?;

        if network.owned() && network.subnet.is_none() {
            let lease = stage("allocate-subnet", self.allocate(&docker))?;
            network.subnet = Some(lease.subnet);
            network.gateway = Some(lease.gateway);
        }

        // Probing and config validation happen before any mutation, so a
        // configuration error leaves the host untouched.
        let (proxy_target, backend) = stage(
            "locate-proxy",
            self.locate_proxy(&docker, prior.proxy.clone(), prior.backend.clone()),
        )?;

        if !self.options.dry_run && network.owned() {
            stage("ensure-network", self.ensure_network(&docker, &network))?;
        }

        let rendered = render::render(&backend);
        let mut plan = DeploymentPlan::new(network, proxy_target, backend, rendered);

        if self.options.dry_run {
            return Ok(RunOutcome {
                plan,
                connectivity: None,
            });
        }

        stage("ensure-proxy", self.ensure_proxy(&plan))?;

        let applier = ConfigApplier::new(self.runner);
        stage(
            "apply-config",
            applier.apply(&plan.proxy, &plan.rendered_config),
        )?;
        plan.mark_applied();

        let report = stage(
            "validate-connectivity",
            connectivity::validate(self.runner, &plan.network, &plan.proxy, &plan.backend),
        )?;

        stage(
            "persist-plan",
            State::record(&plan).save(&self.options.state_dir),
        )?;

        Ok(RunOutcome {
            plan,
            connectivity: Some(report),
        })
    }

    /// Detection-only mode: topology, allocation preview, and proxy probe,
    /// straight from live inventory, mutating nothing
    pub fn detect(&self) -> Result<Detection, PipelineFailure> {
        let docker = Docker::new(self.runner);

        let network = stage(
            "resolve-topology",
            topology::resolve(&docker, &self.config.network, None),
        )?;

        let subnet_preview = if network.owned() {
            Some(stage("allocate-subnet", self.allocate(&docker))?)
        } else {
            None
        };

        let (proxy_target, _) = stage("locate-proxy", self.locate_proxy(&docker, None, None))?;

        Ok(Detection {
            network,
            subnet_preview,
            proxy: proxy_target,
        })
    }

    fn allocate(&self, docker: &Docker) -> DeployResult<SubnetLease> {
        let names = docker.all_networks()?;
        let assigned = docker.network_subnets(&names)?;
        subnet::allocate(&assigned)
    }

    fn ensure_network(&self, docker: &Docker, network: &NetworkSpec) -> DeployResult<()> {
        if docker.network_exists(&network.name)? {
            return Ok(());
        }
        let (subnet, gateway) = match (&network.subnet, &network.gateway) {
            (Some(s), Some(g)) => (s.as_str(), g.as_str()),
            _ => {
                return Err(DeployError::Docker {
                    message: format!("owned network '{}' has no subnet", network.name),
                })
            }
        };
        docker.create_network(&network.name, subnet, gateway)
    }

    /// Start a self-provisioned proxy if needed, then make sure an adopted
    /// containerized proxy is attached to the target network
    fn ensure_proxy(&self, plan: &DeploymentPlan) -> DeployResult<()> {
        proxy::ensure_self_provisioned(self.runner, &plan.proxy, &plan.network.name)?;
        proxy::ensure_attached(self.runner, &plan.proxy, &plan.network.name)
    }

    /// Locate the proxy, then derive backend addressing from the hosting kind
    ///
    /// Containerized proxies talk to backends by container name over the
    /// shared network; host-managed nginx goes through loopback-published
    /// ports. A previously persisted backend spec is reused verbatim, like
    /// the network and proxy fields.
    fn locate_proxy(
        &self,
        docker: &Docker,
        prior: Option<ReverseProxyTarget>,
        prior_backend: Option<BackendSpec>,
    ) -> DeployResult<(ReverseProxyTarget, BackendSpec)> {
        // Domain is needed for the site file name, so the missing-domain
        // configuration error surfaces here, before anything is mutated
        // by the apply stages.
        let probe_spec = BackendSpec::from_config(self.config, true)?;
        let site_file = probe_spec.site_file_name();

        let target = proxy::locate(
            docker,
            self.runner,
            &self.options.host_root,
            &self.options.state_dir,
            &site_file,
            prior,
        )?;
        let backend = match prior_backend {
            Some(backend) => backend,
            None => {
                let shared = target.hosting.container().is_some();
                BackendSpec::from_config(self.config, shared)?
            }
        };
        Ok((target, backend))
    }
}
