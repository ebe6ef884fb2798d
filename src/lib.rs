//! notesctl - deployment topology and reverse-proxy reconciliation
//!
//! notesctl deploys a self-hosted note-sync stack (document database,
//! realtime relay, or both) behind an nginx reverse proxy on a docker host.
//! It resolves which container network to join, which proxy instance fronts
//! the services, renders the site configuration, and applies it behind a
//! validate-before-reload gate - all from partially-observed live host state,
//! idempotently.

pub mod apply;
pub mod backend;
pub mod config;
pub mod connectivity;
pub mod docker;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod proxy;
pub mod render;
pub mod runner;
pub mod subnet;
pub mod topology;

// Re-exports for convenience
pub use backend::{BackendKind, BackendSpec};
pub use config::Config;
pub use error::{DeployError, DeployResult};
pub use pipeline::{Detection, Orchestrator, PipelineFailure, PipelineOptions, RunOutcome};
pub use plan::{DeploymentPlan, State};
pub use proxy::{DeliveryStrategy, ProxyHosting, ReverseProxyTarget};
pub use render::render;
pub use runner::{CommandRunner, HostRunner};
pub use subnet::{allocate, SubnetLease, RESERVED_BLOCKS};
pub use topology::{NetworkMode, NetworkSpec};
