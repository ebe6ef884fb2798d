//! Error types for notesctl
//!
//! Uses `thiserror` for library errors. The binary layer wraps these in
//! `anyhow` for reporting.

use thiserror::Error;

/// Result type alias for notesctl operations
pub type DeployResult<T> = Result<T, DeployError>;

/// Main error type for notesctl operations
#[derive(Error, Debug)]
pub enum DeployError {
    /// No service domain configured - nothing can be rendered without one
    #[error("no domain configured - set 'domain' in notesctl.toml")]
    MissingDomain,

    /// Two backends configured with path prefixes that shadow each other
    #[error("path prefix '{relay}' overlaps '{db}' - requests under one would be captured by the other")]
    OverlappingPrefixes { db: String, relay: String },

    /// All reserved subnet candidates are already assigned on this host
    #[error("all {candidates} reserved /16 subnets are already in use on this host")]
    SubnetExhausted { candidates: usize },

    /// Custom network mode named a network that does not exist
    #[error("network '{name}' not found and network.create is not set")]
    NetworkNotFound { name: String },

    /// No usable config directory could be found for the reverse proxy
    #[error("no writable nginx config directory found for {hosting}")]
    NoConfigDestination { hosting: String },

    /// The proxy rejected the rendered configuration
    #[error("nginx configuration check failed:\n{output}")]
    ValidationFailed { output: String },

    /// Proxy container never left its restart loop within the wait ceiling
    #[error("container '{container}' still restarting after {attempts} checks")]
    RestartCeiling { container: String, attempts: u32 },

    /// A running backend could not be reached from the proxy
    #[error("reachability probe from '{from}' to '{to}' failed: {detail}")]
    ReachabilityFailed {
        from: String,
        to: String,
        detail: String,
    },

    /// A container expected on the target network is not attached to it
    #[error("container '{container}' is not attached to network '{network}'")]
    NotOnNetwork { container: String, network: String },

    /// External command exited unsuccessfully
    #[error("{program} failed: {detail}")]
    CommandFailed { program: String, detail: String },

    /// External command exceeded its wait ceiling
    #[error("{program} did not complete within {seconds}s")]
    CommandTimeout { program: String, seconds: u64 },

    /// Docker output could not be interpreted
    #[error("unexpected docker output: {message}")]
    Docker { message: String },

    /// Persisted state file exists but could not be read back
    #[error("state file {path} is corrupt: {message}")]
    CorruptState { path: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
