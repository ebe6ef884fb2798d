//! Deployment plan and persisted state
//!
//! A `DeploymentPlan` is built fresh on every run and passed by reference
//! through the pipeline; the orchestrator persists its resolved fields in one
//! discrete serialization step at the end. Re-runs load the saved fields so
//! topology and proxy resolution are reused verbatim unless reset.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::backend::BackendSpec;
use crate::error::{DeployError, DeployResult};
use crate::proxy::ReverseProxyTarget;
use crate::topology::NetworkSpec;

/// Bumped when the persisted layout changes shape
pub const PLAN_VERSION: u32 = 1;

const STATE_FILE: &str = "state.json";

/// Everything one run resolved and applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub version: u32,
    pub network: NetworkSpec,
    pub proxy: ReverseProxyTarget,
    pub backend: BackendSpec,
    pub rendered_config: String,
    pub rendered_sha256: String,
    pub applied_at: Option<DateTime<Utc>>,
}

impl DeploymentPlan {
    pub fn new(
        network: NetworkSpec,
        proxy: ReverseProxyTarget,
        backend: BackendSpec,
        rendered_config: String,
    ) -> Self {
        let rendered_sha256 = hash_content(&rendered_config);
        Self {
            version: PLAN_VERSION,
            network,
            proxy,
            backend,
            rendered_config,
            rendered_sha256,
            applied_at: None,
        }
    }

    pub fn mark_applied(&mut self) {
        self.applied_at = Some(Utc::now());
    }
}

/// SHA-256 of config content, prefixed like every other hash in the state file
pub fn hash_content(content: &str) -> String {
    let hash = Sha256::digest(content.as_bytes());
    format!("sha256:{:x}", hash)
}

/// Resolved fields persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct State {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub network: Option<NetworkSpec>,
    #[serde(default)]
    pub proxy: Option<ReverseProxyTarget>,
    #[serde(default)]
    pub backend: Option<BackendSpec>,
    #[serde(default)]
    pub rendered_sha256: Option<String>,
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
}

impl State {
    fn path(state_dir: &Path) -> PathBuf {
        state_dir.join(STATE_FILE)
    }

    /// Load persisted state; a missing file is a clean slate, a corrupt one
    /// is an error the operator has to see
    pub fn load(state_dir: &Path) -> DeployResult<Self> {
        let path = Self::path(state_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| DeployError::CorruptState {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// One discrete serialization step - the only place state is written
    pub fn save(&self, state_dir: &Path) -> DeployResult<()> {
        std::fs::create_dir_all(state_dir)?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::path(state_dir), content)?;
        Ok(())
    }

    pub fn record(plan: &DeploymentPlan) -> Self {
        Self {
            version: plan.version,
            network: Some(plan.network.clone()),
            proxy: Some(plan.proxy.clone()),
            backend: Some(plan.backend.clone()),
            rendered_sha256: Some(plan.rendered_sha256.clone()),
            applied_at: plan.applied_at,
        }
    }
}
