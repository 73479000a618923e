//! # Deployments
//!
//! A deployment is one run of a template image in an ephemeral container. There is no
//! database: a deployment exists exactly as long as a container labelled with its id
//! exists, and its logs and outputs live in its state directory.
//!
//! ## Core Components
//!
//! - **[`Deployer`]**: runs a deployment end to end and classifies the outcome
//! - **[`DeploymentRepository`]**: reconstructs deployments from container labels
//! - **[`StateDirectoryManager`]**: local/host state directory pairs
//! - **[`codec`]**: `tfvars.json` in, `terraform.output.json` out
//! - **[`logs`]**: log files the container drops into `logs/`
//!
//! ## Deployment Flow
//!
//! ```text
//! deploy(id, image, params)
//!        ↓
//!   state directories  →  tfvars.json
//!        ↓
//!   resolve image  →  create (labels, bind mount)  →  start
//!        ↓
//!   wait for completion (polling | events)
//!        ↓
//!   container log + logs/*.log + outputs
//!        ↓
//!   remove container  →  DeployResult
//! ```

use crate::container::ContainerError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;

pub mod codec;
pub mod logs;
pub mod orchestrator;
pub mod repository;
pub mod state_dir;

pub use codec::{OutputValue, Outputs, read_outputs, write_parameters};
pub use logs::{LogEntry, read_deployment_logs};
pub use orchestrator::Deployer;
pub use repository::DeploymentRepository;
pub use state_dir::{StateDirectoryManager, StateDirectoryPair};

/// Template parameters as written to `tfvars.json`.
pub type Parameters = std::collections::BTreeMap<String, String>;

/// Errors raised while running or reconstructing a deployment.
#[derive(Debug, thiserror::Error)]
pub enum DeploymentError {
    /// Deployment id cannot be used as a container name or directory name
    #[error("Invalid deployment id '{0}'")]
    InvalidDeploymentId(String),

    /// Template image reference is empty
    #[error("Must supply a valid template image name")]
    InvalidImage,

    /// State directory could not be created or accessed
    #[error("State directory error for {path}: {source}")]
    StateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Parameters file could not be written
    #[error("Failed to write parameters to {path}: {source}")]
    Parameters {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Outputs file exists but is not valid JSON
    #[error("Malformed outputs file {path}: {source}")]
    MalformedOutputs {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A log file could not be read
    #[error("Failed to read deployment log {path}: {source}")]
    LogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Container runtime failure
    #[error(transparent)]
    Container(#[from] ContainerError),
}

static DEPLOYMENT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("deployment id pattern is valid")
});

/// Check that a deployment id is usable as a container name suffix and as a single
/// path component.
pub fn validate_deployment_id(deployment_id: &str) -> Result<(), DeploymentError> {
    if DEPLOYMENT_ID.is_match(deployment_id) {
        Ok(())
    } else {
        Err(DeploymentError::InvalidDeploymentId(deployment_id.to_string()))
    }
}

/// Generate a fresh deployment id.
pub fn generate_deployment_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// State of a deployment, derived from its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentState {
    /// Container status not recognized
    Unknown,
    /// Container is running
    Running,
    /// Container exited with code 0
    Successful,
    /// Container exited with a non-zero code (or died)
    Failed,
}

impl DeploymentState {
    /// Whether the deployment has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }
}

/// A deployment as reconstructed from the runtime and its state directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Deployment id
    pub id: String,
    /// Current state
    pub state: DeploymentState,
    /// Backing container
    pub container_id: String,
    /// Image tag the deployment was started from
    pub image_tag: Option<String>,
    /// Log files, oldest first, followed by the container log
    pub logs: Vec<LogEntry>,
    /// Outputs written by the deployment (empty while running)
    pub outputs: Outputs,
}

/// How a deployment run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DeployOutcome {
    /// Container exited with code 0 and its outputs were read
    Succeeded,
    /// Container exited with a non-zero (or unknown) code
    Failed { exit_code: Option<i64> },
    /// No local image carries the requested tag
    ImageNotFound { image: String },
    /// Template id is not in the catalog
    TemplateNotFound { template_id: u32 },
    /// Container could not be created or started
    RuntimeError { message: String },
    /// Container did not terminate within the configured timeout
    TimedOut,
    /// Deployment was cancelled by the caller
    Cancelled,
    /// Unexpected failure while preparing or collecting the deployment
    Error { message: String },
}

/// Result of a deployment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    /// Deployment id
    pub deployment_id: String,
    /// True only if the container ran and exited with code 0
    pub success: bool,
    /// Detailed outcome
    pub outcome: DeployOutcome,
    /// Container that ran the deployment, if one was created
    pub container_id: Option<String>,
    /// Container exit code, if it terminated
    pub exit_code: Option<i64>,
    /// Container stdout/stderr
    pub log: String,
    /// Log files written by the deployment, oldest first
    pub logs: Vec<LogEntry>,
    /// Outputs written by the deployment
    pub outputs: Outputs,
    /// When the deployment started
    pub started_at: DateTime<Utc>,
    /// When the result was produced
    pub finished_at: DateTime<Utc>,
}

impl DeployResult {
    /// Create a failed result with nothing collected.
    pub fn failed(deployment_id: &str, outcome: DeployOutcome, started_at: DateTime<Utc>) -> Self {
        Self {
            deployment_id: deployment_id.to_string(),
            success: false,
            outcome,
            container_id: None,
            exit_code: None,
            log: String::new(),
            logs: Vec::new(),
            outputs: Outputs::default(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// All logs as entries: log files first, then the container log.
    pub fn log_entries(&self) -> Vec<LogEntry> {
        let mut entries = self.logs.clone();
        if !self.log.is_empty() {
            entries.push(LogEntry::container(self.log.clone()));
        }
        entries
    }
}
