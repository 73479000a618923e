//! Runtime-neutral container API.
//!
//! [`ContainerRuntime`] is the boundary the deployer consumes: list images, create,
//! start, inspect, read logs, remove, list by label and watch events. It carries no
//! policy of its own.

use crate::container::{ContainerConfig, ImageInfo, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Typed façade over a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List images known to the runtime.
    async fn list_images(&self) -> Result<Vec<ImageInfo>>;

    /// Create (but do not start) a container, returning its id.
    async fn create_container(&self, config: &ContainerConfig) -> Result<String>;

    /// Start a created container.
    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Inspect a container's current state.
    async fn inspect_container(&self, container_id: &str) -> Result<ContainerInspection>;

    /// Read the complete stdout/stderr log of a container without following it.
    async fn container_logs(&self, container_id: &str) -> Result<String>;

    /// Remove a container.
    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()>;

    /// List containers, including stopped ones, matching a label filter.
    async fn list_containers(&self, filter: &LabelFilter) -> Result<Vec<ContainerSummary>>;

    /// Stream lifecycle events for a single container, starting with those emitted at
    /// or after `since`.
    ///
    /// Events already emitted when the stream is first polled are replayed. Dropping the
    /// stream closes the underlying connection.
    fn container_events<'a>(
        &'a self,
        container_id: &str,
        since: DateTime<Utc>,
    ) -> BoxStream<'a, Result<RuntimeEvent>>;
}

/// Container status as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created but never started
    Created,
    /// Container is running
    Running,
    /// Container is paused
    Paused,
    /// Container is restarting
    Restarting,
    /// Container is being removed
    Removing,
    /// Container process has exited
    Exited,
    /// Container is dead
    Dead,
    /// Anything the runtime reports that we do not recognize
    Unknown(String),
}

impl ContainerStatus {
    /// Parse the runtime's status string (`"running"`, `"exited"`, ...).
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown(status.to_string()),
        }
    }

    /// Whether the container process has stopped for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::Dead)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Restarting => write!(f, "restarting"),
            Self::Removing => write!(f, "removing"),
            Self::Exited => write!(f, "exited"),
            Self::Dead => write!(f, "dead"),
            Self::Unknown(status) => write!(f, "{}", status),
        }
    }
}

/// Result of inspecting a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInspection {
    /// Container ID
    pub id: String,
    /// Current status
    pub status: ContainerStatus,
    /// Exit code, once the container has exited
    pub exit_code: Option<i64>,
}

/// Container listing entry.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    /// Container ID
    pub id: String,
    /// Container labels
    pub labels: HashMap<String, String>,
    /// Container state
    pub state: ContainerStatus,
    /// Exit code recovered from the status text (`Exited (1) 2 hours ago`), if present
    pub exit_code: Option<i64>,
}

impl ContainerSummary {
    /// Get a label value.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

static EXIT_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Exit(?:ed)?\s*\(?(-?\d+)\)?").expect("exit status pattern is valid")
});

/// Extract the exit code from a runtime status text such as `Exited (1) 2 hours ago`.
pub fn parse_exit_code(status: &str) -> Option<i64> {
    EXIT_STATUS
        .captures(status)
        .and_then(|caps| caps.get(1))
        .and_then(|code| code.as_str().parse().ok())
}

/// Lifecycle event emitted by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    /// Event action (`create`, `start`, `die`, `destroy`, ...)
    pub action: String,
}

impl RuntimeEvent {
    /// Whether this event marks the end of the container process.
    pub fn is_die(&self) -> bool {
        self.action == "die"
    }
}

/// Label query used for container listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelFilter {
    /// Containers carrying the label with any value
    Present(String),
    /// Containers carrying the label with exactly this value
    Equals(String, String),
}

impl LabelFilter {
    /// Filter on label presence.
    pub fn present<K: Into<String>>(key: K) -> Self {
        Self::Present(key.into())
    }

    /// Filter on an exact label value.
    pub fn equals<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self::Equals(key.into(), value.into())
    }

    /// Render as a runtime `label` filter value (`key` or `key=value`).
    pub fn to_filter_value(&self) -> String {
        match self {
            Self::Present(key) => key.clone(),
            Self::Equals(key, value) => format!("{}={}", key, value),
        }
    }

    /// Check a label set against this filter.
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        match self {
            Self::Present(key) => labels.contains_key(key),
            Self::Equals(key, value) => labels.get(key) == Some(value),
        }
    }
}
