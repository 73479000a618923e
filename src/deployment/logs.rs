//! Deployment log files.
//!
//! Besides its stdout/stderr, a deployment container may drop `*.log` files into
//! `logs/` under its state directory (one per tool invocation, typically). They are
//! returned in the order they were written.

use crate::deployment::DeploymentError;
use crate::env;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

/// A named log and its full content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log file name
    #[serde(rename = "file")]
    pub name: String,
    /// Log content
    pub content: String,
    /// Last write time of the file, if it came from one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl LogEntry {
    /// Entry for the container's own stdout/stderr.
    pub fn container(content: String) -> Self {
        Self {
            name: env::state::CONTAINER_LOG_NAME.to_string(),
            content,
            modified: None,
        }
    }
}

/// Read all `*.log` files under `<state_dir>/logs`, oldest write first.
///
/// Files with the same write time are ordered by name. A missing `logs` directory
/// yields no entries.
///
/// # Errors
///
/// Returns [`DeploymentError::LogRead`] if the directory or a log file cannot be read.
pub async fn read_deployment_logs(state_dir: &Path) -> Result<Vec<LogEntry>, DeploymentError> {
    let logs_dir = env::logs_dir_path(state_dir);

    let mut dir = match tokio::fs::read_dir(&logs_dir).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No logs directory at '{}'", logs_dir.display());
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(DeploymentError::LogRead {
                path: logs_dir,
                source,
            });
        }
    };

    let read_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| DeploymentError::LogRead { path, source }
    };

    let mut files: Vec<(SystemTime, String, PathBuf)> = Vec::new();
    while let Some(entry) = dir.next_entry().await.map_err(read_error(&logs_dir))? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(env::state::LOG_FILE_EXTENSION) {
            continue;
        }

        let metadata = entry.metadata().await.map_err(read_error(&path))?;
        if !metadata.is_file() {
            continue;
        }

        let modified = metadata.modified().map_err(read_error(&path))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        files.push((modified, name, path));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut entries = Vec::with_capacity(files.len());
    for (modified, name, path) in files {
        info!("Reading deployment log '{}'", path.display());
        let bytes = tokio::fs::read(&path).await.map_err(read_error(&path))?;
        entries.push(LogEntry {
            name,
            content: String::from_utf8_lossy(&bytes).into_owned(),
            modified: Some(DateTime::<Utc>::from(modified)),
        });
    }

    Ok(entries)
}
