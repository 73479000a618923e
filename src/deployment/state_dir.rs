//! Per-deployment state directories.
//!
//! The deployer may itself run inside a container, in which case the path it uses to
//! reach the state root differs from the path the host runtime sees. Every deployment
//! therefore gets two views of the same directory: a local one the deployer reads and
//! writes, and a host one that is bind-mounted into the deployment container.

use crate::deployment::{DeploymentError, validate_deployment_id};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The two views of a deployment's state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDirectoryPair {
    /// Path as seen by this process
    pub local: PathBuf,
    /// Path as seen by the container runtime's host
    pub host: PathBuf,
}

/// Maps deployment ids to state directories under two configured roots.
#[derive(Debug, Clone)]
pub struct StateDirectoryManager {
    local_root: PathBuf,
    host_root: PathBuf,
}

impl StateDirectoryManager {
    /// Create a manager for the given roots.
    ///
    /// Relative roots are resolved against the current directory so that the host
    /// path handed to the runtime is always absolute.
    pub fn new<L: AsRef<Path>, H: AsRef<Path>>(local_root: L, host_root: H) -> io::Result<Self> {
        Ok(Self {
            local_root: absolute(local_root.as_ref())?,
            host_root: absolute(host_root.as_ref())?,
        })
    }

    /// Root of the local view.
    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// Root of the host view.
    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    /// Local state directory for a deployment (not created).
    pub fn local_path(&self, deployment_id: &str) -> PathBuf {
        self.local_root.join(deployment_id)
    }

    /// Host state directory for a deployment (not created).
    pub fn host_path(&self, deployment_id: &str) -> PathBuf {
        self.host_root.join(deployment_id)
    }

    /// Create both state directories for a deployment if they do not exist yet.
    ///
    /// Safe to call repeatedly for the same id.
    pub async fn materialize(&self, deployment_id: &str) -> Result<StateDirectoryPair, DeploymentError> {
        validate_deployment_id(deployment_id)?;

        let pair = StateDirectoryPair {
            local: self.local_path(deployment_id),
            host: self.host_path(deployment_id),
        };

        ensure_dir(&pair.local).await?;
        if pair.host != pair.local {
            ensure_dir(&pair.host).await?;
        }

        info!(
            "State directories for deployment '{}': local '{}', host '{}'",
            deployment_id,
            pair.local.display(),
            pair.host.display()
        );

        Ok(pair)
    }
}

async fn ensure_dir(path: &Path) -> Result<(), DeploymentError> {
    match tokio::fs::create_dir_all(path).await {
        Ok(()) => {
            debug!("Ensured state directory {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(source) => Err(DeploymentError::StateDirectory {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        std::path::absolute(path)
    }
}
