//! Label-based deployment lookup.
//!
//! The container runtime is the system of record. Listing deployments is a container
//! listing filtered on the `deployment.id` label; fetching one deployment filters on
//! the label's value. Nothing is cached, so every read reflects the runtime as it is.
//!
//! Only a single-deployment fetch downloads the container's own log; listings carry
//! the state directory's log files alone.

use crate::container::{ContainerRuntime, ContainerStatus, ContainerSummary, LabelFilter};
use crate::deployment::{
    Deployment, DeploymentError, DeploymentState, LogEntry, Outputs, StateDirectoryManager,
    read_deployment_logs, read_outputs, validate_deployment_id,
};
use crate::env::labels;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reconstructs deployments from the runtime's labelled containers.
#[derive(Clone)]
pub struct DeploymentRepository {
    runtime: Arc<dyn ContainerRuntime>,
    state_dirs: StateDirectoryManager,
}

impl DeploymentRepository {
    /// Create a repository over a runtime and state directory layout.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, state_dirs: StateDirectoryManager) -> Self {
        Self {
            runtime,
            state_dirs,
        }
    }

    /// List every deployment that still has a container.
    ///
    /// # Errors
    ///
    /// Returns error if the container listing fails.
    pub async fn list(&self) -> Result<Vec<Deployment>, DeploymentError> {
        info!("Retrieving all deployments...");

        let containers = self
            .runtime
            .list_containers(&LabelFilter::present(labels::DEPLOYMENT_ID))
            .await?;

        let mut deployments = Vec::with_capacity(containers.len());
        for container in &containers {
            deployments.push(self.to_deployment(container, false).await);
        }

        info!("Retrieved {} deployments", deployments.len());
        Ok(deployments)
    }

    /// Fetch a single deployment by id.
    ///
    /// Returns `Ok(None)` when no container carries the id.
    ///
    /// # Errors
    ///
    /// Returns error if the container listing fails.
    pub async fn get(&self, deployment_id: &str) -> Result<Option<Deployment>, DeploymentError> {
        info!("Retrieving deployment '{}'...", deployment_id);

        let containers = self
            .runtime
            .list_containers(&LabelFilter::equals(labels::DEPLOYMENT_ID, deployment_id))
            .await?;

        // Runtimes that ignore the value part of a label filter still return a
        // superset; keep only exact matches.
        let mut matching = containers
            .iter()
            .filter(|c| c.label(labels::DEPLOYMENT_ID) == Some(deployment_id));

        let Some(container) = matching.next() else {
            info!("Deployment '{}' not found", deployment_id);
            return Ok(None);
        };

        let extra = matching.count();
        if extra > 0 {
            warn!(
                "Deployment '{}' has {} additional containers; using {}",
                deployment_id, extra, container.id
            );
        }

        let deployment = self.to_deployment(container, true).await;
        info!("Retrieved deployment '{}'", deployment_id);
        Ok(Some(deployment))
    }

    async fn to_deployment(
        &self,
        container: &ContainerSummary,
        include_container_log: bool,
    ) -> Deployment {
        let deployment_id = container
            .label(labels::DEPLOYMENT_ID)
            .unwrap_or_default()
            .to_string();

        let exit_code = match (&container.state, container.exit_code) {
            (ContainerStatus::Exited, None) => self.recover_exit_code(&container.id).await,
            (_, code) => code,
        };

        let state = classify(&container.state, exit_code);
        if state == DeploymentState::Unknown {
            warn!(
                "Unexpected container state '{}' for deployment '{}'",
                container.state, deployment_id
            );
        }

        let mut deployment = Deployment {
            id: deployment_id,
            state,
            container_id: container.id.clone(),
            image_tag: container.label(labels::IMAGE_TAG).map(String::from),
            logs: Vec::new(),
            outputs: Outputs::default(),
        };

        if state.is_terminal() && validate_deployment_id(&deployment.id).is_ok() {
            let state_dir = self.state_dirs.local_path(&deployment.id);

            match read_deployment_logs(&state_dir).await {
                Ok(logs) => deployment.logs = logs,
                Err(e) => warn!("Failed to read logs for deployment '{}': {}", deployment.id, e),
            }

            match read_outputs(&state_dir).await {
                Ok(outputs) => deployment.outputs = outputs,
                Err(e) => warn!("Failed to read outputs for deployment '{}': {}", deployment.id, e),
            }
        }

        if include_container_log {
            match self.runtime.container_logs(&container.id).await {
                Ok(log) => deployment.logs.push(LogEntry::container(log)),
                Err(e) => debug!("No container log for deployment '{}': {}", deployment.id, e),
            }
        }

        deployment
    }

    async fn recover_exit_code(&self, container_id: &str) -> Option<i64> {
        match self.runtime.inspect_container(container_id).await {
            Ok(inspection) => inspection.exit_code,
            Err(e) => {
                warn!("Failed to inspect container {}: {}", container_id, e);
                None
            }
        }
    }
}

/// Derive a deployment state from its container's status and exit code.
pub fn classify(status: &ContainerStatus, exit_code: Option<i64>) -> DeploymentState {
    match (status, exit_code) {
        (ContainerStatus::Running, _) => DeploymentState::Running,
        (ContainerStatus::Exited, Some(0)) => DeploymentState::Successful,
        (ContainerStatus::Exited, Some(_)) => DeploymentState::Failed,
        (ContainerStatus::Dead, _) => DeploymentState::Failed,
        _ => DeploymentState::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(&ContainerStatus::Running, None), DeploymentState::Running);
        assert_eq!(classify(&ContainerStatus::Exited, Some(0)), DeploymentState::Successful);
        assert_eq!(classify(&ContainerStatus::Exited, Some(1)), DeploymentState::Failed);
        assert_eq!(classify(&ContainerStatus::Exited, Some(-1)), DeploymentState::Failed);
        assert_eq!(classify(&ContainerStatus::Dead, None), DeploymentState::Failed);
    }

    #[test]
    fn test_classify_unrecognized_is_unknown() {
        assert_eq!(classify(&ContainerStatus::Exited, None), DeploymentState::Unknown);
        assert_eq!(classify(&ContainerStatus::Created, None), DeploymentState::Unknown);
        assert_eq!(classify(&ContainerStatus::Paused, None), DeploymentState::Unknown);
        assert_eq!(
            classify(&ContainerStatus::Unknown("weird".to_string()), Some(0)),
            DeploymentState::Unknown
        );
    }
}
