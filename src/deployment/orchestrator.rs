//! Deployment lifecycle.
//!
//! [`Deployer::deploy`] runs one deployment to completion: it stages parameters in the
//! state directory, starts a labelled container from the template image, waits for it
//! to stop, gathers its logs and outputs, removes it and reports the outcome. Runtime
//! failures never escape as errors; they come back as a failed [`DeployResult`].
//!
//! Cleanup rules:
//! - the container is removed only after termination was observed and everything the
//!   container wrote has been read;
//! - a timed-out container is left in place for inspection;
//! - a cancelled deployment still removes its container (best effort);
//! - when watching fails, whatever the container produced so far is collected and the
//!   container is force-removed (best effort).

use crate::config::DeployerConfig;
use crate::container::{
    Completion, CompletionStrategy, CompletionWatcher, ContainerClient, ContainerClientConfig,
    ContainerConfig, ContainerRuntime, resolve_image,
};
use crate::deployment::{
    DeployOutcome, DeployResult, Deployment, DeploymentError, DeploymentRepository, Parameters,
    StateDirectoryManager, StateDirectoryPair, read_deployment_logs, read_outputs,
    validate_deployment_id, write_parameters,
};
use crate::env;
use crate::template::TemplateCatalog;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

/// Runs deployments against a container runtime.
///
/// Cheap to clone; every clone shares the same runtime connection.
#[derive(Clone)]
pub struct Deployer {
    runtime: Arc<dyn ContainerRuntime>,
    state_dirs: StateDirectoryManager,
    repository: DeploymentRepository,
    watcher: Arc<dyn CompletionWatcher>,
}

impl Deployer {
    /// Create a deployer over an existing runtime.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        state_dirs: StateDirectoryManager,
        strategy: CompletionStrategy,
    ) -> Self {
        Self {
            repository: DeploymentRepository::new(runtime.clone(), state_dirs.clone()),
            watcher: Arc::from(strategy.watcher()),
            runtime,
            state_dirs,
        }
    }

    /// Connect to the configured container runtime and build a deployer.
    ///
    /// # Errors
    ///
    /// Returns error if the state roots cannot be resolved or the runtime is unreachable.
    pub async fn connect(config: &DeployerConfig) -> Result<Self, DeploymentError> {
        let state_dirs = config.state_directories()?;
        let client = ContainerClient::with_config(ContainerClientConfig {
            endpoint: config.docker_endpoint.clone(),
            ..Default::default()
        })
        .await?;

        match client.runtime_type().await {
            Ok(runtime) => info!("Connected to {} runtime", runtime),
            Err(e) => warn!("Could not determine container runtime type: {}", e),
        }

        Ok(Self::new(Arc::new(client), state_dirs, config.completion))
    }

    /// State directory layout used by this deployer.
    pub fn state_directories(&self) -> &StateDirectoryManager {
        &self.state_dirs
    }

    /// List all deployments known to the runtime.
    ///
    /// Runtime failures are logged and produce an empty list.
    pub async fn list_deployments(&self) -> Vec<Deployment> {
        match self.repository.list().await {
            Ok(deployments) => deployments,
            Err(e) => {
                error!("Failed to list deployments: {}", e);
                Vec::new()
            }
        }
    }

    /// Fetch a deployment by id.
    ///
    /// Returns `None` if no container carries the id, or if the lookup failed (logged).
    pub async fn get_deployment(&self, deployment_id: &str) -> Option<Deployment> {
        match self.repository.get(deployment_id).await {
            Ok(deployment) => deployment,
            Err(e) => {
                error!("Failed to retrieve deployment '{}': {}", deployment_id, e);
                None
            }
        }
    }

    /// Run a deployment to completion.
    ///
    /// # Errors
    ///
    /// Returns error only for invalid input (empty image, unusable deployment id),
    /// before anything is touched. Every other failure is a failed [`DeployResult`].
    pub async fn deploy(
        &self,
        deployment_id: &str,
        image: &str,
        parameters: &Parameters,
    ) -> Result<DeployResult, DeploymentError> {
        self.deploy_with_cancellation(deployment_id, image, parameters, CancellationToken::new())
            .await
    }

    /// Run a deployment of a catalog template.
    ///
    /// An unknown template id yields a failed result with
    /// [`DeployOutcome::TemplateNotFound`].
    ///
    /// # Errors
    ///
    /// Returns error only for invalid input, as for [`Deployer::deploy`].
    pub async fn deploy_template(
        &self,
        catalog: &TemplateCatalog,
        template_id: u32,
        deployment_id: &str,
        parameters: &Parameters,
        cancel: CancellationToken,
    ) -> Result<DeployResult, DeploymentError> {
        validate_deployment_id(deployment_id)?;

        let Some(template) = catalog.get(template_id) else {
            warn!("Template {} not found", template_id);
            return Ok(DeployResult::failed(
                deployment_id,
                DeployOutcome::TemplateNotFound { template_id },
                Utc::now(),
            ));
        };

        info!(
            "Deploying template {} ('{}') as '{}'",
            template.id, template.name, deployment_id
        );
        self.deploy_with_cancellation(deployment_id, &template.image, parameters, cancel)
            .await
    }

    /// Run a deployment that can be aborted through `cancel`.
    ///
    /// On cancellation the container is removed (best effort) and the result carries
    /// [`DeployOutcome::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns error only for invalid input, as for [`Deployer::deploy`].
    pub async fn deploy_with_cancellation(
        &self,
        deployment_id: &str,
        image: &str,
        parameters: &Parameters,
        cancel: CancellationToken,
    ) -> Result<DeployResult, DeploymentError> {
        if image.trim().is_empty() {
            return Err(DeploymentError::InvalidImage);
        }
        validate_deployment_id(deployment_id)?;

        let started_at = Utc::now();
        let span = info_span!("deployment", deployment_id = %deployment_id);

        let result = async move {
            info!("Starting deployment '{}' using image '{}'", deployment_id, image);

            match self
                .run(deployment_id, image, parameters, &cancel, started_at)
                .await
            {
                Ok(result) => {
                    info!(
                        "Deployment '{}' finished: success={} outcome={:?}",
                        deployment_id, result.success, result.outcome
                    );
                    result
                }
                Err(e) => {
                    error!(
                        "Unexpected error while executing deployment '{}': {}",
                        deployment_id, e
                    );
                    DeployResult::failed(
                        deployment_id,
                        DeployOutcome::Error {
                            message: e.to_string(),
                        },
                        started_at,
                    )
                }
            }
        }
        .instrument(span)
        .await;

        Ok(result)
    }

    async fn run(
        &self,
        deployment_id: &str,
        image: &str,
        parameters: &Parameters,
        cancel: &CancellationToken,
        started_at: DateTime<Utc>,
    ) -> Result<DeployResult, DeploymentError> {
        let dirs = self.state_dirs.materialize(deployment_id).await?;
        write_parameters(parameters, &dirs.local).await?;

        let failed = |outcome| DeployResult::failed(deployment_id, outcome, started_at);

        let target = match resolve_image(self.runtime.as_ref(), image).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                error!("Image not found: '{}'", image);
                return Ok(failed(DeployOutcome::ImageNotFound {
                    image: image.to_string(),
                }));
            }
            Err(e) => {
                error!("Failed to list images: {}", e);
                return Ok(failed(DeployOutcome::RuntimeError {
                    message: e.to_string(),
                }));
            }
        };
        info!("Template image id is '{}'", target.id);

        let config = container_config(deployment_id, image, &target.id, &dirs)?;

        let container_id = match self.runtime.create_container(&config).await {
            Ok(container_id) => container_id,
            Err(e) => {
                error!("Failed to create container for '{}': {}", deployment_id, e);
                return Ok(failed(DeployOutcome::RuntimeError {
                    message: e.to_string(),
                }));
            }
        };
        info!("Created container '{}'", container_id);

        let mut result = failed(DeployOutcome::TimedOut);
        result.container_id = Some(container_id.clone());

        // Taken before start so the event watcher replays a `die` that beats it.
        let since = Utc::now();
        if let Err(e) = self.runtime.start_container(&container_id).await {
            error!("Failed to start container '{}': {}", container_id, e);
            // Never started, so nothing to collect; free the name for a retry.
            self.remove_container(&container_id).await;
            result.outcome = DeployOutcome::RuntimeError {
                message: e.to_string(),
            };
            result.finished_at = Utc::now();
            return Ok(result);
        }
        info!("Started container '{}'", container_id);

        info!("Waiting for container termination...");
        let completion = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            completion = self.watcher.wait(self.runtime.as_ref(), &container_id, since) => Some(completion),
        };

        match completion {
            None => {
                warn!("Deployment '{}' cancelled", deployment_id);
                if let Err(e) = self.collect(&mut result, &dirs.local, &container_id).await {
                    warn!("Incomplete logs for cancelled deployment: {}", e);
                }
                self.remove_container(&container_id).await;
                result.outcome = DeployOutcome::Cancelled;
            }
            Some(Ok(Completion::TimedOut)) => {
                error!(
                    "Timed out waiting for deployment '{}' to terminate; leaving container '{}' for inspection",
                    deployment_id, container_id
                );
                if let Err(e) = self.collect(&mut result, &dirs.local, &container_id).await {
                    warn!("Incomplete logs for timed out deployment: {}", e);
                }
                result.outcome = DeployOutcome::TimedOut;
            }
            Some(Err(e)) => {
                error!(
                    "Lost track of container '{}' while waiting for termination: {}",
                    container_id, e
                );
                if let Err(e) = self.collect(&mut result, &dirs.local, &container_id).await {
                    warn!("Incomplete logs for deployment '{}': {}", deployment_id, e);
                }
                self.remove_container(&container_id).await;
                result.outcome = DeployOutcome::RuntimeError {
                    message: e.to_string(),
                };
            }
            Some(Ok(Completion::Exited { exit_code })) => {
                result.exit_code = exit_code;
                let collected = self.collect(&mut result, &dirs.local, &container_id).await;
                self.remove_container(&container_id).await;

                result.outcome = match collected {
                    Err(e) => {
                        error!("Failed to collect results of '{}': {}", deployment_id, e);
                        DeployOutcome::Error {
                            message: e.to_string(),
                        }
                    }
                    Ok(()) if exit_code == Some(0) => {
                        result.success = true;
                        DeployOutcome::Succeeded
                    }
                    Ok(()) => DeployOutcome::Failed { exit_code },
                };
            }
        }

        result.finished_at = Utc::now();
        Ok(result)
    }

    /// Gather the container log, log files and outputs into `result`.
    ///
    /// Keeps going after a failure so that as much as possible is salvaged; the first
    /// failure that invalidates the result is returned. Unreadable log files are only
    /// logged.
    async fn collect(
        &self,
        result: &mut DeployResult,
        state_dir: &Path,
        container_id: &str,
    ) -> Result<(), DeploymentError> {
        let mut first_error = None;

        info!("Reading logs for container '{}'", container_id);
        match self.runtime.container_logs(container_id).await {
            Ok(log) => result.log = log,
            Err(e) => first_error = Some(DeploymentError::from(e)),
        }

        match read_outputs(state_dir).await {
            Ok(outputs) => result.outputs = outputs,
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }

        match read_deployment_logs(state_dir).await {
            Ok(logs) => result.logs = logs,
            Err(e) => warn!("Failed to read deployment log files: {}", e),
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Force-remove a container, logging failures.
    async fn remove_container(&self, container_id: &str) {
        info!("Destroying container '{}'...", container_id);
        match self.runtime.remove_container(container_id, true).await {
            Ok(()) => info!("Destroyed container '{}'", container_id),
            Err(e) => warn!("Failed to remove container '{}': {}", container_id, e),
        }
    }
}

/// Container settings for a deployment.
fn container_config(
    deployment_id: &str,
    image_tag: &str,
    image_id: &str,
    dirs: &StateDirectoryPair,
) -> Result<ContainerConfig, DeploymentError> {
    Ok(ContainerConfig::builder()
        .name(env::container_name(deployment_id))
        .image(image_id)
        .attach_output(true)
        .bind(env::state_bind(&dirs.host))
        .envs(env::container::NO_COLOR_ENV.iter().copied())
        .label(env::labels::TASK_TYPE, env::labels::TASK_TYPE_DEPLOYMENT)
        .label(env::labels::DEPLOYMENT_ID, deployment_id)
        .label(env::labels::IMAGE_TAG, image_tag)
        .log_driver(env::container::LOG_DRIVER)
        .build()?)
}
