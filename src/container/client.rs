//! Docker/Podman client wrapper.
//!
//! Implements [`ContainerRuntime`] on top of the bollard Docker API, with endpoint
//! selection, connection fallback and health checking.

use crate::container::{
    ContainerConfig, ContainerError, ContainerInspection, ContainerRuntime, ContainerStatus,
    ContainerSummary, ImageInfo, LabelFilter, Result, RuntimeEvent, runtime::parse_exit_code,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use bollard::Docker;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Container client configuration.
#[derive(Debug, Clone)]
pub struct ContainerClientConfig {
    /// Runtime endpoint (`unix://`, `tcp://` or `http://`); local defaults if None
    pub endpoint: Option<String>,
    /// Request timeout in seconds
    pub timeout: u64,
}

impl Default for ContainerClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: 120,
        }
    }
}

/// Docker/Podman API client wrapper.
///
/// Manages connection to Docker or Podman daemon with automatic fallback
/// and health checking.
#[derive(Clone)]
pub struct ContainerClient {
    docker: Arc<Docker>,
}

impl ContainerClient {
    /// Create a new container client with default configuration.
    ///
    /// Attempts to connect to Docker first, then falls back to Podman if available.
    ///
    /// # Errors
    ///
    /// Returns error if neither Docker nor Podman are available or connection fails.
    pub async fn new() -> Result<Self> {
        Self::with_config(ContainerClientConfig::default()).await
    }

    /// Create a new container client with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns error if connection to container runtime fails.
    pub async fn with_config(config: ContainerClientConfig) -> Result<Self> {
        let docker = match config.endpoint.as_deref() {
            Some(endpoint) => Self::connect_to(endpoint, config.timeout)?,
            None => Self::connect(config.timeout)?,
        };

        let client = Self {
            docker: Arc::new(docker),
        };

        // Verify connection works
        client.ping().await?;

        Ok(client)
    }

    /// Connect to an explicitly configured endpoint.
    fn connect_to(endpoint: &str, timeout: u64) -> Result<Docker> {
        let url = Url::parse(endpoint).map_err(|e| {
            ContainerError::ConnectionError(format!("Invalid runtime endpoint '{}': {}", endpoint, e))
        })?;

        debug!("Connecting to container runtime at {}", url);

        let docker = match url.scheme() {
            "unix" => Docker::connect_with_socket(endpoint, timeout, bollard::API_DEFAULT_VERSION),
            "tcp" | "http" => {
                Docker::connect_with_http(endpoint, timeout, bollard::API_DEFAULT_VERSION)
            }
            scheme => {
                return Err(ContainerError::ConnectionError(format!(
                    "Unsupported runtime endpoint scheme '{}'",
                    scheme
                )));
            }
        };

        docker.map_err(|e| {
            ContainerError::ConnectionError(format!("Failed to connect to {}: {}", endpoint, e))
        })
    }

    /// Connect to Docker or Podman daemon.
    ///
    /// Tries multiple connection strategies in order:
    /// 1. Local defaults (Unix socket or Windows named pipe, honouring DOCKER_HOST)
    /// 2. Rootless Podman socket
    /// 3. System Podman socket
    fn connect(timeout: u64) -> Result<Docker> {
        debug!("Attempting to connect to container runtime...");

        match Docker::connect_with_local_defaults() {
            Ok(docker) => {
                info!("Connected to container runtime via local defaults");
                return Ok(docker);
            }
            Err(e) => {
                debug!("Local defaults failed: {}", e);
            }
        }

        #[cfg(unix)]
        {
            let mut sockets = Vec::new();
            if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
                sockets.push(format!("unix://{}/podman/podman.sock", runtime_dir));
            }
            sockets.push("unix:///run/podman/podman.sock".to_string());

            for socket in sockets {
                debug!("Trying Podman socket: {}", socket);
                match Docker::connect_with_socket(&socket, timeout, bollard::API_DEFAULT_VERSION) {
                    Ok(docker) => {
                        info!("Connected to Podman via {}", socket);
                        return Ok(docker);
                    }
                    Err(e) => {
                        debug!("Podman socket {} failed: {}", socket, e);
                    }
                }
            }
        }

        #[cfg(not(unix))]
        let _ = timeout;

        Err(ContainerError::ConnectionError(
            "Failed to connect to Docker or Podman. Please ensure Docker or Podman is installed and running.".to_string()
        ))
    }

    /// Ping the container runtime to verify connectivity.
    ///
    /// # Errors
    ///
    /// Returns error if ping fails.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map_err(|e| {
            ContainerError::ConnectionError(format!("Failed to ping container runtime: {}", e))
        })?;
        debug!("Container runtime ping successful");
        Ok(())
    }

    /// Get version information from the container runtime.
    ///
    /// # Errors
    ///
    /// Returns error if version query fails.
    pub async fn version(&self) -> Result<bollard::models::SystemVersion> {
        self.docker
            .version()
            .await
            .map_err(|e| ContainerError::Other(format!("Failed to get version: {}", e)))
    }

    /// Check if the runtime is Docker or Podman.
    ///
    /// # Errors
    ///
    /// Returns error if runtime detection fails.
    pub async fn runtime_type(&self) -> Result<RuntimeType> {
        let version = self.version().await?;

        let is_podman = version
            .components
            .unwrap_or_default()
            .iter()
            .any(|component| component.name.to_lowercase().contains("podman"));

        if is_podman {
            Ok(RuntimeType::Podman)
        } else {
            Ok(RuntimeType::Docker)
        }
    }

}

/// Map a 404 from the runtime to [`ContainerError::NotFound`].
fn not_found(name: &str) -> impl FnOnce(bollard::errors::Error) -> ContainerError + '_ {
    move |e| match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => ContainerError::NotFound(name.to_string()),
        e => ContainerError::ApiError(e),
    }
}

#[async_trait]
impl ContainerRuntime for ContainerClient {
    async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        let images = self
            .docker
            .list_images(Some(bollard::image::ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;

        Ok(images
            .into_iter()
            .map(|img| ImageInfo {
                id: img.id,
                repo_tags: img.repo_tags,
                size: img.size,
                created: img.created,
            })
            .collect())
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<String> {
        use bollard::container::Config as BollardConfig;
        use bollard::service::{HostConfig, HostConfigLogConfig};

        let options = config
            .name
            .as_deref()
            .map(|name| bollard::container::CreateContainerOptions {
                name,
                ..Default::default()
            });

        let host_config = HostConfig {
            binds: (!config.binds.is_empty()).then(|| config.binds.clone()),
            log_config: config.log_driver.clone().map(|driver| HostConfigLogConfig {
                typ: Some(driver),
                config: Some(HashMap::new()),
            }),
            ..Default::default()
        };

        let bollard_config = BollardConfig {
            image: Some(config.image.clone()),
            env: (!config.env.is_empty()).then(|| config.env.clone()),
            labels: (!config.labels.is_empty()).then(|| config.labels.clone()),
            attach_stdout: Some(config.attach_stdout),
            attach_stderr: Some(config.attach_stderr),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(options, bollard_config)
            .await
            .map_err(not_found(&config.image))?;

        info!(
            "Created container: {} ({})",
            config.name.as_deref().unwrap_or("<unnamed>"),
            response.id
        );

        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        debug!("Starting container: {}", container_id);

        self.docker
            .start_container(
                container_id,
                None::<bollard::container::StartContainerOptions<String>>,
            )
            .await
            .map_err(not_found(container_id))?;

        info!("Started container: {}", container_id);
        Ok(())
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerInspection> {
        let inspect = self
            .docker
            .inspect_container(
                container_id,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
            .map_err(not_found(container_id))?;

        let state = inspect.state.ok_or_else(|| {
            ContainerError::Other(format!("Container {} has no state", container_id))
        })?;

        let status = match state.status {
            Some(status) => ContainerStatus::parse(&status.to_string()),
            None if state.running.unwrap_or(false) => ContainerStatus::Running,
            None if state.dead.unwrap_or(false) => ContainerStatus::Dead,
            None => ContainerStatus::Unknown(String::new()),
        };

        Ok(ContainerInspection {
            id: inspect.id.unwrap_or_else(|| container_id.to_string()),
            exit_code: if status.is_terminal() {
                state.exit_code
            } else {
                None
            },
            status,
        })
    }

    async fn container_logs(&self, container_id: &str) -> Result<String> {
        let mut stream = self.docker.logs(
            container_id,
            Some(bollard::container::LogsOptions::<String> {
                stdout: true,
                stderr: true,
                follow: false,
                tail: "all".to_string(),
                ..Default::default()
            }),
        );
        let mut output = String::new();

        while let Some(result) = stream.next().await {
            let log = result.map_err(not_found(container_id))?;
            output.push_str(&log.to_string());
        }

        Ok(output)
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        debug!("Removing container: {}", container_id);

        self.docker
            .remove_container(
                container_id,
                Some(bollard::container::RemoveContainerOptions {
                    force,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(not_found(container_id))?;

        info!("Removed container: {}", container_id);
        Ok(())
    }

    async fn list_containers(&self, filter: &LabelFilter) -> Result<Vec<ContainerSummary>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![filter.to_filter_value()]);

        let containers = self
            .docker
            .list_containers(Some(bollard::container::ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        Ok(containers
            .into_iter()
            .map(|c| {
                ContainerSummary {
                    id: c.id.unwrap_or_default(),
                    labels: c.labels.unwrap_or_default(),
                    state: c
                        .state
                        .map(|s| ContainerStatus::parse(&s.to_string()))
                        .unwrap_or_else(|| ContainerStatus::Unknown(String::new())),
                    exit_code: c.status.as_deref().and_then(parse_exit_code),
                }
            })
            .collect())
    }

    fn container_events<'a>(
        &'a self,
        container_id: &str,
        since: DateTime<Utc>,
    ) -> BoxStream<'a, Result<RuntimeEvent>> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        filters.insert("container".to_string(), vec![container_id.to_string()]);

        self.docker
            .events(Some(bollard::system::EventsOptions::<String> {
                since: Some(since.timestamp().to_string()),
                filters,
                ..Default::default()
            }))
            .map(|event| {
                event
                    .map(|message| RuntimeEvent {
                        action: message.action.unwrap_or_default(),
                    })
                    .map_err(ContainerError::from)
            })
            .boxed()
    }
}

/// Type of container runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeType {
    /// Docker runtime
    Docker,
    /// Podman runtime
    Podman,
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeType::Docker => write!(f, "Docker"),
            RuntimeType::Podman => write!(f, "Podman"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_endpoint_scheme() {
        let result = ContainerClient::connect_to("ftp://example.com", 5);
        assert!(matches!(result, Err(ContainerError::ConnectionError(_))));
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = ContainerClient::connect_to("not a url", 5);
        assert!(matches!(result, Err(ContainerError::ConnectionError(_))));
    }

    #[tokio::test]
    #[ignore] // Requires Docker/Podman to be running
    async fn test_client_connection() {
        let client = ContainerClient::new().await.unwrap();
        client.ping().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_runtime_detection() {
        let client = ContainerClient::new().await.unwrap();
        let runtime_type = client.runtime_type().await.unwrap();
        println!("Runtime type: {}", runtime_type);
    }

    #[tokio::test]
    #[ignore]
    async fn test_list_images() {
        let client = ContainerClient::new().await.unwrap();
        let images = client.list_images().await.unwrap();
        println!("Found {} images", images.len());
    }
}
