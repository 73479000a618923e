//! Container configuration builders.
//!
//! Provides a fluent API for describing the container a deployment runs in, without
//! tying callers to a particular runtime's request types.

use crate::container::{ContainerError, Result};
use std::collections::HashMap;

/// Container configuration builder.
///
/// Provides a fluent interface for constructing container configurations
/// with sane defaults and validation.
pub struct ContainerConfigBuilder {
    name: Option<String>,
    image: Option<String>,
    env: Vec<String>,
    labels: HashMap<String, String>,
    binds: Vec<String>,
    attach_stdout: bool,
    attach_stderr: bool,
    log_driver: Option<String>,
}

impl Default for ContainerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerConfigBuilder {
    /// Create a new container configuration builder.
    pub fn new() -> Self {
        Self {
            name: None,
            image: None,
            env: Vec::new(),
            labels: HashMap::new(),
            binds: Vec::new(),
            attach_stdout: true,
            attach_stderr: true,
            log_driver: None,
        }
    }

    /// Set the container name.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the container image (tag or image id).
    pub fn image<S: Into<String>>(mut self, image: S) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Add an environment variable.
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push(format!("{}={}", key.into(), value.into()));
        self
    }

    /// Add multiple environment variables.
    pub fn envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in envs {
            self.env.push(format!("{}={}", k.into(), v.into()));
        }
        self
    }

    /// Add a label to the container.
    pub fn label<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add a volume bind mount (host_path:container_path[:mode]).
    pub fn bind<S: Into<String>>(mut self, bind: S) -> Self {
        self.binds.push(bind.into());
        self
    }

    /// Attach stdout and stderr so they are captured in the container log.
    pub fn attach_output(mut self, enable: bool) -> Self {
        self.attach_stdout = enable;
        self.attach_stderr = enable;
        self
    }

    /// Set the log driver (e.g., "json-file").
    pub fn log_driver<S: Into<String>>(mut self, driver: S) -> Self {
        self.log_driver = Some(driver.into());
        self
    }

    /// Build the container configuration.
    ///
    /// # Errors
    ///
    /// Returns error if required fields are missing or invalid.
    pub fn build(self) -> Result<ContainerConfig> {
        let image = self
            .image
            .filter(|image| !image.trim().is_empty())
            .ok_or_else(|| ContainerError::ConfigError("Image is required".to_string()))?;

        if let Some(bad) = self.binds.iter().find(|bind| !bind.contains(':')) {
            return Err(ContainerError::ConfigError(format!(
                "Bind mount '{}' must be host_path:container_path",
                bad
            )));
        }

        Ok(ContainerConfig {
            name: self.name,
            image,
            env: self.env,
            labels: self.labels,
            binds: self.binds,
            attach_stdout: self.attach_stdout,
            attach_stderr: self.attach_stderr,
            log_driver: self.log_driver,
        })
    }
}

/// Container configuration.
///
/// Holds container configuration for creation.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Container name (runtime-generated if None)
    pub name: Option<String>,
    /// Image name or id
    pub image: String,
    /// Environment variables (KEY=value)
    pub env: Vec<String>,
    /// Labels
    pub labels: HashMap<String, String>,
    /// Bind mounts (host_path:container_path[:mode])
    pub binds: Vec<String>,
    /// Attach stdout
    pub attach_stdout: bool,
    /// Attach stderr
    pub attach_stderr: bool,
    /// Log driver
    pub log_driver: Option<String>,
}

impl ContainerConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ContainerConfigBuilder {
        ContainerConfigBuilder::new()
    }

    /// Host side of each bind mount.
    pub fn bind_sources(&self) -> impl Iterator<Item = &str> {
        self.binds
            .iter()
            .filter_map(|bind| bind.split_once(':').map(|(source, _)| source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_config() {
        let config = ContainerConfig::builder()
            .name("deploy-abc")
            .image("template/do-docker:latest")
            .build()
            .unwrap();

        assert_eq!(config.name.as_deref(), Some("deploy-abc"));
        assert_eq!(config.image, "template/do-docker:latest");
        assert!(config.attach_stdout);
        assert!(config.attach_stderr);
    }

    #[test]
    fn test_labels_and_env() {
        let config = ContainerConfig::builder()
            .image("sha256:1234")
            .label("deployment.id", "abc")
            .envs([("ANSIBLE_NOCOLOR", "1"), ("NO_COLOR", "1")])
            .build()
            .unwrap();

        assert_eq!(config.labels.get("deployment.id").map(String::as_str), Some("abc"));
        assert!(config.env.contains(&"ANSIBLE_NOCOLOR=1".to_string()));
        assert!(config.env.contains(&"NO_COLOR=1".to_string()));
    }

    #[test]
    fn test_volume_binds() {
        let config = ContainerConfig::builder()
            .image("ubuntu:22.04")
            .bind("/host/state/abc:/root/state")
            .build()
            .unwrap();

        assert_eq!(config.binds, vec!["/host/state/abc:/root/state".to_string()]);
        assert_eq!(config.bind_sources().collect::<Vec<_>>(), vec!["/host/state/abc"]);
    }

    #[test]
    fn test_invalid_bind_error() {
        let result = ContainerConfig::builder()
            .image("ubuntu:22.04")
            .bind("/host/only")
            .build();

        assert!(matches!(result, Err(ContainerError::ConfigError(_))));
    }

    #[test]
    fn test_missing_image_error() {
        let result = ContainerConfig::builder().name("deploy-x").build();
        assert!(matches!(result, Err(ContainerError::ConfigError(_))));

        let result = ContainerConfig::builder().image("  ").build();
        assert!(matches!(result, Err(ContainerError::ConfigError(_))));
    }
}
