//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Explicit path given on the command line
//! 2. Current directory: ./doozer.toml or ./.doozer/config.toml
//! 3. User config: ~/.doozer/config.toml
//! 4. System config: /etc/doozer/config.toml
//! 5. Built-in defaults
//!
//! `DOOZER_*` environment variables are applied on top of whichever file was loaded.

use crate::container::CompletionStrategy;
use crate::deployment::{DeploymentError, StateDirectoryManager};
use crate::env;
use crate::template::{Template, TemplateCatalog};
use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Could not determine home directory")]
    NoHomeDirectory,
}

/// Deployer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    /// State root as seen by this process
    pub local_state_directory: PathBuf,
    /// State root as seen by the container runtime's host (defaults to the local root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_state_directory: Option<PathBuf>,
    /// Runtime endpoint (`unix://`, `tcp://`, `http://`); local defaults when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_endpoint: Option<String>,
    /// How container termination is detected
    pub completion: CompletionStrategy,
    /// Templates added to the built-in catalog
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<Template>,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            local_state_directory: PathBuf::from("state"),
            host_state_directory: None,
            docker_endpoint: None,
            completion: CompletionStrategy::default(),
            templates: Vec::new(),
        }
    }
}

impl DeployerConfig {
    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `DOOZER_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std_env::var(key).ok());
    }

    /// Apply `DOOZER_*` overrides using `lookup` to read variables.
    ///
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{}{}", env::ENV_PREFIX, name);
            lookup(&key)
                .filter(|value| !value.trim().is_empty())
                .inspect(|value| debug!("Config override from {}: {}", key, value))
        };

        if let Some(local) = var("LOCAL_STATE_DIRECTORY") {
            self.local_state_directory = PathBuf::from(local);
        }
        if let Some(host) = var("HOST_STATE_DIRECTORY") {
            self.host_state_directory = Some(PathBuf::from(host));
        }
        if let Some(endpoint) = var("DOCKER_ENDPOINT") {
            self.docker_endpoint = Some(endpoint);
        }
    }

    /// Host state root, falling back to the local one.
    pub fn effective_host_state_directory(&self) -> &Path {
        self.host_state_directory
            .as_deref()
            .unwrap_or(&self.local_state_directory)
    }

    /// State directory layout for the configured roots.
    pub fn state_directories(&self) -> Result<StateDirectoryManager, DeploymentError> {
        StateDirectoryManager::new(
            &self.local_state_directory,
            self.effective_host_state_directory(),
        )
        .map_err(|source| DeploymentError::StateDirectory {
            path: self.local_state_directory.clone(),
            source,
        })
    }

    /// Built-in templates plus the configured ones.
    pub fn template_catalog(&self) -> TemplateCatalog {
        TemplateCatalog::with_templates(self.templates.iter().cloned())
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load configuration: an explicit file if given, otherwise the discovery
    /// hierarchy, then environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<DeployerConfig, ConfigError> {
        let mut config = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                info!("Loading configuration from: {:?}", path);
                DeployerConfig::from_toml_file(path)?
            }
            None => Self::discover_config()?,
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<DeployerConfig, ConfigError> {
        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            return DeployerConfig::from_toml_file(config_path);
        }

        info!("No configuration file found, using defaults");
        Ok(DeployerConfig::default())
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        Self::first_existing(Self::get_config_candidates())
    }

    fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
        for candidate in candidates {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Get list of configuration file candidates in priority order
    fn get_config_candidates() -> Vec<PathBuf> {
        let current_dir = std_env::current_dir().ok();
        let home_dir = Self::get_home_dir();
        Self::candidates_for(current_dir.as_deref(), home_dir.as_deref())
    }

    fn candidates_for(current_dir: Option<&Path>, home_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        // 1. Current directory: ./doozer.toml, ./.doozer/config.toml
        if let Some(current_dir) = current_dir {
            candidates.push(current_dir.join(env::LOCAL_CONFIG_FILE_NAME));
            candidates.push(env::local_config_file_path(current_dir));
        }

        // 2. User config: ~/.doozer/config.toml
        if let Some(home_dir) = home_dir {
            candidates.push(env::user_config_file_path(home_dir));
        }

        // 3. System config
        #[cfg(unix)]
        candidates.push(PathBuf::from("/etc/doozer/config.toml"));

        #[cfg(windows)]
        if let Ok(program_data) = std_env::var("PROGRAMDATA") {
            candidates.push(PathBuf::from(program_data).join("doozer").join("config.toml"));
        }

        candidates
    }

    /// Get home directory path
    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Create a default config file in the user's home directory
    pub fn create_default_user_config() -> Result<PathBuf, ConfigError> {
        let home_dir = Self::get_home_dir().ok_or(ConfigError::NoHomeDirectory)?;
        Self::create_default_config_in(&home_dir)
    }

    /// Write a default config under `home_dir`, leaving an existing file untouched.
    fn create_default_config_in(home_dir: &Path) -> Result<PathBuf, ConfigError> {
        let config_dir = env::user_config_dir_path(home_dir);
        let config_path = env::user_config_file_path(home_dir);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|source| ConfigError::Io {
                path: config_dir.clone(),
                source,
            })?;
            info!("Created configuration directory: {:?}", config_dir);
        }

        if !config_path.exists() {
            DeployerConfig::default().to_toml_file(&config_path)?;
            info!("Created default configuration file: {:?}", config_path);
        } else {
            warn!("Configuration file already exists: {:?}", config_path);
        }

        Ok(config_path)
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info(explicit: Option<&Path>) {
        println!("Configuration Discovery Hierarchy:");
        println!();

        let mut candidates = Self::get_config_candidates();
        if let Some(path) = explicit {
            candidates.insert(0, path.to_path_buf());
        }

        for (i, candidate) in candidates.iter().enumerate() {
            let status = if candidate.exists() {
                if candidate.is_file() {
                    "✓ EXISTS"
                } else {
                    "✗ NOT A FILE"
                }
            } else {
                "✗ NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        match Self::first_existing(candidates) {
            Some(found) => println!("Active configuration: {:?}", found),
            None => println!("Active configuration: Built-in defaults"),
        }

        println!();
        println!("Environment overrides:");
        for name in [
            "LOCAL_STATE_DIRECTORY",
            "HOST_STATE_DIRECTORY",
            "DOCKER_ENDPOINT",
        ] {
            let key = format!("{}{}", env::ENV_PREFIX, name);
            match std_env::var(&key) {
                Ok(value) => println!("  {} = {}", key, value),
                Err(_) => println!("  {} (unset)", key),
            }
        }
    }
}
