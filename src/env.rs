//! Fixed names and path utilities shared by the deployer.
//!
//! This module centralizes every file name, label key and in-container path that the
//! deployer and the deployment containers agree on. Changing any of these breaks the
//! contract with existing template images.

use std::path::{Path, PathBuf};

/// Main application directory name (hidden directory like .git, .vscode)
pub const APP_DIR_NAME: &str = ".doozer";

/// Configuration file name inside [`APP_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "doozer.toml";

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "DOOZER_";

/// Files exchanged through a deployment's state directory
pub mod state {
    /// Input parameters written before the container starts
    pub const PARAMETERS_FILE_NAME: &str = "tfvars.json";

    /// Outputs written by the deployment container (optional)
    pub const OUTPUTS_FILE_NAME: &str = "terraform.output.json";

    /// Directory the deployment container drops its own log files into
    pub const LOGS_DIR_NAME: &str = "logs";

    /// Extension of log files picked up from [`LOGS_DIR_NAME`]
    pub const LOG_FILE_EXTENSION: &str = "log";

    /// Name of the log entry carrying the container's stdout/stderr
    pub const CONTAINER_LOG_NAME: &str = "container.log";

    /// Where the host state directory is bind-mounted inside the container
    pub const CONTAINER_STATE_PATH: &str = "/root/state";
}

/// Container labels used for discovery
pub mod labels {
    /// Marks a container as managed by the deployer
    pub const TASK_TYPE: &str = "task.type";

    /// Value of [`TASK_TYPE`] for deployment containers
    pub const TASK_TYPE_DEPLOYMENT: &str = "deployment";

    /// Deployment id; the primary lookup key
    pub const DEPLOYMENT_ID: &str = "deployment.id";

    /// Image tag the deployment was started from
    pub const IMAGE_TAG: &str = "deployment.image.tag";
}

/// Container naming and environment
pub mod container {
    /// Prefix for deployment container names
    pub const NAME_PREFIX: &str = "deploy-";

    /// Environment passed to every deployment container.
    ///
    /// Colour escape sequences end up verbatim in captured logs.
    pub const NO_COLOR_ENV: &[(&str, &str)] = &[("ANSIBLE_NOCOLOR", "1"), ("NO_COLOR", "1")];

    /// Log driver that keeps stdout/stderr retrievable through the logs API
    pub const LOG_DRIVER: &str = "json-file";
}

/// Build the container name for a deployment
pub fn container_name(deployment_id: &str) -> String {
    format!("{}{}", container::NAME_PREFIX, deployment_id)
}

/// Build the parameters file path inside a state directory
pub fn parameters_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join(state::PARAMETERS_FILE_NAME)
}

/// Build the outputs file path inside a state directory
pub fn outputs_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join(state::OUTPUTS_FILE_NAME)
}

/// Build the logs directory path inside a state directory
pub fn logs_dir_path(state_dir: &Path) -> PathBuf {
    state_dir.join(state::LOGS_DIR_NAME)
}

/// Build the bind mount specification for a host state directory
pub fn state_bind(host_state_dir: &Path) -> String {
    format!("{}:{}", host_state_dir.display(), state::CONTAINER_STATE_PATH)
}

/// Build config directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(APP_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME)
}
