//! # Doozer
//!
//! Runs infrastructure templates as ephemeral containers and keeps no database: the
//! container runtime's labels are the record of which deployments exist.
//!
//! ## Architecture Overview
//!
//! - **[`container`]**: runtime abstraction, Docker client, completion detection
//! - **[`deployment`]**: state directories, parameter/output files, the deployment
//!   lifecycle and label-based lookup
//! - **[`template`]**: catalog of deployable templates
//! - **[`config`]**: configuration discovery and environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doozer::{DeployerConfig, Deployer, Parameters};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let deployer = Deployer::connect(&DeployerConfig::default()).await?;
//!
//!     let mut parameters = Parameters::new();
//!     parameters.insert("app_name".to_string(), "demo".to_string());
//!
//!     let result = deployer
//!         .deploy("demo-1", "tintoy/tfa-multicloud-template:stable", &parameters)
//!         .await?;
//!     println!("success: {}", result.success);
//!     Ok(())
//! }
//! ```

/// Container runtime integration.
///
/// Wraps the Docker API behind the [`container::ContainerRuntime`] trait and provides
/// polling and event-based completion detection.
pub mod container;

/// Deployment lifecycle and lookup.
pub mod deployment;

/// Template catalog.
pub mod template;

/// Configuration loading.
pub mod config;

/// Environment constants and path utilities.
///
/// Centralizes the file names, labels and in-container paths shared with template
/// images.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use config::{ConfigDiscovery, ConfigError, DeployerConfig};
pub use container::{CompletionStrategy, ContainerClient, ContainerError, ContainerRuntime};
pub use deployment::{
    DeployOutcome, DeployResult, Deployer, Deployment, DeploymentError, DeploymentState,
    Outputs, Parameters,
};
pub use template::{Template, TemplateCatalog};
