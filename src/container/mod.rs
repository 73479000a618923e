//! Container runtime access layer.
//!
//! This module is the only place that talks to Docker/Podman. Everything above it
//! works against the [`ContainerRuntime`] trait, so the deployment logic can be driven
//! by the bollard-backed [`ContainerClient`] in production and by an in-memory fake in
//! tests.
//!
//! ## Architecture
//!
//! - [`runtime`]: the [`ContainerRuntime`] trait and the runtime-neutral value types
//! - [`client`]: bollard implementation with endpoint selection and health checking
//! - [`config`]: container creation settings with a fluent builder
//! - [`image`]: resolving a repository tag to a local image id
//! - [`monitor`]: completion detection (polling or event stream)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use doozer::container::{ContainerClient, ContainerConfig, ContainerRuntime};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ContainerClient::new().await?;
//!
//!     let config = ContainerConfig::builder()
//!         .name("deploy-example")
//!         .image("alpine:latest")
//!         .label("deployment.id", "example")
//!         .build()?;
//!
//!     let container_id = client.create_container(&config).await?;
//!     client.start_container(&container_id).await?;
//!     println!("{}", client.container_logs(&container_id).await?);
//!     client.remove_container(&container_id, true).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod image;
pub mod monitor;
pub mod runtime;

pub use client::{ContainerClient, ContainerClientConfig, RuntimeType};
pub use config::{ContainerConfig, ContainerConfigBuilder};
pub use image::{ImageInfo, resolve_image};
pub use monitor::{Completion, CompletionStrategy, CompletionWatcher, EventWatcher, PollingWatcher};
pub use runtime::{
    ContainerInspection, ContainerRuntime, ContainerStatus, ContainerSummary, LabelFilter,
    RuntimeEvent,
};

/// Container runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Docker/Podman API error
    #[error("Container API error: {0}")]
    ApiError(#[from] bollard::errors::Error),

    /// Container or image not found
    #[error("Container not found: {0}")]
    NotFound(String),

    /// Container configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Connection to the runtime failed
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// General error
    #[error("Container error: {0}")]
    Other(String),
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;
