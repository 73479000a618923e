//! CLI-specific functionality for the deployer
//!
//! This module contains argument parsing and the translation of parsed arguments into
//! an [`ExecutionMode`]. Configuration discovery lives in [`crate::config`].

pub mod args;

pub use args::{Args, Commands, DeployRequest, DeployTarget, ExecutionMode};
