//! Command line argument parsing
//!
//! This module handles CLI argument parsing with subcommands:
//! - `deploy`: Run a deployment of a catalog template or an image tag
//! - `list`: List deployments known to the container runtime
//! - `get`: Show a single deployment
//! - `templates`: List the template catalog
//! - `show-config`: Show configuration discovery information
//! - `init-config`: Write a default configuration file to the user config directory

use crate::deployment::{Parameters, generate_deployment_id};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Deploy(DeployRequest),
    List,
    Get(String),
    Templates,
    ShowConfig,
    InitConfig,
}

/// What to deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployTarget {
    Template(u32),
    Image(String),
}

#[derive(Debug, PartialEq, Eq)]
pub struct DeployRequest {
    pub target: DeployTarget,
    pub deployment_id: String,
    pub parameters: Parameters,
}

#[derive(Debug, Parser)]
#[command(name = "doozer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Runs infrastructure templates as ephemeral, labelled containers")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file (skips discovery)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Deploy a template and wait for it to finish
    Deploy {
        /// Catalog template id
        #[arg(short = 't', long = "template", conflicts_with = "image", required_unless_present = "image")]
        template: Option<u32>,

        /// Image tag to run directly
        #[arg(short = 'i', long = "image")]
        image: Option<String>,

        /// Deployment id (generated when omitted)
        #[arg(long = "id")]
        id: Option<String>,

        /// Template parameter (repeatable)
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_parameter)]
        parameters: Vec<(String, String)>,
    },
    /// List all deployments
    List,
    /// Show a deployment
    Get {
        /// Deployment id
        id: String,
    },
    /// List available templates
    Templates,
    /// Show configuration discovery information
    ShowConfig,
    /// Create ~/.doozer/config.toml with default settings
    InitConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Deploy {
                template,
                image,
                id,
                parameters,
            }) => {
                let target = match (template, image) {
                    (Some(template_id), None) => DeployTarget::Template(*template_id),
                    (None, Some(image)) if !image.trim().is_empty() => {
                        DeployTarget::Image(image.clone())
                    }
                    (None, Some(_)) => return Err("Image tag must not be empty".to_string()),
                    _ => {
                        return Err("Specify exactly one of --template or --image".to_string());
                    }
                };

                Ok(ExecutionMode::Deploy(DeployRequest {
                    target,
                    deployment_id: id.clone().unwrap_or_else(generate_deployment_id),
                    parameters: parameters.iter().cloned().collect(),
                }))
            }
            Some(Commands::List) => Ok(ExecutionMode::List),
            Some(Commands::Get { id }) => Ok(ExecutionMode::Get(id.clone())),
            Some(Commands::Templates) => Ok(ExecutionMode::Templates),
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            Some(Commands::InitConfig) => Ok(ExecutionMode::InitConfig),
            None => Err(
                "No command specified. Use 'doozer --help' to see available commands.".to_string(),
            ),
        }
    }
}

/// Parse a `KEY=VALUE` parameter; the value may itself contain `=`.
fn parse_parameter(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Invalid parameter '{}': expected KEY=VALUE", raw))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Invalid parameter '{}': empty key", raw));
    }

    Ok((key.to_string(), value.to_string()))
}
