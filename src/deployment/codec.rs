//! Parameter and output files.
//!
//! Parameters go in as a flat JSON object of strings (`tfvars.json`). Outputs come back
//! in whatever shape the template writes to `terraform.output.json`, typically
//! `{ "name": { "sensitive": false, "type": "list", "value": [...] } }`. The raw JSON is
//! kept as-is so it can be handed on without loss.

use crate::deployment::{DeploymentError, Parameters};
use crate::env;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outputs written by a deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outputs(Map<String, Value>);

impl Outputs {
    /// Number of outputs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no outputs.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Typed view of an output.
    ///
    /// Outputs not written in the `{value, type, sensitive}` shape are returned as a
    /// plain value with no declared type.
    pub fn get(&self, name: &str) -> Option<OutputValue> {
        let raw = self.0.get(name)?;
        match raw {
            Value::Object(fields) if fields.contains_key("value") => {
                serde_json::from_value(raw.clone()).ok()
            }
            _ => Some(OutputValue {
                value: raw.clone(),
                output_type: None,
                sensitive: false,
            }),
        }
    }
}

/// A single output with its declared type and sensitivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    /// Output value (scalar, list or object)
    pub value: Value,
    /// Declared type (`string`, `list`, `map`, ...)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<String>,
    /// Whether the value should be hidden from display
    #[serde(default)]
    pub sensitive: bool,
}

/// Write template parameters to the state directory, replacing any previous file.
///
/// # Errors
///
/// Returns [`DeploymentError::Parameters`] if the file cannot be written.
pub async fn write_parameters(parameters: &Parameters, state_dir: &Path) -> Result<PathBuf, DeploymentError> {
    let path = env::parameters_file_path(state_dir);
    info!(
        "Writing {} parameters to '{}'",
        parameters.len(),
        path.display()
    );

    let content = serde_json::to_vec(parameters).map_err(|e| DeploymentError::Parameters {
        path: path.clone(),
        source: io::Error::new(io::ErrorKind::InvalidData, e),
    })?;

    tokio::fs::write(&path, content)
        .await
        .map_err(|source| DeploymentError::Parameters {
            path: path.clone(),
            source,
        })?;

    Ok(path)
}

/// Read the outputs file from a state directory.
///
/// A missing file yields empty outputs. A file holding valid JSON that is not an
/// object is logged and also yields empty outputs.
///
/// # Errors
///
/// Returns [`DeploymentError::MalformedOutputs`] if the file is not valid JSON.
pub async fn read_outputs(state_dir: &Path) -> Result<Outputs, DeploymentError> {
    let path = env::outputs_file_path(state_dir);
    info!("Reading outputs from '{}'", path.display());

    let content = match tokio::fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Outputs file '{}' does not exist", path.display());
            return Ok(Outputs::default());
        }
        Err(source) => return Err(DeploymentError::StateDirectory { path, source }),
    };

    let value: Value = serde_json::from_slice(&content)
        .map_err(|source| DeploymentError::MalformedOutputs {
            path: path.clone(),
            source,
        })?;

    let outputs = match value {
        Value::Object(map) => Outputs(map),
        other => {
            warn!(
                "Outputs file '{}' holds a JSON {} instead of an object; ignoring it",
                path.display(),
                json_kind(&other)
            );
            Outputs::default()
        }
    };

    info!("Read {} outputs from '{}'", outputs.len(), path.display());
    Ok(outputs)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
