//! Deployment templates.
//!
//! A template is a container image that knows how to provision something, plus the
//! parameters it expects in `tfvars.json`. The catalog ships with one built-in entry and
//! can be extended from configuration.

use crate::deployment::Parameters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Declared type of a template parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Boolean,
}

impl ParameterType {
    /// Whether a raw parameter value is acceptable for this type.
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Self::String => true,
            Self::Integer => value.trim().parse::<i64>().is_ok(),
            Self::Boolean => matches!(value.trim(), "true" | "false"),
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// A parameter a template expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub parameter_type: ParameterType,
    #[serde(default)]
    pub description: String,
}

impl TemplateParameter {
    fn new(name: &str, parameter_type: ParameterType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            parameter_type,
            description: description.to_string(),
        }
    }
}

/// A deployable template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: u32,
    pub name: String,
    /// Image tag the deployment container is started from
    pub image: String,
    #[serde(default)]
    pub parameters: Vec<TemplateParameter>,
}

impl Template {
    /// Names of declared parameters whose supplied value does not match the declared type.
    ///
    /// Parameters that are not supplied, or not declared, are not reported.
    pub fn mismatched_parameters<'a>(&'a self, parameters: &Parameters) -> Vec<&'a str> {
        self.parameters
            .iter()
            .filter(|declared| {
                parameters
                    .get(&declared.name)
                    .is_some_and(|value| !declared.parameter_type.accepts(value))
            })
            .map(|declared| declared.name.as_str())
            .collect()
    }
}

/// Known templates, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<u32, Template>,
}

impl TemplateCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog of templates shipped with the deployer.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.insert(Template {
            id: 1,
            name: "Web application (multi-cloud)".to_string(),
            image: "tintoy/tfa-multicloud-template:stable".to_string(),
            parameters: vec![
                TemplateParameter::new(
                    "app_name",
                    ParameterType::String,
                    "The name of the application to deploy",
                ),
                TemplateParameter::new(
                    "aws_instance_count",
                    ParameterType::Integer,
                    "The number of AWS instances to create",
                ),
            ],
        });
        catalog
    }

    /// The built-in catalog plus `extra` entries; an extra entry replaces a built-in one
    /// with the same id.
    pub fn with_templates<I: IntoIterator<Item = Template>>(extra: I) -> Self {
        let mut catalog = Self::builtin();
        for template in extra {
            if let Some(replaced) = catalog.insert(template) {
                warn!(
                    "Template {} ('{}') overridden by configuration",
                    replaced.id, replaced.name
                );
            }
        }
        catalog
    }

    /// Add a template, returning any previous template with the same id.
    pub fn insert(&mut self, template: Template) -> Option<Template> {
        self.templates.insert(template.id, template)
    }

    /// Look up a template by id.
    pub fn get(&self, id: u32) -> Option<&Template> {
        self.templates.get(&id)
    }

    /// All templates, ordered by id.
    pub fn all(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = TemplateCatalog::builtin();
        let template = catalog.get(1).unwrap();

        assert_eq!(template.name, "Web application (multi-cloud)");
        assert_eq!(template.image, "tintoy/tfa-multicloud-template:stable");
        assert_eq!(template.parameters.len(), 2);
        assert_eq!(template.parameters[1].parameter_type, ParameterType::Integer);
        assert!(catalog.get(2).is_none());
    }

    #[test]
    fn test_configured_templates_extend_and_override() {
        let catalog = TemplateCatalog::with_templates(vec![
            Template {
                id: 7,
                name: "DigitalOcean droplet".to_string(),
                image: "template/do-docker:latest".to_string(),
                parameters: Vec::new(),
            },
            Template {
                id: 1,
                name: "Pinned multi-cloud".to_string(),
                image: "tintoy/tfa-multicloud-template:1.2".to_string(),
                parameters: Vec::new(),
            },
        ]);

        let ids: Vec<_> = catalog.all().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 7]);
        assert_eq!(catalog.get(1).unwrap().image, "tintoy/tfa-multicloud-template:1.2");
    }

    #[test]
    fn test_parameter_type_checks() {
        let template = TemplateCatalog::builtin().get(1).cloned().unwrap();
        let mut parameters = Parameters::new();
        parameters.insert("app_name".to_string(), "demo".to_string());
        parameters.insert("aws_instance_count".to_string(), "two".to_string());
        parameters.insert("undeclared".to_string(), "x".to_string());

        assert_eq!(template.mismatched_parameters(&parameters), vec!["aws_instance_count"]);

        parameters.insert("aws_instance_count".to_string(), " 2 ".to_string());
        assert!(template.mismatched_parameters(&parameters).is_empty());
    }

    #[test]
    fn test_template_toml() {
        let template: Template = toml::from_str(
            r#"
            id = 3
            name = "Static site"
            image = "example/static:latest"

            [[parameters]]
            name = "bucket"
            type = "string"
            "#,
        )
        .unwrap();

        assert_eq!(template.parameters[0].parameter_type, ParameterType::String);
        assert!(template.parameters[0].description.is_empty());
    }
}
