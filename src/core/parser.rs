//! RG-010: YAML parsing and validation.
//!
//! Parses rigger.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Project and stage names must be present, stage names unique
//! - Stage names must be usable as a single file name
//! - Roles must reference known hosts
//! - Parameter names must be unique per owner
//! - A `user` parameter must exist when any stage declares roles

use super::error::DeployError;
use super::types::*;
use std::collections::HashSet;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a rigger.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<RiggerConfig, DeployError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| DeployError::io("failed to read", path, e))?;
    parse_config(&content)
}

/// Parse a rigger.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<RiggerConfig, DeployError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| DeployError::Parse(e.to_string()))
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &RiggerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut push = |message: String| errors.push(ValidationError { message });

    if config.version != "1.0" {
        push(format!("version must be \"1.0\", got \"{}\"", config.version));
    }

    let project = &config.project;
    if project.name.trim().is_empty() {
        push("project name must not be empty".to_string());
    }

    for dup in duplicate_names(project.parameters.iter().map(|p| p.name.as_str())) {
        push(format!("project parameter '{}' is defined more than once", dup));
    }
    for p in &project.parameters {
        if p.name.trim().is_empty() {
            push("project has a parameter without a name".to_string());
        }
    }

    for dup in duplicate_names(project.stages.iter().map(|s| s.name.as_str())) {
        push(format!("stage '{}' is defined more than once", dup));
    }

    let mut any_roles = false;
    for stage in &project.stages {
        if stage.name.trim().is_empty() {
            push("stage name must not be empty".to_string());
        } else if !is_path_component(&stage.name) {
            push(format!(
                "stage name '{}' must not contain '/', '\\' or '..'",
                stage.name
            ));
        }

        for role in &stage.roles {
            any_roles = true;
            if !config.hosts.contains_key(&role.host) {
                push(format!(
                    "role '{}' on stage '{}' references unknown host '{}'",
                    role.name, stage.name, role.host
                ));
            }
        }

        for dup in duplicate_names(stage.parameters.iter().map(|p| p.name.as_str())) {
            push(format!(
                "stage '{}' parameter '{}' is defined more than once",
                stage.name, dup
            ));
        }
    }

    if any_roles && project.parameter("user").is_none() {
        push(format!(
            "project '{}' has roles but no 'user' parameter",
            project.name
        ));
    }

    errors
}

/// Whether `name` stays inside the directory it is joined onto.
pub fn is_path_component(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}

fn duplicate_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut dups = Vec::new();
    for name in names {
        if !seen.insert(name) && !dups.contains(&name) {
            dups.push(name);
        }
    }
    dups
}
