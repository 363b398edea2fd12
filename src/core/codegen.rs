//! RG-004: Script generation — project and stage artifacts.
//!
//! Two artifacts per run, both fully rewritten every time:
//! - project script (`deploy.rb`): global parameters + lifecycle log hooks
//! - stage script (`<stage>.rb`): roles + stage parameters + recipe bodies

use super::error::DeployError;
use super::literal;
use super::types::{Deployment, Host, Project, Stage};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// Lifecycle checkpoints that get a log hook in every project script.
pub const LIFECYCLE_CHECKPOINTS: [&str; 4] = [
    "deploy:started",
    "deploy:updated",
    "deploy:published",
    "deploy:finished",
];

/// File name of the project artifact.
pub const PROJECT_SCRIPT: &str = "deploy.rb";

/// Paths of the two generated artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub project_script: PathBuf,
    pub stage_script: PathBuf,
}

/// Directory holding a project's artifacts.
pub fn project_dir(root: &Path, project: &Project) -> PathBuf {
    root.join(project.dir_name())
}

/// Artifact locations under a project directory.
pub fn artifact_paths(project_dir: &Path, stage: &Stage) -> ArtifactPaths {
    ArtifactPaths {
        project_script: project_dir.join(PROJECT_SCRIPT),
        stage_script: project_dir.join(format!("{}.rb", stage.name)),
    }
}

/// Hook line logging a finished task.
pub fn after_flow(task: &str) -> String {
    format!("after '{}', :custom_log", task)
}

/// Role line binding a role to `user@host`.
pub fn role_line(role: &str, user: &str, host: &str) -> String {
    format!("role :{}, %w{{{}@{}}}", role, user, host)
}

/// Raw value of the project's `user` parameter.
pub fn find_host_user(project: &Project) -> Result<&str, DeployError> {
    project
        .parameter("user")
        .map(|p| p.value.as_str())
        .ok_or_else(|| DeployError::MissingParameter {
            owner: format!("project '{}'", project.name),
            name: "user".to_string(),
        })
}

/// Generate the project script.
pub fn project_script(project: &Project, stage: &Stage, deployment: &Deployment) -> String {
    let mut lines: Vec<String> = project
        .parameters
        .iter()
        .filter_map(|p| literal::render_parameter(p, &deployment.prompt_config))
        .collect();
    lines.push(after_flow(&stage.name));
    lines.extend(LIFECYCLE_CHECKPOINTS.iter().map(|t| after_flow(t)));
    join_lines(&lines)
}

/// Generate the stage script.
pub fn stage_script(
    project: &Project,
    stage: &Stage,
    hosts: &IndexMap<String, Host>,
    deployment: &Deployment,
) -> Result<String, DeployError> {
    let mut lines = Vec::new();

    for role in &stage.roles {
        if deployment.is_excluded(&role.host) {
            continue;
        }
        let host = hosts.get(&role.host).ok_or_else(|| DeployError::UnknownHost {
            role: role.name.clone(),
            host: role.host.clone(),
        })?;
        lines.push(role_line(&role.name, find_host_user(project)?, &host.name));
    }

    lines.extend(
        stage
            .parameters
            .iter()
            .filter_map(|p| literal::render_parameter(p, &deployment.prompt_config)),
    );

    for recipe in &stage.recipes {
        let body = recipe.body.strip_suffix('\n').unwrap_or(&recipe.body);
        lines.push(body.to_string());
    }

    Ok(join_lines(&lines))
}

/// Terminate every line with `\n`.
fn join_lines(lines: &[String]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Write an artifact, truncating any previous content.
pub fn write_artifact(path: &Path, content: &str) -> Result<(), DeployError> {
    std::fs::write(path, content).map_err(|e| DeployError::io("cannot write", path, e))
}
