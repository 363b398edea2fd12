//! RG-009: Deployment records — load, save (atomic), list, path derivation.

use super::error::DeployError;
use super::types::Deployment;
use std::path::{Path, PathBuf};

/// Directory holding a project's deployment records and journals.
pub fn deployments_dir(state_dir: &Path, project: &str) -> PathBuf {
    state_dir.join(project).join("deployments")
}

/// Derive the record path for a deployment.
pub fn deployment_path(state_dir: &Path, project: &str, id: &str) -> PathBuf {
    deployments_dir(state_dir, project).join(format!("{}.yaml", id))
}

/// Load a deployment record. Returns None if it doesn't exist.
pub fn load_deployment(
    state_dir: &Path,
    project: &str,
    id: &str,
) -> Result<Option<Deployment>, DeployError> {
    let path = deployment_path(state_dir, project, id);
    if !path.exists() {
        return Ok(None);
    }
    read_record(&path).map(Some)
}

fn read_record(path: &Path) -> Result<Deployment, DeployError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| DeployError::io("cannot read", path, e))?;
    serde_yaml_ng::from_str(&content)
        .map_err(|e| DeployError::Parse(format!("invalid deployment record {}: {}", path.display(), e)))
}

/// Save a deployment record atomically (write to temp, then rename).
pub fn save_deployment(
    state_dir: &Path,
    project: &str,
    deployment: &Deployment,
) -> Result<(), DeployError> {
    let path = deployment_path(state_dir, project, &deployment.id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| DeployError::io("cannot create dir", parent, e))?;
    }

    let yaml = serde_yaml_ng::to_string(deployment)
        .map_err(|e| DeployError::Serialize(e.to_string()))?;

    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml).map_err(|e| DeployError::io("cannot write", &tmp_path, e))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| DeployError::io("cannot rename", &tmp_path, e))?;

    Ok(())
}

/// All deployment records of a project, oldest first.
pub fn list_deployments(state_dir: &Path, project: &str) -> Result<Vec<Deployment>, DeployError> {
    let dir = deployments_dir(state_dir, project);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(&dir).map_err(|e| DeployError::io("cannot read dir", &dir, e))?;

    let mut deployments = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        deployments.push(read_record(&path)?);
    }
    deployments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(deployments)
}
