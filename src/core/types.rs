//! RG-001: Record types for projects, stages, deployments, and run events.
//!
//! Defines the YAML schema of `rigger.yaml` (settings, hosts, project tree),
//! the deployment record persisted under the state directory, and the
//! events written to the JSONL journal.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Top-level rigger.yaml
// ============================================================================

/// Root configuration: the records a deployment is generated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiggerConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Paths and runner settings
    #[serde(default)]
    pub settings: Settings,

    /// Host inventory, keyed by host id
    #[serde(default)]
    pub hosts: IndexMap<String, Host>,

    /// The project being deployed
    pub project: Project,
}

/// Where artifacts and state live, and how the task runner is driven.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory for generated artifacts
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Directory holding deployment records and journals
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub runner: RunnerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: default_root(),
            state_dir: default_state_dir(),
            runner: RunnerSettings::default(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("projects")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

/// External task runner invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Runner executable
    #[serde(default = "default_command")]
    pub command: String,

    /// Extension modules required by the generated scripts
    #[serde(default = "default_requirements")]
    pub requirements: Vec<String>,

    /// Tasks run right after the stage is loaded
    #[serde(default = "default_post_load_hooks")]
    pub post_load_hooks: Vec<String>,

    /// Output text that marks a deliberate stop by the runner
    #[serde(default = "default_abort_marker")]
    pub abort_marker: String,

    /// Error text that marks a refused remote login
    #[serde(default = "default_auth_failure_marker")]
    pub auth_failure_marker: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            command: default_command(),
            requirements: default_requirements(),
            post_load_hooks: default_post_load_hooks(),
            abort_marker: default_abort_marker(),
            auth_failure_marker: default_auth_failure_marker(),
        }
    }
}

fn default_command() -> String {
    "cap".to_string()
}

fn default_requirements() -> Vec<String> {
    [
        "capistrano/deploy",
        "capistrano/rvm",
        "capistrano/bundler",
        "capistrano/rails/migrations",
        "capistrano/rails/assets",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_post_load_hooks() -> Vec<String> {
    ["rvm:hook", "rvm:check", "bundler:map_bins"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_abort_marker() -> String {
    "capistrano_abort".to_string()
}

fn default_auth_failure_marker() -> String {
    "Net::SSH::AuthenticationFailed".to_string()
}

// ============================================================================
// Project tree
// ============================================================================

/// A target host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    /// DNS name or address written into role lines
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,
}

/// A name/raw-value pair, optionally satisfied by a prompt at deploy time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationParameter {
    pub name: String,

    /// Raw, untyped value as stored
    #[serde(default)]
    pub value: String,

    /// Take the value from the deployment's prompt mapping instead
    #[serde(default)]
    pub prompt: bool,
}

impl ConfigurationParameter {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            prompt: false,
        }
    }

    pub fn prompted(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: String::new(),
            prompt: true,
        }
    }
}

/// A named group of hosts on a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,

    /// Host id (key into `hosts`)
    pub host: String,

    /// Record flag carried from the store (informational)
    #[serde(default)]
    pub exclusion: bool,
}

/// An opaque block of runner script text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(default)]
    pub name: Option<String>,
    pub body: String,
}

/// A deployment target environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,

    #[serde(default)]
    pub roles: Vec<Role>,

    #[serde(default)]
    pub parameters: Vec<ConfigurationParameter>,

    #[serde(default)]
    pub recipes: Vec<Recipe>,
}

/// A deployable project with its global parameters and stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,

    #[serde(default)]
    pub parameters: Vec<ConfigurationParameter>,

    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl Project {
    /// Directory name for this project's artifacts and state.
    pub fn dir_name(&self) -> String {
        self.name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect()
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn parameter(&self, name: &str) -> Option<&ConfigurationParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

// ============================================================================
// Deployments
// ============================================================================

/// Lifecycle of a deployment record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// One request to run a task against a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,

    /// Stage name
    pub stage: String,

    /// Requested task (e.g. `deploy`)
    pub task: String,

    /// Host ids left out of the role list
    #[serde(default)]
    pub excluded_host_ids: Vec<String>,

    /// Values for prompted parameters, by parameter name
    #[serde(default)]
    pub prompt_config: HashMap<String, String>,

    #[serde(default)]
    pub status: DeploymentStatus,

    /// Process running this deployment, for out-of-band cancellation
    #[serde(default)]
    pub pid: Option<u32>,

    pub created_at: String,

    #[serde(default)]
    pub completed_at: Option<String>,
}

impl Deployment {
    pub fn new(id: &str, stage: &str, task: &str) -> Self {
        Self {
            id: id.to_string(),
            stage: stage.to_string(),
            task: task.to_string(),
            excluded_host_ids: Vec::new(),
            prompt_config: HashMap::new(),
            status: DeploymentStatus::Pending,
            pid: None,
            created_at: crate::journal::eventlog::now_iso8601(),
            completed_at: None,
        }
    }

    pub fn is_excluded(&self, host_id: &str) -> bool {
        self.excluded_host_ids.iter().any(|h| h == host_id)
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            self.status,
            DeploymentStatus::Succeeded | DeploymentStatus::Failed
        )
    }

    pub fn complete_successfully(&mut self) {
        self.complete(DeploymentStatus::Succeeded);
    }

    pub fn complete_with_error(&mut self) {
        self.complete(DeploymentStatus::Failed);
    }

    fn complete(&mut self, status: DeploymentStatus) {
        self.status = status;
        self.completed_at = Some(crate::journal::eventlog::now_iso8601());
    }
}

/// Options handed to the task runner for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Extra recipe files for the runner to load
    pub recipes: Vec<String>,
    /// Tasks to invoke after the stage is loaded
    pub actions: Vec<String>,
    /// Variables set after the stage is loaded
    pub vars: IndexMap<String, String>,
    /// Variables set before the stage is loaded
    pub pre_vars: IndexMap<String, String>,
    /// Journal verbosity, 0 (important only) to 3 (trace)
    pub verbose: u8,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            recipes: Vec::new(),
            actions: Vec::new(),
            vars: IndexMap::new(),
            pre_vars: IndexMap::new(),
            verbose: 3,
        }
    }
}

// ============================================================================
// Journal events
// ============================================================================

/// Journal severity, most important first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Important,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map a `verbose` option to the most detailed level it admits.
    pub fn from_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => Self::Important,
            1 => Self::Info,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Important => write!(f, "important"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Aborted,
    Failed,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Aborted => write!(f, "ABORTED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Event for the JSONL run journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        project: String,
        stage: String,
        actions: Vec<String>,
        rigger_version: String,
    },
    ArtifactWritten {
        path: String,
        lines: usize,
        hash: String,
    },
    TaskInvoked {
        tasks: Vec<String>,
    },
    Log {
        level: LogLevel,
        message: String,
    },
    RunCompleted {
        outcome: RunOutcome,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    pub deployment: String,
    #[serde(flatten)]
    pub event: RunEvent,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rg001_config_parse() {
        let yaml = r#"
version: "1.0"
hosts:
  web1:
    name: web1.example.com
project:
  name: Shop
  parameters:
    - name: user
      value: deploy
    - name: branch
      prompt: true
  stages:
    - name: production
      roles:
        - name: app
          host: web1
      recipes:
        - body: "namespace :x do; end"
"#;
        let config: RiggerConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.hosts["web1"].name, "web1.example.com");
        assert_eq!(config.project.parameters.len(), 2);
        assert!(config.project.parameters[1].prompt);
        assert_eq!(config.project.parameters[1].value, "");
        let stage = config.project.stage("production").unwrap();
        assert_eq!(stage.roles[0].host, "web1");
        assert!(!stage.roles[0].exclusion);
        assert_eq!(stage.recipes[0].name, None);
    }

    #[test]
    fn test_rg001_settings_defaults() {
        let s = Settings::default();
        assert_eq!(s.root, PathBuf::from("projects"));
        assert_eq!(s.state_dir, PathBuf::from("state"));
        assert_eq!(s.runner.command, "cap");
        assert_eq!(
            s.runner.post_load_hooks,
            vec!["rvm:hook", "rvm:check", "bundler:map_bins"]
        );
        assert_eq!(s.runner.requirements.len(), 5);
    }

    #[test]
    fn test_rg001_partial_runner_settings() {
        let yaml = r#"
runner:
  command: /usr/local/bin/cap
"#;
        let s: Settings = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(s.runner.command, "/usr/local/bin/cap");
        assert_eq!(s.runner.abort_marker, "capistrano_abort");
        assert_eq!(s.root, PathBuf::from("projects"));
    }

    #[test]
    fn test_rg001_project_dir_name() {
        let p = Project {
            name: "My Shop-2".to_string(),
            parameters: vec![],
            stages: vec![],
        };
        assert_eq!(p.dir_name(), "my_shop_2");
    }

    #[test]
    fn test_rg001_project_lookup() {
        let p = Project {
            name: "shop".to_string(),
            parameters: vec![ConfigurationParameter::new("user", "deploy")],
            stages: vec![Stage {
                name: "staging".to_string(),
                roles: vec![],
                parameters: vec![],
                recipes: vec![],
            }],
        };
        assert!(p.stage("staging").is_some());
        assert!(p.stage("production").is_none());
        assert_eq!(p.parameter("user").unwrap().value, "deploy");
        assert!(p.parameter("group").is_none());
    }

    #[test]
    fn test_rg001_deployment_completion() {
        let mut d = Deployment::new("d-1", "production", "deploy");
        assert_eq!(d.status, DeploymentStatus::Pending);
        assert!(!d.is_completed());
        d.complete_with_error();
        assert_eq!(d.status, DeploymentStatus::Failed);
        assert!(d.is_completed());
        assert!(d.completed_at.is_some());

        let mut d2 = Deployment::new("d-2", "production", "deploy");
        d2.complete_successfully();
        assert_eq!(d2.status, DeploymentStatus::Succeeded);
    }

    #[test]
    fn test_rg001_deployment_excluded() {
        let mut d = Deployment::new("d-1", "production", "deploy");
        d.excluded_host_ids.push("web2".to_string());
        assert!(d.is_excluded("web2"));
        assert!(!d.is_excluded("web1"));
    }

    #[test]
    fn test_rg001_run_options_defaults() {
        let o = RunOptions::default();
        assert!(o.recipes.is_empty());
        assert!(o.actions.is_empty());
        assert_eq!(o.verbose, 3);
    }

    #[test]
    fn test_rg001_log_level_order() {
        assert!(LogLevel::Important < LogLevel::Info);
        assert!(LogLevel::Debug < LogLevel::Trace);
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Important);
        assert_eq!(LogLevel::from_verbosity(2), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(9), LogLevel::Trace);
    }

    #[test]
    fn test_rg001_status_display() {
        assert_eq!(DeploymentStatus::Succeeded.to_string(), "SUCCEEDED");
        assert_eq!(RunOutcome::Aborted.to_string(), "ABORTED");
    }

    #[test]
    fn test_rg001_run_event_serde() {
        let event = RunEvent::Log {
            level: LogLevel::Important,
            message: "boom".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"log\""));
        assert!(json.contains("\"level\":\"important\""));
    }

    #[test]
    fn test_rg001_deployment_roundtrip() {
        let mut d = Deployment::new("d-7", "staging", "deploy:migrations");
        d.prompt_config
            .insert("branch".to_string(), "main".to_string());
        let yaml = serde_yaml_ng::to_string(&d).unwrap();
        let d2: Deployment = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(d2.task, "deploy:migrations");
        assert_eq!(d2.prompt_config["branch"], "main");
        assert_eq!(d2.status, DeploymentStatus::Pending);
    }
}
