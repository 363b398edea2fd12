//! RG-008: Subprocess task runner.
//!
//! Drives the runner binary once per invocation from inside the project
//! directory: `<command> [--set k=v].. <stage> <tasks..>`. The generated
//! Capfile wires the stage, post-load variables and extra recipes.
//! The child inherits `deployment_id` so hooks can correlate their output.

use super::{Invocation, OutputCapture, RunnerSignal, TaskRunner, DEPLOYMENT_ENV};
use crate::core::error::DeployError;
use crate::core::literal;
use crate::core::types::{ConfigurationParameter, RunOptions, RunnerSettings};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Name of the runner entry file written next to the artifacts.
pub const CAPFILE: &str = "Capfile";

/// Output from one runner process.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Task runner backed by an external executable.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    settings: RunnerSettings,
    program: Option<PathBuf>,
}

impl CommandRunner {
    pub fn new(settings: RunnerSettings) -> Self {
        Self {
            settings,
            program: None,
        }
    }

    /// Capfile content. The stage task is defined here rather than discovered
    /// from the stage directory, so `deploy.rb` is never mistaken for a stage
    /// and plugin hooks that walk the stage list see nothing to hook.
    /// Post-load variables are set inside the stage task, after both
    /// configuration scripts have been loaded.
    pub fn capfile(&self, stage: &str, options: &RunOptions) -> String {
        let mut out = String::from("include Capistrano::DSL\n\n");
        out.push_str("set :deploy_config_path, 'deploy.rb'\n\n");
        out.push_str("namespace :load do\n  task :defaults do\n");
        out.push_str("    load 'capistrano/defaults.rb'\n  end\nend\n\n");

        out.push_str(&format!("task '{}' do\n", stage));
        out.push_str(&format!("  set :stage, :'{}'\n", stage));
        out.push_str("  invoke 'load:defaults'\n");
        out.push_str("  load 'deploy.rb'\n");
        out.push_str(&format!("  load '{}.rb'\n", stage));
        let no_prompts: HashMap<String, String> = HashMap::new();
        for (k, v) in &options.vars {
            let parameter = ConfigurationParameter::new(k, v);
            if let Some(line) = literal::render_parameter(&parameter, &no_prompts) {
                out.push_str(&format!("  {}\n", line));
            }
        }
        out.push_str("  configure_scm\n  configure_backend\nend\n\n");

        for r in &self.settings.requirements {
            out.push_str(&format!("require '{}'\n", r));
        }

        out.push_str("\ntask :custom_log do |t|\n");
        out.push_str(&format!(
            "  puts \"[#{{ENV['{}']}}] checkpoint reached at #{{Time.now.utc}}\"\n",
            DEPLOYMENT_ENV
        ));
        out.push_str("  t.reenable\nend\n");

        if !options.recipes.is_empty() {
            out.push('\n');
        }
        for recipe in &options.recipes {
            out.push_str(&format!("load '{}'\n", recipe));
        }
        out
    }

    /// Command-line arguments for a task invocation. Only pre-load variables
    /// travel on the command line; the runner applies them while parsing
    /// options, before the Capfile and stage are read.
    pub fn arguments(&self, invocation: &Invocation<'_>, tasks: &[String]) -> Vec<String> {
        let mut args = Vec::new();
        for (k, v) in &invocation.options.pre_vars {
            args.push("--set".to_string());
            args.push(format!("{}={}", k, v));
        }
        args.push(invocation.stage.to_string());
        args.extend(tasks.iter().cloned());
        args
    }

    fn exec(&self, invocation: &Invocation<'_>, args: &[String]) -> Result<ExecOutput, DeployError> {
        let program = self
            .program
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.settings.command));

        let output = Command::new(&program)
            .args(args)
            .current_dir(invocation.project_dir)
            .env(DEPLOYMENT_ENV, invocation.deployment_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| DeployError::io("failed to spawn", &program, e))?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Reduce a finished process to a runner signal.
    pub fn classify(&self, task: &str, out: &ExecOutput) -> RunnerSignal {
        if out.success() {
            return RunnerSignal::Completed;
        }
        if out.stdout.contains(&self.settings.abort_marker)
            || out.stderr.contains(&self.settings.abort_marker)
        {
            return RunnerSignal::Aborted;
        }
        if let Some(line) = out
            .stderr
            .lines()
            .find(|l| l.contains(&self.settings.auth_failure_marker))
        {
            let detail = line
                .split_once(&self.settings.auth_failure_marker)
                .map(|(_, rest)| rest.trim_start_matches([':', ' ', '(', ')']).trim())
                .filter(|rest| !rest.is_empty())
                .unwrap_or(line.trim());
            return RunnerSignal::Failed(DeployError::AuthenticationFailed(detail.to_string()));
        }
        RunnerSignal::Failed(DeployError::TaskFailed {
            task: task.to_string(),
            exit_code: out.exit_code,
            stderr: out.stderr.trim().lines().last().unwrap_or("").to_string(),
        })
    }
}

impl TaskRunner for CommandRunner {
    fn load_requirements(&mut self, invocation: &Invocation<'_>) -> Result<(), DeployError> {
        let program = which::which(&self.settings.command)
            .map_err(|e| DeployError::RunnerUnavailable(format!("{}: {}", self.settings.command, e)))?;
        self.program = Some(program);

        let path = invocation.project_dir.join(CAPFILE);
        let content = self.capfile(invocation.stage, invocation.options);
        std::fs::write(&path, content).map_err(|e| DeployError::io("cannot write", &path, e))
    }

    fn load_stage(
        &mut self,
        invocation: &Invocation<'_>,
        capture: &mut OutputCapture,
    ) -> RunnerSignal {
        let path = invocation
            .project_dir
            .join(format!("{}.rb", invocation.stage));
        if path.is_file() {
            capture.push(&format!("loaded stage {}\n", invocation.stage));
            RunnerSignal::Completed
        } else {
            RunnerSignal::Failed(DeployError::io(
                "stage definition missing",
                &path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ))
        }
    }

    fn invoke(
        &mut self,
        invocation: &Invocation<'_>,
        tasks: &[String],
        capture: &mut OutputCapture,
    ) -> RunnerSignal {
        if tasks.is_empty() {
            return RunnerSignal::Completed;
        }
        let args = self.arguments(invocation, tasks);
        match self.exec(invocation, &args) {
            Ok(out) => {
                capture.push(&out.stdout);
                capture.push(&out.stderr);
                self.classify(&tasks.join(" "), &out)
            }
            Err(e) => RunnerSignal::Failed(e),
        }
    }
}
