//! RG-011: Executor — one deployment run, start to verdict.
//!
//! directory → artifacts → requirements → capture → stage + hooks + actions
//! → release capture → classify. Every error stops at this boundary and
//! becomes a failed run; nothing propagates out of `execute`.

use super::codegen;
use super::error::DeployError;
use super::parser;
use super::state;
use super::types::*;
use crate::journal::{hasher, RunLog};
use crate::transport::{Invocation, OutputCapture, RunnerSignal, TaskRunner, DEPLOYMENT_ENV};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Result of one `execute` pass.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Everything the runner wrote while the capture was held
    pub output: String,
    pub duration: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }
}

/// Drives a single deployment through the task runner.
pub struct Deployer<'a, R: TaskRunner, L: RunLog> {
    config: &'a RiggerConfig,
    stage: &'a Stage,
    deployment: Deployment,
    options: RunOptions,
    runner: R,
    logger: L,
    output: Option<String>,
    /// Environment variable carrying the deployment id while the runner works
    env_key: String,
}

impl<'a, R: TaskRunner, L: RunLog> Deployer<'a, R, L> {
    /// Bind a deployment to its stage. A pending deployment left with no
    /// roles once excluded hosts are dropped is rejected before anything runs.
    pub fn new(
        config: &'a RiggerConfig,
        deployment: Deployment,
        runner: R,
        logger: L,
    ) -> Result<Self, DeployError> {
        let stage = config.project.stage(&deployment.stage).ok_or_else(|| {
            DeployError::Validation(format!(
                "stage '{}' does not exist in project '{}'",
                deployment.stage, config.project.name
            ))
        })?;

        if !parser::is_path_component(&deployment.id) {
            return Err(DeployError::Validation(format!(
                "deployment id '{}' cannot be used as a file name",
                deployment.id
            )));
        }

        let targeted = stage
            .roles
            .iter()
            .filter(|role| !deployment.is_excluded(&role.host))
            .count();
        if deployment.status == DeploymentStatus::Pending && targeted == 0 {
            return Err(DeployError::Validation(
                "The given deployment has no roles and thus can not be deployed!".to_string(),
            ));
        }

        Ok(Self {
            config,
            stage,
            deployment,
            options: RunOptions::default(),
            runner,
            logger,
            output: None,
            env_key: DEPLOYMENT_ENV.to_string(),
        })
    }

    /// Export the deployment id under another variable name.
    pub fn with_env_key(mut self, key: &str) -> Self {
        self.env_key = key.to_string();
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn into_deployment(self) -> Deployment {
        self.deployment
    }

    /// Output captured by the last run, if any.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn logger(&self) -> &L {
        &self.logger
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn project_dir(&self) -> PathBuf {
        codegen::project_dir(&self.config.settings.root, &self.config.project)
    }

    fn state_dir(&self) -> &Path {
        &self.config.settings.state_dir
    }

    /// Record this process as the one running the deployment.
    pub fn save_pid(&mut self) -> Result<(), DeployError> {
        self.deployment.pid = Some(std::process::id());
        self.deployment.status = DeploymentStatus::Running;
        self.persist()
    }

    fn persist(&self) -> Result<(), DeployError> {
        state::save_deployment(
            self.state_dir(),
            &self.config.project.dir_name(),
            &self.deployment,
        )
    }

    /// Run the deployment's own task and record the verdict on it.
    pub fn invoke_task(&mut self) -> bool {
        self.options.actions = vec![self.deployment.task.clone()];

        let succeeded = self.execute().succeeded();
        if succeeded {
            self.deployment.complete_successfully();
        } else {
            self.deployment.complete_with_error();
        }

        if let Err(e) = self.persist() {
            self.logger
                .important(&format!("could not record deployment status: {}", e));
        }
        succeeded
    }

    /// Run the full pipeline once.
    pub fn execute(&mut self) -> RunReport {
        let start = Instant::now();

        self.logger.record(RunEvent::RunStarted {
            project: self.config.project.name.clone(),
            stage: self.stage.name.clone(),
            actions: self.options.actions.clone(),
            rigger_version: env!("CARGO_PKG_VERSION").to_string(),
        });

        let project_dir = self.project_dir();
        let (outcome, output) = match self.prepare(&project_dir) {
            Ok(()) => {
                let mut capture = OutputCapture::begin(&self.env_key, &self.deployment.id);
                let signal = self.invoke(&project_dir, &mut capture);
                let output = capture.finish();
                (self.classify(signal), output)
            }
            Err(e) => {
                self.handle_error(&e);
                (RunOutcome::Failed, String::new())
            }
        };

        let duration = start.elapsed();
        self.logger.record(RunEvent::RunCompleted {
            outcome,
            total_seconds: duration.as_secs_f64(),
        });
        self.output = Some(output.clone());

        RunReport {
            outcome,
            output,
            duration,
        }
    }

    /// Directory, artifacts, runner requirements.
    fn prepare(&mut self, project_dir: &Path) -> Result<(), DeployError> {
        std::fs::create_dir_all(project_dir)
            .map_err(|e| DeployError::io("cannot create project dir", project_dir, e))?;

        self.write_deploy(project_dir)?;
        self.write_stage(project_dir)?;

        let invocation = Invocation {
            project_dir,
            stage: &self.stage.name,
            deployment_id: &self.deployment.id,
            options: &self.options,
        };
        self.runner.load_requirements(&invocation)
    }

    fn write_deploy(&mut self, project_dir: &Path) -> Result<(), DeployError> {
        let paths = codegen::artifact_paths(project_dir, self.stage);
        self.logger.info(&format!(
            "Writing deploy configuration to {}/{}",
            self.config.project.dir_name(),
            codegen::PROJECT_SCRIPT
        ));
        let script = codegen::project_script(&self.config.project, self.stage, &self.deployment);
        self.write_artifact(&paths.project_script, &script)
    }

    fn write_stage(&mut self, project_dir: &Path) -> Result<(), DeployError> {
        let paths = codegen::artifact_paths(project_dir, self.stage);
        self.logger.info(&format!(
            "Writing stage configuration to {}/{}.rb",
            self.config.project.dir_name(),
            self.stage.name
        ));
        let script = codegen::stage_script(
            &self.config.project,
            self.stage,
            &self.config.hosts,
            &self.deployment,
        )?;
        self.write_artifact(&paths.stage_script, &script)
    }

    fn write_artifact(&mut self, path: &Path, script: &str) -> Result<(), DeployError> {
        codegen::write_artifact(path, script)?;
        self.logger.record(RunEvent::ArtifactWritten {
            path: path.display().to_string(),
            lines: script.lines().count(),
            hash: hasher::hash_string(script),
        });
        Ok(())
    }

    /// Stage, post-load hooks, then the requested actions. Stops at the
    /// first signal that is not `Completed`.
    fn invoke(&mut self, project_dir: &Path, capture: &mut OutputCapture) -> RunnerSignal {
        let invocation = Invocation {
            project_dir,
            stage: &self.stage.name,
            deployment_id: &self.deployment.id,
            options: &self.options,
        };

        self.logger.debug(&format!("loading stage {}", self.stage.name));
        match self.runner.load_stage(&invocation, capture) {
            RunnerSignal::Completed => {}
            other => return other,
        }

        let batches = [
            self.config.settings.runner.post_load_hooks.as_slice(),
            self.options.actions.as_slice(),
        ];
        for tasks in batches {
            if tasks.is_empty() {
                continue;
            }
            self.logger.record(RunEvent::TaskInvoked {
                tasks: tasks.to_vec(),
            });
            match self.runner.invoke(&invocation, tasks, capture) {
                RunnerSignal::Completed => {}
                other => return other,
            }
        }
        RunnerSignal::Completed
    }

    fn classify(&mut self, signal: RunnerSignal) -> RunOutcome {
        match signal {
            RunnerSignal::Completed => RunOutcome::Succeeded,
            RunnerSignal::Aborted => {
                self.logger.info("run aborted by the task runner");
                RunOutcome::Aborted
            }
            RunnerSignal::Failed(e) => {
                self.handle_error(&e);
                RunOutcome::Failed
            }
        }
    }

    fn handle_error(&mut self, error: &DeployError) {
        match error {
            DeployError::AuthenticationFailed(who) => {
                self.logger
                    .important(&format!("authentication failed for `{}'", who));
            }
            other => self.logger.important(&other.with_causes()),
        }
    }
}
