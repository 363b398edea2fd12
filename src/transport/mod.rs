//! RG-007: Task runner boundary — invocation contract and output capture.

pub mod local;

use crate::core::error::DeployError;
use crate::core::types::RunOptions;
use std::ffi::OsString;
use std::path::Path;

/// Environment variable carrying the deployment id for the run's duration.
pub const DEPLOYMENT_ENV: &str = "deployment_id";

/// What the runner reports back for one invocation.
#[derive(Debug)]
pub enum RunnerSignal {
    /// Tasks ran to completion.
    Completed,
    /// The runner stopped deliberately; not an error.
    Aborted,
    Failed(DeployError),
}

/// Everything a runner needs to know about the current run.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// Directory holding the generated artifacts
    pub project_dir: &'a Path,
    pub stage: &'a str,
    pub deployment_id: &'a str,
    pub options: &'a RunOptions,
}

/// External task runner executing the generated scripts.
pub trait TaskRunner {
    /// Make the runner's extension modules available.
    fn load_requirements(&mut self, invocation: &Invocation<'_>) -> Result<(), DeployError>;

    /// Load the stage definition.
    fn load_stage(
        &mut self,
        invocation: &Invocation<'_>,
        capture: &mut OutputCapture,
    ) -> RunnerSignal;

    /// Run named tasks against the loaded stage.
    fn invoke(
        &mut self,
        invocation: &Invocation<'_>,
        tasks: &[String],
        capture: &mut OutputCapture,
    ) -> RunnerSignal;
}

impl<R: TaskRunner + ?Sized> TaskRunner for &mut R {
    fn load_requirements(&mut self, invocation: &Invocation<'_>) -> Result<(), DeployError> {
        (**self).load_requirements(invocation)
    }

    fn load_stage(
        &mut self,
        invocation: &Invocation<'_>,
        capture: &mut OutputCapture,
    ) -> RunnerSignal {
        (**self).load_stage(invocation, capture)
    }

    fn invoke(
        &mut self,
        invocation: &Invocation<'_>,
        tasks: &[String],
        capture: &mut OutputCapture,
    ) -> RunnerSignal {
        (**self).invoke(invocation, tasks, capture)
    }
}

/// Scoped capture of runner output.
///
/// While alive, the named environment variable holds the run's value.
/// Dropping the capture (or calling [`OutputCapture::finish`]) restores the
/// variable to what it was before, on every exit path.
#[derive(Debug)]
pub struct OutputCapture {
    buffer: String,
    env_key: String,
    previous: Option<OsString>,
}

impl OutputCapture {
    pub fn begin(env_key: &str, value: &str) -> Self {
        let previous = std::env::var_os(env_key);
        std::env::set_var(env_key, value);
        Self {
            buffer: String::new(),
            env_key: env_key.to_string(),
            previous,
        }
    }

    /// Append runner output.
    pub fn push(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Release the scope and hand back everything captured.
    pub fn finish(mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

impl Drop for OutputCapture {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(v) => std::env::set_var(&self.env_key, v),
            None => std::env::remove_var(&self.env_key),
        }
    }
}
