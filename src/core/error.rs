//! RG-000: Error taxonomy shared by every stage of a run.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    /// Construction-time or configuration validation failure.
    #[error("{0}")]
    Validation(String),

    #[error("YAML parse error: {0}")]
    Parse(String),

    #[error("no '{name}' parameter defined on {owner}")]
    MissingParameter { owner: String, name: String },

    #[error("role '{role}' references unknown host '{host}'")]
    UnknownHost { role: String, host: String },

    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialize error: {0}")]
    Serialize(String),

    #[error("task runner unavailable: {0}")]
    RunnerUnavailable(String),

    /// Remote access was refused; logged without a cause chain.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("task '{task}' failed with exit code {exit_code}: {stderr}")]
    TaskFailed {
        task: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("{0}")]
    RunFailed(String),
}

impl DeployError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Message followed by every `source()` in the chain, one per line.
    pub fn with_causes(&self) -> String {
        let mut out = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(c) = cause {
            out.push_str("\n  caused by: ");
            out.push_str(&c.to_string());
            cause = c.source();
        }
        out
    }
}
