//! RG-005: Append-only JSONL run journal.

use super::RunLog;
use crate::core::error::DeployError;
use crate::core::types::{LogLevel, RunEvent, TimestampedEvent};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Generate an RFC 3339 UTC timestamp.
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Generate a deployment id.
pub fn generate_run_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("d-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Derive the journal path for a deployment.
pub fn event_log_path(state_dir: &Path, project: &str, deployment: &str) -> PathBuf {
    state_dir
        .join(project)
        .join("deployments")
        .join(format!("{}.jsonl", deployment))
}

/// Append an event to a deployment's journal.
pub fn append_event(
    state_dir: &Path,
    project: &str,
    deployment: &str,
    event: RunEvent,
) -> Result<(), DeployError> {
    let path = event_log_path(state_dir, project, deployment);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| DeployError::io("cannot create state dir", parent, e))?;
    }

    let te = TimestampedEvent {
        ts: now_iso8601(),
        deployment: deployment.to_string(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| DeployError::Serialize(e.to_string()))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| DeployError::io("cannot open journal", &path, e))?;

    writeln!(file, "{}", json).map_err(|e| DeployError::io("cannot write journal", &path, e))?;

    Ok(())
}

/// Read back every event of a deployment's journal.
pub fn read_events(
    state_dir: &Path,
    project: &str,
    deployment: &str,
) -> Result<Vec<TimestampedEvent>, DeployError> {
    let path = event_log_path(state_dir, project, deployment);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| DeployError::io("cannot read journal", &path, e))?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(|e| DeployError::Parse(e.to_string())))
        .collect()
}

/// Journal sink bound to one deployment.
#[derive(Debug, Clone)]
pub struct EventLog {
    state_dir: PathBuf,
    project: String,
    deployment: String,
    level: LogLevel,
}

impl EventLog {
    pub fn new(state_dir: &Path, project: &str, deployment: &str, level: LogLevel) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            project: project.to_string(),
            deployment: deployment.to_string(),
            level,
        }
    }

    pub fn path(&self) -> PathBuf {
        event_log_path(&self.state_dir, &self.project, &self.deployment)
    }
}

impl RunLog for EventLog {
    fn record(&mut self, event: RunEvent) {
        if let Err(e) = append_event(&self.state_dir, &self.project, &self.deployment, event) {
            eprintln!("journal: {}", e);
        }
    }

    fn level(&self) -> LogLevel {
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rg005_now_iso8601() {
        let ts = now_iso8601();
        assert!(ts.starts_with("20"));
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('T'));
    }

    #[test]
    fn test_rg005_generate_run_id() {
        let id = generate_run_id();
        assert!(id.starts_with("d-"));
        assert_eq!(id.len(), 14);
    }

    #[test]
    fn test_rg005_event_log_path() {
        let p = event_log_path(Path::new("/state"), "shop", "d-1");
        assert_eq!(p, PathBuf::from("/state/shop/deployments/d-1.jsonl"));
    }

    #[test]
    fn test_rg005_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        append_event(
            dir.path(),
            "shop",
            "d-1",
            RunEvent::TaskInvoked {
                tasks: vec!["deploy".to_string()],
            },
        )
        .unwrap();
        append_event(
            dir.path(),
            "shop",
            "d-1",
            RunEvent::Log {
                level: LogLevel::Important,
                message: "done".to_string(),
            },
        )
        .unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("shop/deployments/d-1.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"event\":\"task_invoked\""));
        assert!(content.contains("\"deployment\":\"d-1\""));

        let events = read_events(dir.path(), "shop", "d-1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1].event,
            RunEvent::Log {
                level: LogLevel::Important,
                message: "done".to_string(),
            }
        );
    }

    #[test]
    fn test_rg005_read_missing_journal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_events(dir.path(), "shop", "ghost").unwrap().is_empty());
    }

    #[test]
    fn test_rg005_event_log_sink_filters() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = EventLog::new(dir.path(), "shop", "d-2", LogLevel::Important);
        log.important("kept");
        log.info("dropped");
        let events = read_events(dir.path(), "shop", "d-2").unwrap();
        assert_eq!(events.len(), 1);
        assert!(log.path().exists());
    }
}
