//! Journal — structured run log, content hashing.

pub mod eventlog;
pub mod hasher;

use crate::core::types::{LogLevel, RunEvent};

/// Sink for the events of one deployment run.
pub trait RunLog {
    /// Record an event unconditionally.
    fn record(&mut self, event: RunEvent);

    /// Most detailed level this sink keeps.
    fn level(&self) -> LogLevel;

    fn log(&mut self, level: LogLevel, message: &str) {
        if level <= self.level() {
            self.record(RunEvent::Log {
                level,
                message: message.to_string(),
            });
        }
    }

    fn important(&mut self, message: &str) {
        self.log(LogLevel::Important, message);
    }

    fn info(&mut self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn debug(&mut self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn trace(&mut self, message: &str) {
        self.log(LogLevel::Trace, message);
    }
}

/// In-memory sink, for callers that inspect events instead of persisting them.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    pub level: LogLevel,
    pub events: Vec<RunEvent>,
}

impl MemoryLog {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            events: Vec::new(),
        }
    }

    /// Messages logged at `level`, in order.
    pub fn messages(&self, level: LogLevel) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RunEvent::Log { level: l, message } if *l == level => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl RunLog for MemoryLog {
    fn record(&mut self, event: RunEvent) {
        self.events.push(event);
    }

    fn level(&self) -> LogLevel {
        self.level
    }
}

impl<L: RunLog + ?Sized> RunLog for &mut L {
    fn record(&mut self, event: RunEvent) {
        (**self).record(event);
    }

    fn level(&self) -> LogLevel {
        (**self).level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rg005_level_filter() {
        let mut log = MemoryLog::new(LogLevel::Info);
        log.important("a");
        log.info("b");
        log.debug("c");
        log.trace("d");
        assert_eq!(log.events.len(), 2);
        assert_eq!(log.messages(LogLevel::Important), vec!["a"]);
        assert_eq!(log.messages(LogLevel::Info), vec!["b"]);
    }

    #[test]
    fn test_rg005_record_bypasses_filter() {
        let mut log = MemoryLog::new(LogLevel::Important);
        log.record(RunEvent::TaskInvoked {
            tasks: vec!["deploy".to_string()],
        });
        assert_eq!(log.events.len(), 1);
    }

    #[test]
    fn test_rg005_mut_ref_forwards() {
        fn emit<L: RunLog>(mut sink: L) {
            sink.trace("through a reference");
        }
        let mut log = MemoryLog::new(LogLevel::Trace);
        emit(&mut log);
        assert_eq!(log.messages(LogLevel::Trace), vec!["through a reference"]);
    }
}
