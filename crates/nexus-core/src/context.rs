//! Per-run execution context

use crate::output::OutputFormat;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Lifecycle of one run. `Reported` is reached exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Executing,
    Completed,
    Failed,
    Reported,
}

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub source_name: String,
    /// Injected as `COMMAND`
    pub command: String,
    /// Injected as `ARGS`
    pub args: Vec<String>,
    pub format: OutputFormat,
    pub started_at: DateTime<Utc>,
    started: Instant,
    phase: Phase,
}

impl ExecutionContext {
    pub fn new(source_name: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source_name: source_name.into(),
            command: String::new(),
            args: Vec::new(),
            format,
            started_at: Utc::now(),
            started: Instant::now(),
            phase: Phase::Idle,
        }
    }

    pub fn with_args(mut self, command: impl Into<String>, args: Vec<String>) -> Self {
        self.command = command.into();
        self.args = args;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn enter(&mut self, phase: Phase) {
        debug!(run_id = %self.run_id, from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context() {
        let ctx = ExecutionContext::new("hello.rhai", OutputFormat::Json)
            .with_args("greet", vec!["world".into()]);
        assert_eq!(ctx.phase(), Phase::Idle);
        assert_eq!(ctx.command, "greet");
        assert_eq!(ctx.args, vec!["world"]);
        assert_eq!(ctx.format, OutputFormat::Json);
    }

    #[test]
    fn test_run_ids_unique() {
        let a = ExecutionContext::new("a", OutputFormat::Tui);
        let b = ExecutionContext::new("a", OutputFormat::Tui);
        assert_ne!(a.run_id, b.run_id);
    }
}
