//! Scripted test doubles for driving the engine without touching the host.
//!
//! [`MockRunner`] records every command and answers with per-program
//! handlers (success with empty output by default). [`RecordingReporter`]
//! keeps every progress and error report. Both are cheap to clone and
//! clones share state, so a test keeps one copy while the engine owns another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::progress::{ErrorReport, ProgressUpdate, Reporter};
use crate::runner::{CommandOutput, CommandSpec, ProcessRunner};

type Handler = Box<dyn FnMut(&CommandSpec) -> CommandOutput + Send>;

#[derive(Default)]
struct MockState {
    calls: Vec<CommandSpec>,
    handlers: HashMap<String, Handler>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Default)]
pub struct MockRunner {
    state: Arc<Mutex<MockState>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call to `program` with `handler`; chrooted calls match on the inner program
    pub fn on(
        &self,
        program: &str,
        handler: impl FnMut(&CommandSpec) -> CommandOutput + Send + 'static,
    ) -> &Self {
        lock(&self.state)
            .handlers
            .insert(program.to_string(), Box::new(handler));
        self
    }

    /// Make every call to `program` exit with `code`
    pub fn fail(&self, program: &str, code: i32) -> &Self {
        self.on(program, move |_| CommandOutput::exited(code))
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        lock(&self.state).calls.clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }

    /// Every recorded argv joined with spaces, in call order
    pub fn command_lines(&self) -> Vec<String> {
        lock(&self.state)
            .calls
            .iter()
            .map(|c| c.argv().join(" "))
            .collect()
    }

    fn answer(&self, command: &CommandSpec) -> CommandOutput {
        let mut state = lock(&self.state);
        state.calls.push(command.clone());
        match state.handlers.get_mut(&command.program) {
            Some(handler) => handler(command),
            None => CommandOutput::ok(""),
        }
    }
}

impl std::fmt::Debug for MockRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRunner")
            .field("calls", &lock(&self.state).calls.len())
            .finish_non_exhaustive()
    }
}

impl ProcessRunner for MockRunner {
    fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        Ok(self.answer(command))
    }

    fn run_streaming(
        &self,
        command: &CommandSpec,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput> {
        let mut output = self.answer(command);
        for line in output.stdout.lines() {
            on_line(line);
        }
        output.stdout.clear();
        Ok(output)
    }
}

/// Reporter that keeps everything it is told
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    updates: Arc<Mutex<Vec<ProgressUpdate>>>,
    errors: Arc<Mutex<Vec<ErrorReport>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        lock(&self.updates).clone()
    }

    pub fn errors(&self) -> Vec<ErrorReport> {
        lock(&self.errors).clone()
    }

    pub fn finished_count(&self) -> usize {
        lock(&self.updates).iter().filter(|u| u.done).count()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.updates).iter().map(|u| u.message.clone()).collect()
    }
}

impl Reporter for RecordingReporter {
    fn progress(&self, update: ProgressUpdate) {
        lock(&self.updates).push(update);
    }

    fn error(&self, report: ErrorReport) {
        lock(&self.errors).push(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_runner_records_and_dispatches() {
        let runner = MockRunner::new();
        runner.on("blkid", |_| CommandOutput::ok("1234-ABCD\n"));

        let out = runner.run(&CommandSpec::new("blkid").arg("/dev/sda1")).unwrap();
        assert_eq!(out.stdout, "1234-ABCD\n");

        let out = runner.run(&CommandSpec::new("mount")).unwrap();
        assert!(out.success);
        assert_eq!(runner.command_lines(), vec!["blkid /dev/sda1", "mount"]);
    }

    #[test]
    fn test_streaming_splits_stdout() {
        let runner = MockRunner::new();
        runner.on("rsync", |_| CommandOutput::ok("bin/\nusr/\n"));
        let mut seen = Vec::new();
        let out = runner
            .run_streaming(&CommandSpec::new("rsync"), &mut |l| seen.push(l.to_string()))
            .unwrap();
        assert_eq!(seen, vec!["bin/", "usr/"]);
        assert!(out.stdout.is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let runner = MockRunner::new();
        let engine_copy = runner.clone();
        engine_copy.fail("parted", 1);
        let out = engine_copy.run(&CommandSpec::new("parted")).unwrap();
        assert!(!out.success);
        assert_eq!(runner.calls_to("parted").len(), 1);
    }
}
