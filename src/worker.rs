//! Runs an installation on a dedicated background thread.
//!
//! The engine blocks for hours; the caller keeps its own thread free for
//! display. Reports cross back over an `mpsc` channel as [`EngineEvent`]s.
//! The event channel disconnects when the worker exits, so draining
//! [`InstallHandle::events`] until it ends and then calling
//! [`InstallHandle::join`] observes the whole run.

use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};

use crate::config::EngineConfig;
use crate::engine::InstallationEngine;
use crate::error::{InstallerError, Result};
use crate::progress::{ErrorReport, ProgressUpdate, Reporter};
use crate::runner::ProcessRunner;
use crate::setup::Setup;

/// Something the engine wants the caller to know
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Progress(ProgressUpdate),
    Error(ErrorReport),
    /// Custom setup: stages 1-7 are done and the worker waits for
    /// [`InstallHandle::resume`] before running stages 8-11
    AwaitingResume,
}

/// [`Reporter`] that forwards every report to the caller thread
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: Sender<EngineEvent>,
}

impl ChannelReporter {
    pub fn new(tx: Sender<EngineEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: EngineEvent) {
        // A caller that stopped listening only loses display updates
        if self.tx.send(event).is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }
}

impl Reporter for ChannelReporter {
    fn progress(&self, update: ProgressUpdate) {
        self.send(EngineEvent::Progress(update));
    }

    fn error(&self, report: ErrorReport) {
        self.send(EngineEvent::Error(report));
    }
}

/// Caller side of a running installation
#[derive(Debug)]
pub struct InstallHandle {
    events: Receiver<EngineEvent>,
    resume: SyncSender<()>,
    worker: JoinHandle<Result<()>>,
}

impl InstallHandle {
    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.events
    }

    /// Let a paused custom-setup run continue with stages 8-11
    pub fn resume(&self) -> Result<()> {
        self.resume
            .send(())
            .map_err(|_| InstallerError::state("installation worker is no longer running"))
    }

    /// Wait for the worker and return the run's outcome
    pub fn join(self) -> Result<()> {
        self.worker
            .join()
            .map_err(|_| InstallerError::state("installation worker panicked"))?
    }
}

/// Move a new engine onto its own thread and start the run
pub fn spawn_installation<R>(setup: Setup, config: EngineConfig, runner: R) -> Result<InstallHandle>
where
    R: ProcessRunner + 'static,
{
    let (events_tx, events_rx) = mpsc::channel();
    let (resume_tx, resume_rx) = mpsc::sync_channel(1);

    let reporter = ChannelReporter::new(events_tx);
    let worker = thread::Builder::new()
        .name("installer".to_string())
        .spawn(move || run_worker(setup, config, runner, reporter, resume_rx))?;

    Ok(InstallHandle {
        events: events_rx,
        resume: resume_tx,
        worker,
    })
}

fn run_worker<R: ProcessRunner>(
    setup: Setup,
    config: EngineConfig,
    runner: R,
    reporter: ChannelReporter,
    resume: Receiver<()>,
) -> Result<()> {
    tracing::debug!("Installer thread started");
    let pause_for_user = setup.skip_mount;
    let mut engine = InstallationEngine::new(setup, config, runner, reporter.clone());

    engine.start_installation()?;

    if pause_for_user {
        tracing::info!("Waiting for the user to finish the custom setup");
        reporter.send(EngineEvent::AwaitingResume);
        if resume.recv().is_err() {
            let err = InstallerError::state("installation abandoned while paused for custom setup");
            tracing::error!("{}", err);
            reporter.error(ErrorReport::fatal(err.to_string()));
            return Err(err);
        }
    }

    engine.finish_installation()
}
