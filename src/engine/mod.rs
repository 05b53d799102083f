//! Installation Engine
//!
//! Runs the installation pipeline for one frozen [`Setup`]. Stages run
//! strictly in order on the calling thread; the worker module moves the
//! whole engine onto its own thread.
//!
//! The pipeline is split in two calls:
//!
//! - [`InstallationEngine::start_installation`]: MountSource through UserSetup
//! - [`InstallationEngine::finish_installation`]: LocaleAndConsole through Unmount
//!
//! A custom (`skip_mount`) setup pauses between the two so the user can write
//! `/etc/fstab` and adjust the chrooted system by hand.
//!
//! # Failure policy
//!
//! External command failures inside a stage are logged and swallowed, except
//! where a stage checks a post-condition (bootloader config presence, copy
//! exit status). Errors returned by a stage abort the run: they are reported
//! as fatal through the [`Reporter`] and returned to the caller.

mod bootloader;
mod configure;
mod copy;
pub mod fstab;
mod hooks;
pub mod layout;
mod mounts;
mod target;

pub use bootloader::{BootloaderOutcome, MAX_BOOTLOADER_ATTEMPTS, configure_with_retry};
pub use copy::parse_used_inodes;
pub use layout::{AutoLayout, partition_path};
pub use mounts::{MountKind, MountRecord};

use crate::commands::ToolArgs;
use crate::config::EngineConfig;
use crate::error::{InstallerError, Result};
use crate::install_state::{InstallStage, RunStages};
use crate::progress::{ErrorReport, ProgressTracker, ProgressUpdate, Reporter};
use crate::runner::{CommandOutput, CommandSpec, ProcessRunner};
use crate::setup::Setup;

/// Scratch state of a single run, rebuilt by every `start_installation`
#[derive(Debug, Default)]
struct RunContext {
    stages: RunStages,
    progress: ProgressTracker,
    /// Derived on the automated path only
    layout: Option<AutoLayout>,
    mounts: mounts::MountStack,
    /// The target's own resolv.conf was moved to resolv.conf.bk
    resolv_backed_up: bool,
    /// The host's resolv.conf was copied into the target
    resolv_substituted: bool,
    finished: bool,
}

/// The installation pipeline
pub struct InstallationEngine<R: ProcessRunner, S: Reporter> {
    setup: Setup,
    config: EngineConfig,
    runner: R,
    reporter: S,
    run: RunContext,
}

impl<R: ProcessRunner, S: Reporter> InstallationEngine<R, S> {
    pub fn new(setup: Setup, config: EngineConfig, runner: R, reporter: S) -> Self {
        Self {
            setup,
            config,
            runner,
            reporter,
            run: RunContext::default(),
        }
    }

    pub fn setup(&self) -> &Setup {
        &self.setup
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn current_stage(&self) -> InstallStage {
        self.run.stages.current_stage()
    }

    /// Layout derived by the last automated run
    pub fn layout(&self) -> Option<&AutoLayout> {
        self.run.layout.as_ref()
    }

    /// Mounts the engine made and has not yet released
    pub fn active_mounts(&self) -> &[MountRecord] {
        self.run.mounts.records()
    }

    /// Stages 1-7: mount the source, prepare and fill the target, enter the chroot, add the user
    pub fn start_installation(&mut self) -> Result<()> {
        self.run = RunContext::default();
        tracing::info!(
            "Starting installation (automated={}, skip_mount={})",
            self.setup.automated,
            self.setup.skip_mount
        );
        let result = self.start_stages();
        self.conclude(result)
    }

    /// Stages 8-11: configure the system, bootloader, fstab, tear down
    pub fn finish_installation(&mut self) -> Result<()> {
        if self.current_stage() != InstallStage::UserSetup {
            return Err(InstallerError::state(format!(
                "cannot finish an installation at stage '{}'",
                self.current_stage()
            )));
        }
        let result = self.finish_stages();
        self.conclude(result)
    }

    fn start_stages(&mut self) -> Result<()> {
        self.cleanup_stale_mounts();
        self.prepare_directories()?;

        self.enter(InstallStage::MountSource)?;
        self.mount_source()?;

        self.enter(InstallStage::PrepareTarget)?;
        if self.setup.skip_mount {
            tracing::info!("Custom setup: leaving the pre-mounted target untouched");
        } else if self.setup.automated {
            self.prepare_automated()?;
        } else {
            self.prepare_manual()?;
        }

        self.enter(InstallStage::PreInstall)?;
        self.run_preinstall_hook();

        self.enter(InstallStage::CopyFiles)?;
        self.copy_files()?;

        self.enter(InstallStage::ChrootEnter)?;
        self.enter_chroot()?;

        self.enter(InstallStage::PostInstall)?;
        self.run_postinstall_hook()?;

        self.enter(InstallStage::UserSetup)?;
        self.setup_user()?;

        Ok(())
    }

    fn finish_stages(&mut self) -> Result<()> {
        self.enter(InstallStage::LocaleAndConsole)?;
        self.write_locale_and_console()?;

        self.enter(InstallStage::Bootloader)?;
        match self.setup.grub_device.clone() {
            Some(device) if !device.trim().is_empty() => self.install_bootloader(&device)?,
            _ => tracing::info!("No bootloader device selected, skipping grub"),
        }

        self.enter(InstallStage::FstabWrite)?;
        self.write_fstab()?;

        self.enter(InstallStage::Unmount)?;
        self.teardown();

        self.run.stages.transition_to(InstallStage::Completed)?;
        self.emit_finished();
        Ok(())
    }

    /// Top-level catch: a stage error becomes a fatal report and fails the run
    fn conclude(&mut self, result: Result<()>) -> Result<()> {
        if let Err(err) = &result {
            tracing::error!(
                "Installation failed during '{}': {}",
                self.current_stage(),
                err
            );
            let _ = self.run.stages.fail();
            self.reporter.error(ErrorReport::fatal(err.to_string()));
        }
        result
    }

    fn enter(&mut self, stage: InstallStage) -> Result<()> {
        self.run.stages.transition_to(stage)?;
        if stage.is_destructive() && !self.setup.skip_mount {
            tracing::warn!("Entering destructive stage: {}", stage);
        } else {
            tracing::info!("Stage {}: {}", stage.order(), stage);
        }
        let update = self.run.progress.enter(stage);
        self.reporter.progress(update);
        Ok(())
    }

    fn report_within(&mut self, done: u64, of: u64, message: impl Into<String>) {
        let stage = self.current_stage();
        let update = self.run.progress.within(stage, done, of, message);
        self.reporter.progress(update);
    }

    fn pulse(&self, message: impl Into<String>) {
        self.reporter.progress(ProgressUpdate::pulse(message));
    }

    fn emit_finished(&mut self) {
        if self.run.finished {
            return;
        }
        self.run.finished = true;
        tracing::info!("Installation finished");
        self.reporter
            .progress(ProgressUpdate::finished(InstallStage::Completed.description()));
    }

    /// Run a command, logging instead of propagating failure
    fn exec(&self, command: &CommandSpec) -> CommandOutput {
        match self.runner.run(command) {
            Ok(output) => {
                if !output.success {
                    tracing::warn!(
                        "'{}' exited with {:?}: {}",
                        command,
                        output.exit_code,
                        output.stderr.trim()
                    );
                }
                output
            }
            Err(err) => {
                tracing::warn!("'{}' could not run: {}", command, err);
                CommandOutput::not_started(err.to_string())
            }
        }
    }

    fn exec_tool(&self, args: &impl ToolArgs) -> CommandOutput {
        self.exec(&args.command())
    }

    fn exec_in_chroot(&self, args: &impl ToolArgs) -> CommandOutput {
        self.exec(&args.command().in_chroot(&self.config.target_dir))
    }
}
