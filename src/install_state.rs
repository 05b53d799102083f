//! Install State Machine
//!
//! The pipeline's stage order lives here. [`RunStages`] enforces forward-only
//! transitions so a stage can neither be skipped nor repeated within one run,
//! and `finish_installation` cannot start before `start_installation` ended.
//!
//! # Stage Flow
//!
//! ```text
//! NotStarted
//!     ↓
//! MountSource → PrepareTarget → PreInstall → CopyFiles → ChrootEnter
//!     → PostInstall → UserSetup                      (start_installation)
//!     ↓
//!   [custom setup pause]
//!     ↓
//! LocaleAndConsole → Bootloader → FstabWrite → Unmount   (finish_installation)
//!     ↓
//! Completed
//!
//! (Any stage can transition to Failed)
//! ```

use std::fmt;
use thiserror::Error;

/// Installation stages in sequential order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstallStage {
    NotStarted = 0,
    /// Mount the live image read-only at the source directory
    MountSource = 1,
    /// Partition, format and mount the target (skipped for custom setups)
    PrepareTarget = 2,
    PreInstall = 3,
    /// Copy the live filesystem tree to the target
    CopyFiles = 4,
    /// Bind-mount virtual filesystems and swap in the host resolver config
    ChrootEnter = 5,
    PostInstall = 6,
    UserSetup = 7,
    LocaleAndConsole = 8,
    /// Install grub and verify its generated configuration
    Bootloader = 9,
    FstabWrite = 10,
    Unmount = 11,
    /// Installation completed successfully (terminal state)
    Completed = 12,
    /// Installation failed (terminal state)
    Failed = 255,
}

/// Number of working stages between NotStarted and Completed
pub const STAGE_COUNT: u8 = 11;

impl InstallStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns true if this is a terminal state (Completed or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if this stage erases or rewrites block devices
    #[inline]
    pub const fn is_destructive(self) -> bool {
        matches!(self, Self::PrepareTarget)
    }

    /// Returns the next stage in the sequence, or None if at a terminal state
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::MountSource),
            Self::MountSource => Some(Self::PrepareTarget),
            Self::PrepareTarget => Some(Self::PreInstall),
            Self::PreInstall => Some(Self::CopyFiles),
            Self::CopyFiles => Some(Self::ChrootEnter),
            Self::ChrootEnter => Some(Self::PostInstall),
            Self::PostInstall => Some(Self::UserSetup),
            Self::UserSetup => Some(Self::LocaleAndConsole),
            Self::LocaleAndConsole => Some(Self::Bootloader),
            Self::Bootloader => Some(Self::FstabWrite),
            Self::FstabWrite => Some(Self::Unmount),
            Self::Unmount => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    /// Returns a human-readable description of this stage
    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::MountSource => "Mounting the live image",
            Self::PrepareTarget => "Preparing the target disk",
            Self::PreInstall => "Running the pre-install hook",
            Self::CopyFiles => "Copying files",
            Self::ChrootEnter => "Entering the target system",
            Self::PostInstall => "Running the post-install hook",
            Self::UserSetup => "Adding user",
            Self::LocaleAndConsole => "Configuring locale and keyboard",
            Self::Bootloader => "Installing bootloader",
            Self::FstabWrite => "Writing filesystem mount information",
            Self::Unmount => "Cleaning up",
            Self::Completed => "Installation finished",
            Self::Failed => "Installation failed",
        }
    }

    /// Share of the overall progress bar reached when this stage begins
    ///
    /// Copying dominates the runtime, so it owns most of the bar.
    pub const fn progress_percent(self) -> u8 {
        match self {
            Self::NotStarted | Self::MountSource => 0,
            Self::PrepareTarget => 2,
            Self::PreInstall => 8,
            Self::CopyFiles => 10,
            Self::ChrootEnter => 75,
            Self::PostInstall => 76,
            Self::UserSetup => 80,
            Self::LocaleAndConsole => 83,
            Self::Bootloader => 85,
            Self::FstabWrite => 95,
            Self::Unmount => 96,
            Self::Completed => 100,
            Self::Failed => 0,
        }
    }

    /// Returns all stages in order (excluding Failed)
    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::NotStarted,
            Self::MountSource,
            Self::PrepareTarget,
            Self::PreInstall,
            Self::CopyFiles,
            Self::ChrootEnter,
            Self::PostInstall,
            Self::UserSetup,
            Self::LocaleAndConsole,
            Self::Bootloader,
            Self::FstabWrite,
            Self::Unmount,
            Self::Completed,
        ]
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallTransitionError {
    /// Attempted to skip one or more stages
    #[error("Cannot skip from {from} to {to} (must transition through intermediate stages)")]
    SkippedStage {
        from: InstallStage,
        to: InstallStage,
    },

    /// Attempted to go backwards (not allowed)
    #[error("Cannot go backwards from {from} to {to} (installation is forward-only)")]
    BackwardTransition {
        from: InstallStage,
        to: InstallStage,
    },

    /// Attempted to transition from a terminal state
    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: InstallStage },

    /// Attempted to transition to the same state
    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: InstallStage },
}

/// Stage bookkeeping for one installation run.
///
/// # Example
///
/// ```
/// use live_installer::install_state::{InstallStage, RunStages};
///
/// let mut stages = RunStages::new();
/// stages.transition_to(InstallStage::MountSource).unwrap();
///
/// // Cannot skip stages
/// assert!(stages.transition_to(InstallStage::CopyFiles).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct RunStages {
    current: InstallStage,
    failed_at: Option<InstallStage>,
    /// Stages entered so far, in order
    history: Vec<InstallStage>,
}

impl Default for RunStages {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStages {
    pub fn new() -> Self {
        Self {
            current: InstallStage::NotStarted,
            failed_at: None,
            history: Vec::with_capacity(InstallStage::all_stages().len()),
        }
    }

    #[inline]
    pub fn current_stage(&self) -> InstallStage {
        self.current
    }

    /// Returns the stage at which failure occurred, if any
    #[inline]
    pub fn failed_at(&self) -> Option<InstallStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current == InstallStage::Completed
    }

    pub fn history(&self) -> &[InstallStage] {
        &self.history
    }

    /// Transition to a specific stage (must be the next stage in sequence).
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if current is a terminal state
    /// - `AlreadyAtStage` if target is the current stage
    /// - `BackwardTransition` if target is before current
    /// - `SkippedStage` if target is not the immediate next stage
    pub fn transition_to(
        &mut self,
        target: InstallStage,
    ) -> Result<InstallStage, InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }

        if target == self.current {
            return Err(InstallTransitionError::AlreadyAtStage { stage: target });
        }

        // Failed is reached through fail(), never by transition
        if target == InstallStage::Failed {
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        if target.order() < self.current.order() {
            return Err(InstallTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }

        if self.current.next() != Some(target) {
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        self.history.push(target);
        self.current = target;
        Ok(target)
    }

    /// Mark the run as failed at the current stage.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if already at Completed or Failed
    pub fn fail(&mut self) -> Result<(), InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }

        self.failed_at = Some(self.current);
        self.history.push(InstallStage::Failed);
        self.current = InstallStage::Failed;
        Ok(())
    }
}

impl From<InstallTransitionError> for crate::error::InstallerError {
    fn from(err: InstallTransitionError) -> Self {
        crate::error::InstallerError::InstallTransition(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // InstallStage Tests
    // =========================================================================

    #[test]
    fn test_stage_order_is_sequential() {
        let stages = InstallStage::all_stages();
        for (i, stage) in stages.iter().enumerate() {
            assert_eq!(
                stage.order() as usize,
                i,
                "Stage {:?} should have order {}",
                stage,
                i
            );
        }
        assert_eq!(InstallStage::Unmount.order(), STAGE_COUNT);
    }

    #[test]
    fn test_stage_next_forms_chain() {
        let mut current = InstallStage::NotStarted;
        let mut count = 0;

        while let Some(next) = current.next() {
            current = next;
            count += 1;
            assert!(count < 20, "Infinite loop detected in stage chain");
        }

        assert_eq!(current, InstallStage::Completed);
        assert_eq!(count, STAGE_COUNT as usize + 1);
    }

    #[test]
    fn test_only_prepare_target_is_destructive() {
        for stage in InstallStage::all_stages() {
            assert_eq!(
                stage.is_destructive(),
                *stage == InstallStage::PrepareTarget,
                "{:?}",
                stage
            );
        }
    }

    #[test]
    fn test_progress_percent_increases() {
        let mut last_progress = 0u8;
        for stage in InstallStage::all_stages() {
            let progress = stage.progress_percent();
            assert!(
                progress >= last_progress,
                "Progress should not decrease: {:?} has {}% after {}%",
                stage,
                progress,
                last_progress
            );
            last_progress = progress;
        }
        assert_eq!(InstallStage::Completed.progress_percent(), 100);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(InstallStage::CopyFiles.to_string(), "Copying files");
        assert_eq!(InstallStage::Completed.to_string(), "Installation finished");
    }

    // =========================================================================
    // RunStages Tests
    // =========================================================================

    #[test]
    fn test_walk_through_all_stages() {
        let mut stages = RunStages::new();
        for stage in &InstallStage::all_stages()[1..] {
            stages.transition_to(*stage).unwrap();
        }
        assert!(stages.is_complete());
        assert_eq!(stages.history().len(), STAGE_COUNT as usize + 1);
    }

    #[test]
    fn test_cannot_skip_stages() {
        let mut stages = RunStages::new();
        let err = stages.transition_to(InstallStage::CopyFiles).unwrap_err();
        assert!(matches!(err, InstallTransitionError::SkippedStage { .. }));
    }

    #[test]
    fn test_cannot_go_backwards() {
        let mut stages = RunStages::new();
        stages.transition_to(InstallStage::MountSource).unwrap();
        stages.transition_to(InstallStage::PrepareTarget).unwrap();
        let err = stages.transition_to(InstallStage::MountSource).unwrap_err();
        assert!(matches!(err, InstallTransitionError::BackwardTransition { .. }));
    }

    #[test]
    fn test_cannot_repeat_stage() {
        let mut stages = RunStages::new();
        stages.transition_to(InstallStage::MountSource).unwrap();
        let err = stages.transition_to(InstallStage::MountSource).unwrap_err();
        assert_eq!(
            err,
            InstallTransitionError::AlreadyAtStage {
                stage: InstallStage::MountSource
            }
        );
    }

    #[test]
    fn test_fail_records_failed_at_stage() {
        let mut stages = RunStages::new();
        stages.transition_to(InstallStage::MountSource).unwrap();
        stages.fail().unwrap();

        assert_eq!(stages.current_stage(), InstallStage::Failed);
        assert_eq!(stages.failed_at(), Some(InstallStage::MountSource));
        assert!(stages.transition_to(InstallStage::PrepareTarget).is_err());
        assert!(stages.fail().is_err());
    }
}
