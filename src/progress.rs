//! Progress and error reporting contract between the engine and its caller.
//!
//! The engine reports through one constructor-injected [`Reporter`]. A
//! progress update is one of three kinds:
//!
//! - **fraction**: `current/total`, `current` clamped to `total`;
//! - **pulse**: indeterminate activity, only `message` is meaningful;
//! - **finished**: the single terminal success event of a run (`done`).
//!
//! Fractions come from a per-run [`ProgressTracker`] that places every stage
//! on one `0..=PROGRESS_TOTAL` scale and never moves backwards.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::install_state::InstallStage;

/// Denominator of every fraction the engine reports
pub const PROGRESS_TOTAL: u64 = 1000;

/// One progress report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub current: u64,
    pub total: u64,
    pub pulse: bool,
    pub done: bool,
    pub message: String,
}

impl ProgressUpdate {
    /// A fractional update; `current` is clamped to `total`
    pub fn fraction(current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            current: current.min(total),
            total,
            pulse: false,
            done: false,
            message: message.into(),
        }
    }

    /// Indeterminate activity
    pub fn pulse(message: impl Into<String>) -> Self {
        Self {
            current: 0,
            total: 0,
            pulse: true,
            done: false,
            message: message.into(),
        }
    }

    /// Terminal success of the whole run
    pub fn finished(message: impl Into<String>) -> Self {
        Self {
            current: PROGRESS_TOTAL,
            total: PROGRESS_TOTAL,
            pulse: false,
            done: true,
            message: message.into(),
        }
    }

    /// `current / total` for fractional updates
    pub fn ratio(&self) -> Option<f64> {
        if self.pulse || self.done || self.total == 0 {
            None
        } else {
            Some(self.current as f64 / self.total as f64)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    /// The run stopped; the caller must not offer a reboot
    Fatal,
    /// The run continues but something needs manual attention afterwards
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub severity: Severity,
    pub message: String,
}

impl ErrorReport {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// Caller-supplied sink for everything the engine has to say
pub trait Reporter: Send {
    fn progress(&self, update: ProgressUpdate);

    fn error(&self, report: ErrorReport);
}

/// Caller-side error state of one run.
///
/// A fatal report raises the run-level flag and keeps its message;
/// warnings are collected for display next to the reboot prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLatch {
    fatal: Option<String>,
    warnings: Vec<String>,
}

impl ErrorLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, report: &ErrorReport) {
        match report.severity {
            // Keep the first fatal message; later ones are consequences
            Severity::Fatal => {
                if self.fatal.is_none() {
                    self.fatal = Some(report.message.clone());
                }
            }
            Severity::Warning => self.warnings.push(report.message.clone()),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn fatal_message(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Maps stage-local progress onto the run-wide scale
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    current: u64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    /// Update for entering `stage`
    pub fn enter(&mut self, stage: InstallStage) -> ProgressUpdate {
        self.within(stage, 0, 1, stage.description())
    }

    /// Update for `done` out of `of` units of work inside `stage`
    pub fn within(
        &mut self,
        stage: InstallStage,
        done: u64,
        of: u64,
        message: impl Into<String>,
    ) -> ProgressUpdate {
        let (start, end) = stage_span(stage);
        let of = of.max(1);
        let offset = (end - start) * done.min(of) / of;
        self.current = self.current.max(start + offset).min(PROGRESS_TOTAL);
        ProgressUpdate::fraction(self.current, PROGRESS_TOTAL, message)
    }
}

/// `[start, end)` of a stage on the `PROGRESS_TOTAL` scale
fn stage_span(stage: InstallStage) -> (u64, u64) {
    let start = u64::from(stage.progress_percent()) * PROGRESS_TOTAL / 100;
    let end = stage
        .next()
        .map_or(PROGRESS_TOTAL, |next| u64::from(next.progress_percent()) * PROGRESS_TOTAL / 100);
    (start, end.max(start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_clamps_current() {
        let update = ProgressUpdate::fraction(15, 10, "over");
        assert_eq!(update.current, 10);
        assert_eq!(update.ratio(), Some(1.0));
    }

    #[test]
    fn test_pulse_and_finished_have_no_ratio() {
        assert_eq!(ProgressUpdate::pulse("x").ratio(), None);
        let done = ProgressUpdate::finished("Installation finished");
        assert!(done.done);
        assert_eq!(done.ratio(), None);
    }

    #[test]
    fn test_error_latch_keeps_first_fatal() {
        let mut latch = ErrorLatch::new();
        latch.record(&ErrorReport::warning("grub"));
        assert!(!latch.is_fatal());

        latch.record(&ErrorReport::fatal("first"));
        latch.record(&ErrorReport::fatal("second"));
        assert_eq!(latch.fatal_message(), Some("first"));
        assert_eq!(latch.warnings(), &["grub".to_string()]);
    }

    #[test]
    fn test_tracker_maps_copy_into_its_span() {
        let mut tracker = ProgressTracker::new();
        let start = tracker.enter(InstallStage::CopyFiles);
        assert_eq!(start.current, 100);

        let half = tracker.within(InstallStage::CopyFiles, 50, 100, "Copying /usr");
        assert_eq!(half.current, 100 + (750 - 100) / 2);

        let past = tracker.within(InstallStage::CopyFiles, 500, 100, "Copying /var");
        assert_eq!(past.current, 750, "overshoot is clamped to the stage end");
    }

    #[test]
    fn test_tracker_never_moves_backwards() {
        let mut tracker = ProgressTracker::new();
        tracker.enter(InstallStage::Bootloader);
        let update = tracker.enter(InstallStage::MountSource);
        assert_eq!(update.current, 850);
    }

    #[test]
    fn test_tracker_with_zero_units() {
        let mut tracker = ProgressTracker::new();
        let update = tracker.within(InstallStage::CopyFiles, 0, 0, "empty source");
        assert!(update.current <= update.total);
    }
}
