//! GRUB installation with a bounded configure/verify retry loop.

use std::fs::OpenOptions;
use std::io::Write;
use std::thread;

use super::InstallationEngine;
use crate::commands::{GrubInstallArgs, GrubMkconfigArgs, UpdateGrubArgs};
use crate::error::Result;
use crate::progress::{ErrorReport, Reporter};
use crate::runner::ProcessRunner;

/// Configure attempts before the bootloader is left to the user
pub const MAX_BOOTLOADER_ATTEMPTS: u32 = 5;

/// Generated GRUB configuration, as seen from inside the chroot
const GRUB_CONFIG: &str = "/boot/grub/grub.cfg";

const UNVERIFIED_WARNING: &str =
    "The grub bootloader was not configured properly! You need to configure it manually.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootloaderOutcome {
    /// Verification passed after `attempts` configure runs
    Configured { attempts: u32 },
    /// Every attempt ran and none verified
    Unverified { attempts: u32 },
}

/// Alternate `configure` and `verify` until verification passes or `max_attempts` is spent.
///
/// Both closures receive the 1-based attempt number.
pub fn configure_with_retry(
    max_attempts: u32,
    mut configure: impl FnMut(u32),
    mut verify: impl FnMut(u32) -> bool,
) -> BootloaderOutcome {
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        configure(attempt);
        if verify(attempt) {
            return BootloaderOutcome::Configured { attempts: attempt };
        }
        tracing::warn!("Bootloader check {}/{} failed", attempt, max_attempts);
    }
    BootloaderOutcome::Unverified {
        attempts: max_attempts,
    }
}

impl<R: ProcessRunner, S: Reporter> InstallationEngine<R, S> {
    pub(super) fn install_bootloader(&mut self, device: &str) -> Result<()> {
        self.report_within(0, 2, format!("Installing bootloader on {}", device));
        self.exec_in_chroot(&GrubInstallArgs {
            device: device.to_string(),
        });

        self.report_within(1, 2, "Configuring bootloader");
        self.exec_in_chroot(&UpdateGrubArgs);

        let grub_config = self.config.in_target(GRUB_CONFIG);
        let settle = self.config.bootloader_settle();
        let outcome = configure_with_retry(
            MAX_BOOTLOADER_ATTEMPTS,
            |attempt| self.configure_grub(attempt),
            |_| {
                self.pulse("Checking bootloader");
                thread::sleep(settle);
                let present = grub_config.is_file();
                if !present {
                    tracing::warn!("No {} found", grub_config.display());
                }
                present
            },
        );

        match outcome {
            BootloaderOutcome::Configured { attempts } => {
                tracing::info!("Bootloader configured after {} attempt(s)", attempts);
            }
            BootloaderOutcome::Unverified { attempts } => {
                tracing::error!("Bootloader still unverified after {} attempts", attempts);
                self.reporter.error(ErrorReport::warning(UNVERIFIED_WARNING));
            }
        }
        Ok(())
    }

    fn configure_grub(&self, attempt: u32) {
        self.pulse("Configuring bootloader");
        let output = self.exec_in_chroot(&GrubMkconfigArgs {
            output: GRUB_CONFIG.to_string(),
        });

        let Some(log) = &self.config.bootloader_log else {
            return;
        };
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .and_then(|mut file| {
                writeln!(file, "--- grub-mkconfig attempt {} ---", attempt)?;
                file.write_all(output.stdout.as_bytes())?;
                file.write_all(output.stderr.as_bytes())
            });
        if let Err(e) = written {
            tracing::warn!("Cannot write bootloader log {}: {}", log.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_first_attempt_succeeds() {
        let configured = Cell::new(0);
        let outcome = configure_with_retry(5, |_| configured.set(configured.get() + 1), |_| true);
        assert_eq!(outcome, BootloaderOutcome::Configured { attempts: 1 });
        assert_eq!(configured.get(), 1);
    }

    #[test]
    fn test_k_failures_give_k_plus_one_configures() {
        for failures in 0..MAX_BOOTLOADER_ATTEMPTS {
            let configured = Cell::new(0);
            let outcome = configure_with_retry(
                MAX_BOOTLOADER_ATTEMPTS,
                |_| configured.set(configured.get() + 1),
                |attempt| attempt > failures,
            );
            assert_eq!(configured.get(), failures + 1);
            assert_eq!(outcome, BootloaderOutcome::Configured {
                attempts: failures + 1
            });
        }
    }

    #[test]
    fn test_never_verified() {
        let configured = Cell::new(0);
        let outcome = configure_with_retry(
            MAX_BOOTLOADER_ATTEMPTS,
            |_| configured.set(configured.get() + 1),
            |_| false,
        );
        assert_eq!(outcome, BootloaderOutcome::Unverified { attempts: 5 });
        assert_eq!(configured.get(), 5);
    }
}
