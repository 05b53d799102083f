//! Distribution hook scripts run around the copy.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use super::InstallationEngine;
use crate::commands::HookArgs;
use crate::error::Result;
use crate::progress::Reporter;
use crate::runner::ProcessRunner;

/// Where the post-install script is staged, as seen from inside the chroot
pub const POSTINSTALL_STAGING: &str = "/tmp/live-installer-postinstall.sh";

impl<R: ProcessRunner, S: Reporter> InstallationEngine<R, S> {
    /// Run the pre-install hook on the host, if the distribution ships one
    pub(super) fn run_preinstall_hook(&self) {
        let script = self.config.preinstall_hook.clone();
        if !script.is_file() {
            tracing::info!("No pre-install hook at {}", script.display());
            return;
        }
        self.pulse("Running pre-install script");
        self.exec_tool(&HookArgs {
            script,
            interpreter: Some("bash"),
        });
    }

    /// Stage the post-install hook in the target and run it in the chroot
    pub(super) fn run_postinstall_hook(&self) -> Result<()> {
        let script = &self.config.postinstall_hook;
        if !script.is_file() {
            tracing::info!("No post-install hook at {}", script.display());
            return Ok(());
        }

        let staged = self.config.in_target(POSTINSTALL_STAGING);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(script, &staged)?;
        fs::set_permissions(&staged, fs::Permissions::from_mode(0o755))?;

        self.pulse("Running post-install script");
        let hook = HookArgs {
            script: PathBuf::from(POSTINSTALL_STAGING),
            interpreter: None,
        };
        let output = self.exec_in_chroot(&hook);
        if output.success {
            tracing::info!("Post-install hook finished");
        }

        if let Err(e) = fs::remove_file(&staged) {
            tracing::warn!("Cannot remove {}: {}", staged.display(), e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ToolArgs;

    #[test]
    fn test_hook_runs_staged_copy_in_chroot() {
        let hook = HookArgs {
            script: PathBuf::from(POSTINSTALL_STAGING),
            interpreter: None,
        };
        let cmd = hook.command().in_chroot("/target");
        assert_eq!(
            cmd.argv(),
            vec!["chroot", "/target", "/tmp/live-installer-postinstall.sh"]
        );
    }
}
