//! Copy of the live filesystem onto the target.

use super::InstallationEngine;
use crate::commands::{DfInodesArgs, RsyncArgs, ToolArgs};
use crate::error::{InstallerError, Result};
use crate::install_state::InstallStage;
use crate::progress::Reporter;
use crate::runner::ProcessRunner;

/// rsync: "some files vanished before they could be transferred"
const RSYNC_PARTIAL_VANISHED: i32 = 24;

/// Used inode count from `df --inodes` output.
///
/// Reads the third column (`IUsed`) of the last non-empty line.
pub fn parse_used_inodes(output: &str) -> Option<u64> {
    output
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())?
        .split_whitespace()
        .nth(2)?
        .parse()
        .ok()
}

impl<R: ProcessRunner, S: Reporter> InstallationEngine<R, S> {
    fn count_source_inodes(&self) -> u64 {
        let output = self.exec_tool(&DfInodesArgs {
            path: self.config.source_dir.clone(),
        });
        match parse_used_inodes(&output.stdout) {
            Some(count) => count.max(1),
            None => {
                tracing::warn!("Cannot read inode count of {}, progress will be coarse", self.config.source_dir.display());
                1
            }
        }
    }

    pub(super) fn copy_files(&mut self) -> Result<()> {
        let total = self.count_source_inodes();
        tracing::info!("Copying about {} files", total);

        let command = RsyncArgs::live_copy(&self.config.source_dir, &self.config.target_dir).command();
        let mut copied: u64 = 0;
        let progress = &mut self.run.progress;
        let reporter = &self.reporter;

        let output = self.runner.run_streaming(&command, &mut |line: &str| {
            let line = line.trim();
            if line.is_empty() {
                return;
            }
            copied = (copied + 1).min(total);
            let update = progress.within(InstallStage::CopyFiles, copied, total, format!("Copying /{}", line));
            reporter.progress(update);
        })?;

        match output.exit_code {
            Some(0) | Some(RSYNC_PARTIAL_VANISHED) => Ok(()),
            code => {
                tracing::error!("rsync failed with {:?}: {}", code, output.stderr.trim());
                Err(InstallerError::CopyFailed(code.unwrap_or(-1)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_used_inodes() {
        let output = "Filesystem     Inodes  IUsed  IFree IUse% Mounted on\n\
                      /dev/loop0     250000 182345  67655   73% /source\n";
        assert_eq!(parse_used_inodes(output), Some(182345));
    }

    #[test]
    fn test_parse_used_inodes_rejects_garbage() {
        assert_eq!(parse_used_inodes(""), None);
        assert_eq!(parse_used_inodes("df: /source: No such file or directory\n"), None);
    }
}
