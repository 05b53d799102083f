//! Mount bookkeeping: stale cleanup, the source image, chroot bind mounts, teardown.
//!
//! Every mount the engine makes is pushed onto a [`MountStack`]; teardown
//! pops them newest-first, so the engine only ever unmounts what it mounted.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use strum::Display;

use super::InstallationEngine;
use crate::commands::{BindMountArgs, MountArgs, ToolArgs, UmountArgs};
use crate::error::{InstallerError, Result};
use crate::progress::Reporter;
use crate::runner::ProcessRunner;

/// Host filesystems bind-mounted into the target, in mount order
pub const VIRTUAL_MOUNTS: &[&str] = &["/dev", "/dev/shm", "/dev/pts", "/sys", "/proc", "/run"];

/// Submounts a previous failed run may have left behind, in unmount order
const STALE_MOUNTS: &[&str] = &["/dev/shm", "/dev/pts", "/dev", "/sys", "/proc", "/run"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MountKind {
    /// The live image at the source directory
    Source,
    /// A target partition or subvolume
    Partition,
    /// A host filesystem bound into the chroot
    Bind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    pub kind: MountKind,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
pub(super) struct MountStack {
    records: Vec<MountRecord>,
}

impl MountStack {
    pub(super) fn push(&mut self, kind: MountKind, path: PathBuf) {
        self.records.push(MountRecord { kind, path });
    }

    pub(super) fn records(&self) -> &[MountRecord] {
        &self.records
    }

    /// Remove every record of `kind`, newest first
    pub(super) fn take_reversed(&mut self, kind: MountKind) -> Vec<MountRecord> {
        let (taken, kept): (Vec<_>, Vec<_>) =
            self.records.drain(..).partition(|r| r.kind == kind);
        self.records = kept;
        taken.into_iter().rev().collect()
    }
}

impl<R: ProcessRunner, S: Reporter> InstallationEngine<R, S> {
    /// Force-unmount virtual submounts left by an earlier run; failures are expected
    pub(super) fn cleanup_stale_mounts(&self) {
        for path in STALE_MOUNTS {
            let target = self.config.in_target(path);
            let output = self.runner.run(&UmountArgs::forced(&target).command());
            match output {
                Ok(out) if out.success => tracing::info!("Removed stale mount {}", target.display()),
                Ok(_) => tracing::debug!("{} was not mounted", target.display()),
                Err(e) => tracing::debug!("Stale unmount of {} skipped: {}", target.display(), e),
            }
        }
    }

    /// Make sure the source and target mount points exist
    pub(super) fn prepare_directories(&self) -> Result<()> {
        let target = &self.config.target_dir;
        if self.setup.skip_mount {
            if !target.is_dir() {
                return Err(InstallerError::TargetNotMounted(target.display().to_string()));
            }
        } else {
            fs::create_dir_all(target)?;
        }
        fs::create_dir_all(&self.config.source_dir)?;
        Ok(())
    }

    pub(super) fn mount_source(&mut self) -> Result<()> {
        let media = self.config.media_device.clone();
        if !media.exists() {
            return Err(InstallerError::MissingMedia(media.display().to_string()));
        }

        let source = self.config.source_dir.clone();
        self.report_within(
            1,
            2,
            format!("Mounting {} on {}", media.display(), source.display()),
        );
        let args = MountArgs::new(media.display().to_string(), &source)
            .fs_type("squashfs")
            .options("loop");
        self.mount_recorded(&args, MountKind::Source);
        Ok(())
    }

    /// Mount and remember the mount for teardown; failures are logged only
    pub(super) fn mount_recorded(&mut self, args: &impl ToolArgs, kind: MountKind) -> bool {
        let command = args.command();
        let Some(mount_point) = command.args.last().map(PathBuf::from) else {
            return false;
        };
        let mounted = self.exec(&command).success;
        if mounted {
            self.run.mounts.push(kind, mount_point);
        }
        mounted
    }

    /// Bind the virtual filesystems and make name resolution work inside the target
    pub(super) fn enter_chroot(&mut self) -> Result<()> {
        for path in VIRTUAL_MOUNTS {
            let target = self.config.in_target(path);
            if let Err(e) = fs::create_dir_all(&target) {
                tracing::warn!("Cannot create {}: {}", target.display(), e);
            }
            let args = BindMountArgs {
                source: PathBuf::from(path),
                target,
            };
            self.mount_recorded(&args, MountKind::Bind);
        }

        self.substitute_resolv_conf();
        Ok(())
    }

    fn substitute_resolv_conf(&mut self) {
        let resolv = self.config.in_target("/etc/resolv.conf");
        let backup = self.config.in_target("/etc/resolv.conf.bk");

        // symlink_metadata: a dangling resolv.conf symlink still has to move aside
        if fs::symlink_metadata(&resolv).is_ok() {
            match fs::rename(&resolv, &backup) {
                Ok(()) => self.run.resolv_backed_up = true,
                Err(e) => tracing::warn!("Cannot move {} aside: {}", resolv.display(), e),
            }
        }

        if let Some(parent) = resolv.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match fs::copy(&self.config.host_resolv_conf, &resolv) {
            Ok(_) => self.run.resolv_substituted = true,
            Err(e) => tracing::warn!(
                "Cannot copy {} into the target: {}",
                self.config.host_resolv_conf.display(),
                e
            ),
        }
    }

    fn restore_resolv_conf(&mut self) {
        let resolv = self.config.in_target("/etc/resolv.conf");
        let backup = self.config.in_target("/etc/resolv.conf.bk");

        if self.run.resolv_substituted {
            remove_if_present(&resolv);
            self.run.resolv_substituted = false;
        }
        if self.run.resolv_backed_up {
            if let Err(e) = fs::rename(&backup, &resolv) {
                tracing::warn!("Cannot restore {}: {}", resolv.display(), e);
            }
            self.run.resolv_backed_up = false;
        }
    }

    /// Release everything mounted during the run; individual failures are ignored
    pub(super) fn teardown(&mut self) {
        for record in self.run.mounts.take_reversed(MountKind::Bind) {
            self.exec_tool(&UmountArgs::forced(&record.path));
        }

        self.restore_resolv_conf();

        for record in self.run.mounts.take_reversed(MountKind::Partition) {
            self.exec_tool(&UmountArgs {
                target: record.path,
                force: false,
            });
        }

        for record in self.run.mounts.take_reversed(MountKind::Source) {
            self.exec_tool(&UmountArgs {
                target: record.path,
                force: false,
            });
        }
    }
}

fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!("Cannot remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_reversed_keeps_other_kinds() {
        let mut stack = MountStack::default();
        stack.push(MountKind::Source, PathBuf::from("/source"));
        stack.push(MountKind::Partition, PathBuf::from("/target"));
        stack.push(MountKind::Bind, PathBuf::from("/target/dev"));
        stack.push(MountKind::Partition, PathBuf::from("/target/boot"));
        stack.push(MountKind::Bind, PathBuf::from("/target/dev/pts"));

        let binds = stack.take_reversed(MountKind::Bind);
        assert_eq!(
            binds.iter().map(|r| r.path.clone()).collect::<Vec<_>>(),
            vec![PathBuf::from("/target/dev/pts"), PathBuf::from("/target/dev")]
        );

        let partitions = stack.take_reversed(MountKind::Partition);
        assert_eq!(partitions[0].path, PathBuf::from("/target/boot"));
        assert_eq!(stack.records().len(), 1);
    }

    #[test]
    fn test_virtual_mounts_nest_after_parents() {
        let dev = VIRTUAL_MOUNTS.iter().position(|p| *p == "/dev").unwrap();
        let shm = VIRTUAL_MOUNTS.iter().position(|p| *p == "/dev/shm").unwrap();
        assert!(dev < shm);
    }
}
