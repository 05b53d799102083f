//! Target preparation: partition, format and mount the install target.

use std::fs;
use std::path::{Path, PathBuf};

use super::InstallationEngine;
use super::layout::AutoLayout;
use super::mounts::MountKind;
use crate::commands::{
    BadblocksArgs, BtrfsSubvolumeArgs, MkfsArgs, MountArgs, PartedArgs, PartedOp, UmountArgs,
};
use crate::error::{InstallerError, Result};
use crate::progress::Reporter;
use crate::runner::ProcessRunner;
use crate::setup::PartitionSetup;
use crate::types::{Filesystem, PartitionRole};

/// First MiB is left free for the partition table and alignment
const FIRST_PARTITION_START_MIB: u64 = 1;

/// Mount points handled before the generic pass, or never mounted
const SPECIAL_MOUNT_POINTS: &[&str] = &["/", "/@", "/@home", "swap"];

/// `mount [-t <type>] <device> <mount_point>`
fn mount_args(device: &str, mount_point: impl Into<PathBuf>, fs: Option<&Filesystem>) -> MountArgs {
    let args = MountArgs::new(device, mount_point);
    match fs {
        Some(fs) => args.fs_type(fs.mount_type()),
        None => args,
    }
}

/// Filesystem type hint parted records for a role
fn parted_fs_type(role: PartitionRole) -> &'static str {
    match role {
        PartitionRole::Efi => "fat32",
        PartitionRole::Swap => "linux-swap",
        PartitionRole::Boot | PartitionRole::Root => "ext4",
    }
}

impl<R: ProcessRunner, S: Reporter> InstallationEngine<R, S> {
    fn size_of(&self, role: PartitionRole) -> Option<u64> {
        match role {
            PartitionRole::Efi => Some(self.config.efi_size_mib),
            PartitionRole::Boot => Some(self.config.boot_size_mib),
            PartitionRole::Swap => Some(self.config.swap_size_mib),
            PartitionRole::Root => None,
        }
    }

    /// Wipe, partition, format and mount the selected disk
    pub(super) fn prepare_automated(&mut self) -> Result<()> {
        let disk = self
            .setup
            .disk
            .clone()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| InstallerError::validation("automated installation requires a disk"))?;

        let layout = AutoLayout::derive(&disk, self.setup.luks, self.setup.lvm, self.setup.gpt_on_efi);
        tracing::info!("Automated layout: {}", layout);
        if self.setup.luks || self.setup.lvm {
            tracing::info!(
                "LUKS/LVM selected (luks={}, lvm={}): layout only, no encryption or volume setup",
                self.setup.luks,
                self.setup.lvm
            );
        }

        if self.setup.badblocks {
            self.pulse(format!(
                "Filling {} with random data (please be patient, this can take hours...)",
                disk
            ));
            self.exec_tool(&BadblocksArgs { disk: disk.clone() });
        }

        self.report_within(1, 4, format!("Creating partitions on {}", disk));
        self.create_partitions(&layout);

        self.report_within(2, 4, "Formatting partitions");
        for partition in layout.partitions() {
            self.exec_tool(&MkfsArgs {
                device: partition.path.clone(),
                filesystem: partition.role.filesystem(),
            });
        }

        self.report_within(3, 4, format!("Mounting {} on {}", layout.root, self.config.target_dir.display()));
        self.mount_automated(&layout);

        self.run.layout = Some(layout);
        Ok(())
    }

    fn create_partitions(&self, layout: &AutoLayout) {
        let parted = |op: PartedOp| PartedArgs {
            disk: layout.disk.clone(),
            op,
        };

        self.exec_tool(&parted(PartedOp::MkLabel(if layout.gpt { "gpt" } else { "msdos" })));

        let mut start = FIRST_PARTITION_START_MIB;
        for partition in layout.partitions() {
            let end = self.size_of(partition.role).map(|size| start + size);
            self.exec_tool(&parted(PartedOp::MkPart {
                fs_type: parted_fs_type(partition.role),
                start_mib: start,
                end_mib: end,
            }));
            if let Some(end) = end {
                start = end;
            }
        }

        let boot_role = if layout.boot.is_some() {
            Some(PartitionRole::Boot)
        } else if layout.efi.is_none() {
            Some(PartitionRole::Root)
        } else {
            None
        };
        for partition in layout.partitions() {
            let flag = match partition.role {
                PartitionRole::Efi => Some("esp"),
                role if Some(role) == boot_role => Some("boot"),
                _ => None,
            };
            if let Some(flag) = flag {
                self.exec_tool(&parted(PartedOp::SetFlag {
                    number: partition.number,
                    flag,
                }));
            }
        }
    }

    fn mount_automated(&mut self, layout: &AutoLayout) {
        let target = self.config.target_dir.clone();
        let ext4 = Filesystem::Ext4;
        self.mount_recorded(&mount_args(&layout.root, &target, Some(&ext4)), MountKind::Partition);

        if let Some(boot) = &layout.boot {
            let mount_point = self.config.in_target("/boot");
            create_mount_point(&mount_point);
            self.mount_recorded(&mount_args(boot, mount_point, Some(&ext4)), MountKind::Partition);
        }

        if let Some(efi) = &layout.efi {
            let mount_point = self.config.in_target("/boot/efi");
            create_mount_point(&mount_point);
            self.mount_recorded(
                &mount_args(efi, mount_point, Some(&Filesystem::Vfat)),
                MountKind::Partition,
            );
        }
    }

    /// Format and mount a caller-supplied partition plan
    pub(super) fn prepare_manual(&mut self) -> Result<()> {
        let partitions = self.setup.partitions.clone();

        for partition in &partitions {
            if let Some(format_as) = &partition.format_as {
                self.pulse(format!("Formatting {} as {} ...", partition.path, format_as));
                self.exec_tool(&MkfsArgs {
                    device: partition.path.clone(),
                    filesystem: format_as.clone(),
                });
            }
        }

        self.mount_manual_root(&partitions)?;

        if let Some(home) = partitions.iter().find(|p| p.is_mounted_at("/@home")) {
            self.mount_subvolume(home, "/home", "@home")?;
        }

        for partition in &partitions {
            let Some(mount_as) = partition.mount_point() else {
                continue;
            };
            if SPECIAL_MOUNT_POINTS.contains(&mount_as) {
                continue;
            }
            let mount_point = self.config.in_target(mount_as);
            create_mount_point(&mount_point);
            tracing::info!("Mounting {} on {}", partition.path, mount_point.display());
            self.mount_recorded(
                &mount_args(&partition.path, mount_point, partition.effective_filesystem()),
                MountKind::Partition,
            );
        }
        Ok(())
    }

    /// Mount the first `/` or `/@` partition at the target root
    fn mount_manual_root(&mut self, partitions: &[PartitionSetup]) -> Result<()> {
        let root = partitions
            .iter()
            .find(|p| p.is_mounted_at("/") || p.is_mounted_at("/@"))
            .ok_or(InstallerError::NoRootPartition)?;

        let target = self.config.target_dir.clone();
        self.report_within(
            3,
            4,
            format!("Mounting {} on {}", root.path, target.display()),
        );

        if root.is_mounted_at("/@") {
            return self.mount_subvolume(root, "/", "@");
        }
        self.mount_recorded(
            &mount_args(&root.path, target, root.effective_filesystem()),
            MountKind::Partition,
        );
        Ok(())
    }

    /// Create `subvolume` on a btrfs partition and mount it at `mount_as`
    fn mount_subvolume(&mut self, partition: &PartitionSetup, mount_as: &str, subvolume: &str) -> Result<()> {
        let fs = partition.effective_filesystem();
        if fs != Some(&Filesystem::Btrfs) {
            return Err(InstallerError::SubvolumeNotBtrfs(partition.path.clone()));
        }

        let mount_point = self.config.in_target(mount_as);
        create_mount_point(&mount_point);
        tracing::info!("Creating btrfs subvolume {} on {}", subvolume, partition.path);

        let staging = mount_args(&partition.path, &mount_point, fs);
        if self.exec_tool(&staging).success {
            self.exec_tool(&BtrfsSubvolumeArgs {
                path: mount_point.join(subvolume),
            });
            self.exec_tool(&UmountArgs::forced(&mount_point));
        }

        let options = format!("subvol={}", subvolume);
        self.mount_recorded(&staging.options(options), MountKind::Partition);
        Ok(())
    }
}

fn create_mount_point(path: &Path) {
    if let Err(e) = fs::create_dir_all(path) {
        tracing::warn!("Cannot create mount point {}: {}", path.display(), e);
    }
}
