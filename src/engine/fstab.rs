//! `/etc/fstab` generation.
//!
//! Entry rendering is pure: callers pass a resolver turning a device path
//! into the identifier written to the first column (`UUID=...` in
//! production, the device path when no UUID is known).

use std::fs::{self, OpenOptions};
use std::io::Write;

use super::InstallationEngine;
use super::layout::AutoLayout;
use crate::commands::{BlkidUuidArgs, ToolArgs};
use crate::error::Result;
use crate::progress::Reporter;
use crate::runner::ProcessRunner;
use crate::setup::PartitionSetup;
use crate::types::Filesystem;

/// First line of a freshly created fstab
pub const FSTAB_HEADER: &str = "#### Static Filesystem Table File";

/// Always appended, even for custom setups
pub const PROC_LINE: &str = "proc\t/proc\tproc\tdefaults\t0\t0";

/// `blkid -s UUID -o value` output as an fstab identifier
pub fn parse_uuid(output: &str) -> Option<String> {
    let value = output.lines().next()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(format!("UUID={}", value))
    }
}

/// Entries for the automated layout; absent roles are skipped
pub fn automated_entries(layout: &AutoLayout, resolve: impl Fn(&str) -> String) -> Vec<String> {
    let mut lines = Vec::new();
    let mut push = |device: &str, rest: &str| {
        lines.push(format!("# {}", device));
        lines.push(format!("{} {}", resolve(device), rest));
    };

    push(&layout.root, "/  ext4 defaults 0 1");
    if let Some(swap) = &layout.swap {
        push(swap, "none   swap sw 0 0");
    }
    if let Some(boot) = &layout.boot {
        push(boot, "/boot  ext4 defaults 0 1");
    }
    if let Some(efi) = &layout.efi {
        push(efi, "/boot/efi  vfat defaults 0 1");
    }
    lines
}

/// Entries for a manual partition plan, in plan order
pub fn manual_entries(partitions: &[PartitionSetup], resolve: impl Fn(&str) -> String) -> Vec<String> {
    let mut lines = Vec::new();
    for partition in partitions {
        let Some(mount_as) = partition.mount_point() else {
            continue;
        };
        lines.push(format!("# {}", partition.path));

        let identifier = resolve(&partition.path);
        let fs = partition.effective_filesystem();
        if fs == Some(&Filesystem::Swap) {
            lines.push(format!("{}\tswap\tswap\tsw\t0\t0", identifier));
            continue;
        }

        let is_btrfs = fs == Some(&Filesystem::Btrfs);
        let (mount_point, options) = match mount_as {
            "/@" if is_btrfs => ("/", "rw,subvol=/@"),
            "/@home" if is_btrfs => ("/home", "rw,subvol=/@home"),
            _ if fs.is_some_and(Filesystem::is_ext) => (mount_as, "rw,errors=remount-ro"),
            _ => (mount_as, "defaults"),
        };
        // fsck pass 1 only for a plain root; subvolume roots stay at 0
        let fsck = if mount_as == "/" { "1" } else { "0" };
        let fs_name = fs.map_or("auto", |f| f.mount_type());

        lines.push(format!(
            "{}\t{}\t{}\t{}\t0\t{}",
            identifier, mount_point, fs_name, options, fsck
        ));
    }
    lines
}

impl<R: ProcessRunner, S: Reporter> InstallationEngine<R, S> {
    /// Identifier for `device`, falling back to the path itself
    fn resolve_uuid(&self, device: &str) -> String {
        let command = BlkidUuidArgs {
            device: device.to_string(),
        }
        .command();
        let uuid = match self.runner.run(&command) {
            Ok(output) if output.success => parse_uuid(&output.stdout),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("blkid failed for {}: {}", device, e);
                None
            }
        };
        uuid.unwrap_or_else(|| {
            tracing::warn!("No UUID for {}, using the device path in fstab", device);
            device.to_string()
        })
    }

    pub(super) fn write_fstab(&mut self) -> Result<()> {
        self.report_within(0, 1, "Writing filesystem mount information to /etc/fstab");
        let path = self.config.in_target("/etc/fstab");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut lines = Vec::new();
        if !path.exists() {
            lines.push(FSTAB_HEADER.to_string());
        }
        lines.push(PROC_LINE.to_string());

        if self.setup.skip_mount {
            tracing::info!("Custom setup: keeping the user's fstab entries");
        } else if let Some(layout) = &self.run.layout {
            lines.extend(automated_entries(layout, |d| self.resolve_uuid(d)));
        } else if !self.setup.automated {
            lines.extend(manual_entries(&self.setup.partitions, |d| self.resolve_uuid(d)));
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        for line in &lines {
            writeln!(file, "{}", line)?;
        }
        tracing::info!("Wrote {} line(s) to {}", lines.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid_of(device: &str) -> String {
        format!("UUID={}", device.trim_start_matches("/dev/"))
    }

    #[test]
    fn test_parse_uuid() {
        assert_eq!(
            parse_uuid("3f1c-a2b4\n"),
            Some("UUID=3f1c-a2b4".to_string())
        );
        assert_eq!(parse_uuid(""), None);
        assert_eq!(parse_uuid("\n"), None);
    }

    #[test]
    fn test_automated_efi_layout() {
        let layout = AutoLayout::derive("/dev/sda", false, false, true);
        let lines = automated_entries(&layout, uuid_of);
        assert_eq!(lines, vec![
            "# /dev/sda3",
            "UUID=sda3 /  ext4 defaults 0 1",
            "# /dev/sda2",
            "UUID=sda2 none   swap sw 0 0",
            "# /dev/sda1",
            "UUID=sda1 /boot/efi  vfat defaults 0 1",
        ]);
    }

    #[test]
    fn test_automated_lvm_bios_has_root_only() {
        let layout = AutoLayout::derive("/dev/sda", false, true, false);
        let lines = automated_entries(&layout, uuid_of);
        assert_eq!(lines.len(), 2);
        assert!(!lines.iter().any(|l| l.contains("swap")));
    }

    #[test]
    fn test_manual_btrfs_subvolumes() {
        let partitions = vec![
            PartitionSetup {
                path: "/dev/sdb1".to_string(),
                format_as: Some(Filesystem::Btrfs),
                mount_as: Some("/@".to_string()),
                ..Default::default()
            },
            PartitionSetup {
                path: "/dev/sdb2".to_string(),
                fs_type: Some(Filesystem::Btrfs),
                mount_as: Some("/@home".to_string()),
                ..Default::default()
            },
            PartitionSetup {
                path: "/dev/sdb3".to_string(),
                fs_type: Some(Filesystem::Swap),
                mount_as: Some("swap".to_string()),
                ..Default::default()
            },
            PartitionSetup {
                path: "/dev/sdb4".to_string(),
                mount_as: Some("None".to_string()),
                ..Default::default()
            },
        ];
        let lines = manual_entries(&partitions, uuid_of);
        assert_eq!(lines, vec![
            "# /dev/sdb1",
            "UUID=sdb1\t/\tbtrfs\trw,subvol=/@\t0\t0",
            "# /dev/sdb2",
            "UUID=sdb2\t/home\tbtrfs\trw,subvol=/@home\t0\t0",
            "# /dev/sdb3",
            "UUID=sdb3\tswap\tswap\tsw\t0\t0",
        ]);
    }

    #[test]
    fn test_manual_ext_root_and_fat_efi() {
        let partitions = vec![
            PartitionSetup {
                path: "/dev/sda2".to_string(),
                format_as: Some(Filesystem::Ext4),
                mount_as: Some("/".to_string()),
                ..Default::default()
            },
            PartitionSetup {
                path: "/dev/sda1".to_string(),
                fs_type: Some(Filesystem::Fat32),
                mount_as: Some("/boot/efi".to_string()),
                ..Default::default()
            },
        ];
        let lines = manual_entries(&partitions, |d| d.to_string());
        assert_eq!(lines[1], "/dev/sda2\t/\text4\trw,errors=remount-ro\t0\t1");
        assert_eq!(lines[3], "/dev/sda1\t/boot/efi\tvfat\tdefaults\t0\t0");
    }
}
