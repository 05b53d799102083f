//! Block device and filesystem tools: mount, umount, mkfs, parted, btrfs, badblocks, blkid.

use std::path::PathBuf;

use super::ToolArgs;
use crate::types::Filesystem;

/// Arguments for `mount`.
///
/// # Field to Flag Mapping
///
/// | Field         | Flag              |
/// |---------------|-------------------|
/// | `fs_type`     | `-t <type>`       |
/// | `options`     | `-o <options>`    |
/// | `device`      | positional        |
/// | `mount_point` | positional        |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountArgs {
    pub device: String,
    pub mount_point: PathBuf,
    pub fs_type: Option<String>,
    pub options: Option<String>,
}

impl MountArgs {
    pub fn new(device: impl Into<String>, mount_point: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            mount_point: mount_point.into(),
            fs_type: None,
            options: None,
        }
    }

    pub fn fs_type(mut self, fs_type: impl Into<String>) -> Self {
        self.fs_type = Some(fs_type.into());
        self
    }

    pub fn options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }
}

impl ToolArgs for MountArgs {
    fn program(&self) -> String {
        "mount".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(fs_type) = &self.fs_type {
            args.push("-t".to_string());
            args.push(fs_type.clone());
        }
        if let Some(options) = &self.options {
            args.push("-o".to_string());
            args.push(options.clone());
        }
        args.push(self.device.clone());
        args.push(self.mount_point.display().to_string());
        args
    }
}

/// Arguments for `mount --bind <source> <target>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMountArgs {
    pub source: PathBuf,
    pub target: PathBuf,
}

impl ToolArgs for BindMountArgs {
    fn program(&self) -> String {
        "mount".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "--bind".to_string(),
            self.source.display().to_string(),
            self.target.display().to_string(),
        ]
    }
}

/// Arguments for `umount`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UmountArgs {
    pub target: PathBuf,
    /// Pass `--force`
    pub force: bool,
}

impl UmountArgs {
    pub fn forced(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            force: true,
        }
    }
}

impl ToolArgs for UmountArgs {
    fn program(&self) -> String {
        "umount".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.force {
            args.push("--force".to_string());
        }
        args.push(self.target.display().to_string());
        args
    }
}

/// Arguments for creating a filesystem.
///
/// The program and flags depend on the filesystem:
///
/// | Filesystem    | Command                       |
/// |---------------|-------------------------------|
/// | swap          | `mkswap <dev>`                |
/// | ext2/3/4      | `mkfs.extN -F <dev>`          |
/// | jfs           | `mkfs.jfs -q <dev>`           |
/// | btrfs, xfs    | `mkfs.<fs> -f <dev>`          |
/// | vfat, fat32   | `mkfs.vfat <dev> -F 32`       |
/// | fat16         | `mkfs.vfat <dev> -F 16`       |
/// | anything else | `mkfs.<fs> <dev>`             |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MkfsArgs {
    pub device: String,
    pub filesystem: Filesystem,
}

impl ToolArgs for MkfsArgs {
    fn program(&self) -> String {
        match &self.filesystem {
            Filesystem::Swap => "mkswap".to_string(),
            Filesystem::Vfat | Filesystem::Fat16 | Filesystem::Fat32 => "mkfs.vfat".to_string(),
            other => format!("mkfs.{}", other.as_str()),
        }
    }

    fn to_cli_args(&self) -> Vec<String> {
        let device = self.device.clone();
        match &self.filesystem {
            Filesystem::Ext2 | Filesystem::Ext3 | Filesystem::Ext4 => vec!["-F".to_string(), device],
            Filesystem::Jfs => vec!["-q".to_string(), device],
            Filesystem::Btrfs | Filesystem::Xfs => vec!["-f".to_string(), device],
            Filesystem::Vfat | Filesystem::Fat32 => {
                vec![device, "-F".to_string(), "32".to_string()]
            }
            Filesystem::Fat16 => vec![device, "-F".to_string(), "16".to_string()],
            Filesystem::Swap | Filesystem::Other(_) => vec![device],
        }
    }
}

/// Arguments for `btrfs subvolume create <path>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtrfsSubvolumeArgs {
    pub path: PathBuf,
}

impl ToolArgs for BtrfsSubvolumeArgs {
    fn program(&self) -> String {
        "btrfs".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "subvolume".to_string(),
            "create".to_string(),
            self.path.display().to_string(),
        ]
    }
}

/// Destructive random-pattern write test over a whole disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadblocksArgs {
    pub disk: String,
}

impl ToolArgs for BadblocksArgs {
    fn program(&self) -> String {
        "badblocks".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        ["-c", "10240", "-s", "-w", "-t", "random", "-v", &self.disk]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

/// Print only the filesystem UUID of a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlkidUuidArgs {
    pub device: String,
}

impl ToolArgs for BlkidUuidArgs {
    fn program(&self) -> String {
        "blkid".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-s".to_string(),
            "UUID".to_string(),
            "-o".to_string(),
            "value".to_string(),
            self.device.clone(),
        ]
    }
}

/// One `parted` operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartedOp {
    /// Create a fresh partition table (`gpt` or `msdos`)
    MkLabel(&'static str),
    /// Create a primary partition; `end_mib: None` extends to the end of the disk
    MkPart {
        fs_type: &'static str,
        start_mib: u64,
        end_mib: Option<u64>,
    },
    /// Turn a flag on for partition `number`
    SetFlag { number: u32, flag: &'static str },
}

/// Arguments for `parted --script`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartedArgs {
    pub disk: String,
    pub op: PartedOp,
}

impl ToolArgs for PartedArgs {
    fn program(&self) -> String {
        "parted".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["--script".to_string()];
        match &self.op {
            PartedOp::MkLabel(label) => {
                args.push(self.disk.clone());
                args.push("mklabel".to_string());
                args.push(label.to_string());
            }
            PartedOp::MkPart {
                fs_type,
                start_mib,
                end_mib,
            } => {
                args.push("-a".to_string());
                args.push("optimal".to_string());
                args.push(self.disk.clone());
                args.push("mkpart".to_string());
                args.push("primary".to_string());
                args.push(fs_type.to_string());
                args.push(format!("{}MiB", start_mib));
                args.push(end_mib.map_or_else(|| "100%".to_string(), |end| format!("{}MiB", end)));
            }
            PartedOp::SetFlag { number, flag } => {
                args.push(self.disk.clone());
                args.push("set".to_string());
                args.push(number.to_string());
                args.push(flag.to_string());
                args.push("on".to_string());
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mkfs(fs: Filesystem) -> Vec<String> {
        MkfsArgs {
            device: "/dev/sdb1".to_string(),
            filesystem: fs,
        }
        .command()
        .argv()
    }

    #[test]
    fn test_mkfs_flags_per_filesystem() {
        assert_eq!(mkfs(Filesystem::Swap), vec!["mkswap", "/dev/sdb1"]);
        assert_eq!(mkfs(Filesystem::Ext3), vec!["mkfs.ext3", "-F", "/dev/sdb1"]);
        assert_eq!(mkfs(Filesystem::Jfs), vec!["mkfs.jfs", "-q", "/dev/sdb1"]);
        assert_eq!(mkfs(Filesystem::Btrfs), vec!["mkfs.btrfs", "-f", "/dev/sdb1"]);
        assert_eq!(mkfs(Filesystem::Xfs), vec!["mkfs.xfs", "-f", "/dev/sdb1"]);
        assert_eq!(mkfs(Filesystem::Vfat), vec!["mkfs.vfat", "/dev/sdb1", "-F", "32"]);
        assert_eq!(mkfs(Filesystem::Fat16), vec!["mkfs.vfat", "/dev/sdb1", "-F", "16"]);
        assert_eq!(
            mkfs(Filesystem::Other("f2fs".to_string())),
            vec!["mkfs.f2fs", "/dev/sdb1"]
        );
    }

    #[test]
    fn test_mount_args_order() {
        let args = MountArgs::new("/dev/sda2", "/target")
            .fs_type("btrfs")
            .options("subvol=@")
            .to_cli_args();
        assert_eq!(args, vec!["-t", "btrfs", "-o", "subvol=@", "/dev/sda2", "/target"]);
    }

    #[test]
    fn test_umount_forced() {
        assert_eq!(
            UmountArgs::forced("/target/proc").to_cli_args(),
            vec!["--force", "/target/proc"]
        );
    }

    #[test]
    fn test_parted_mkpart_to_end_of_disk() {
        let args = PartedArgs {
            disk: "/dev/sda".to_string(),
            op: PartedOp::MkPart {
                fs_type: "ext4",
                start_mib: 513,
                end_mib: None,
            },
        }
        .to_cli_args();
        assert_eq!(args.last().map(String::as_str), Some("100%"));
        assert!(args.contains(&"513MiB".to_string()));
    }

    #[test]
    fn test_badblocks_is_write_mode() {
        let args = BadblocksArgs {
            disk: "/dev/sda".to_string(),
        }
        .to_cli_args();
        assert!(args.contains(&"-w".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/dev/sda"));
    }
}
