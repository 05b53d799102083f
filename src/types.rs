//! Typed values shared by the setup model and the engine
//!
//! Filesystem names arrive as free-form strings from the partition editor,
//! so [`Filesystem`] keeps an `Other` variant instead of rejecting unknown
//! names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};

/// Filesystem type of a partition, either current (`type`) or requested (`formatAs`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Filesystem {
    Swap,
    Ext2,
    Ext3,
    Ext4,
    Jfs,
    Btrfs,
    Xfs,
    Vfat,
    Fat16,
    Fat32,
    /// Any other filesystem, formatted with the generic `mkfs.<name>`
    Other(String),
}

impl Filesystem {
    /// Name as understood by `mkfs.*` and written to fstab before vfat mapping
    pub fn as_str(&self) -> &str {
        match self {
            Self::Swap => "swap",
            Self::Ext2 => "ext2",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Jfs => "jfs",
            Self::Btrfs => "btrfs",
            Self::Xfs => "xfs",
            Self::Vfat => "vfat",
            Self::Fat16 => "fat16",
            Self::Fat32 => "fat32",
            Self::Other(name) => name,
        }
    }

    /// Type passed to `mount -t`; the kernel only knows FAT variants as vfat
    pub fn mount_type(&self) -> &str {
        match self {
            Self::Fat16 | Self::Fat32 => "vfat",
            other => other.as_str(),
        }
    }

    pub fn is_ext(&self) -> bool {
        matches!(self, Self::Ext2 | Self::Ext3 | Self::Ext4)
    }

    pub fn is_fat(&self) -> bool {
        matches!(self, Self::Vfat | Self::Fat16 | Self::Fat32)
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Filesystem {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl Filesystem {
    /// Parse an editor name; unknown names are kept as `Other`
    pub fn from_name(s: &str) -> Self {
        let name = s.trim().to_lowercase();
        match name.as_str() {
            "swap" | "linux-swap" => Self::Swap,
            "ext2" => Self::Ext2,
            "ext3" => Self::Ext3,
            "ext4" => Self::Ext4,
            "jfs" => Self::Jfs,
            "btrfs" => Self::Btrfs,
            "xfs" => Self::Xfs,
            "vfat" => Self::Vfat,
            "fat16" => Self::Fat16,
            "fat32" => Self::Fat32,
            _ => Self::Other(name),
        }
    }
}

impl From<String> for Filesystem {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<Filesystem> for String {
    fn from(value: Filesystem) -> Self {
        value.as_str().to_string()
    }
}

/// Logical role of a partition in the automated layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "UPPERCASE")]
pub enum PartitionRole {
    Efi,
    Boot,
    Swap,
    Root,
}

impl PartitionRole {
    /// Filesystem the automated path formats this role with
    pub fn filesystem(self) -> Filesystem {
        match self {
            Self::Efi => Filesystem::Vfat,
            Self::Boot | Self::Root => Filesystem::Ext4,
            Self::Swap => Filesystem::Swap,
        }
    }
}
