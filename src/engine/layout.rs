//! Automated partition layout
//!
//! Translates `(luks, lvm, gpt_on_efi)` into which logical roles exist on the
//! wiped disk and which partition number each one gets.
//!
//! # Layout Table
//!
//! | luks | lvm | gpt_on_efi | Partitions (in order) |
//! |------|-----|------------|-----------------------|
//! | yes  |  -  | yes        | EFI, BOOT, ROOT       |
//! | yes  |  -  | no         | BOOT, ROOT            |
//! | no   | yes | yes        | EFI, ROOT             |
//! | no   | yes | no         | ROOT                  |
//! | no   | no  | yes        | EFI, SWAP, ROOT       |
//! | no   | no  | no         | SWAP, ROOT            |
//!
//! Pure logic: no I/O. The engine turns an [`AutoLayout`] into parted, mkfs
//! and mount calls, and the fstab writer reads the same struct.

use std::fmt;

use crate::types::PartitionRole;

/// Device node of partition `number` on `disk`.
///
/// NVMe namespaces end in a digit, so their partitions take a `p` infix
/// (`/dev/nvme0n1p2`).
pub fn partition_path(disk: &str, number: u32) -> String {
    if disk.starts_with("/dev/nvme") {
        format!("{}p{}", disk, number)
    } else {
        format!("{}{}", disk, number)
    }
}

/// Roles present on the disk, in partition order
pub fn roles_for(luks: bool, lvm: bool, gpt_on_efi: bool) -> &'static [PartitionRole] {
    use PartitionRole::*;
    match (luks, lvm, gpt_on_efi) {
        (true, _, true) => &[Efi, Boot, Root],
        (true, _, false) => &[Boot, Root],
        (false, true, true) => &[Efi, Root],
        (false, true, false) => &[Root],
        (false, false, true) => &[Efi, Swap, Root],
        (false, false, false) => &[Swap, Root],
    }
}

/// A partition the automated path creates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoPartition {
    pub role: PartitionRole,
    /// 1-based partition number
    pub number: u32,
    pub path: String,
}

/// Derived automated layout; absent roles are `None`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoLayout {
    pub disk: String,
    pub gpt: bool,
    pub efi: Option<String>,
    pub boot: Option<String>,
    pub swap: Option<String>,
    pub root: String,
    partitions: Vec<AutoPartition>,
}

impl AutoLayout {
    pub fn derive(disk: &str, luks: bool, lvm: bool, gpt_on_efi: bool) -> Self {
        let partitions: Vec<AutoPartition> = roles_for(luks, lvm, gpt_on_efi)
            .iter()
            .zip(1u32..)
            .map(|(role, number)| AutoPartition {
                role: *role,
                number,
                path: partition_path(disk, number),
            })
            .collect();

        let path_of = |role: PartitionRole| {
            partitions
                .iter()
                .find(|p| p.role == role)
                .map(|p| p.path.clone())
        };

        Self {
            disk: disk.to_string(),
            gpt: gpt_on_efi,
            efi: path_of(PartitionRole::Efi),
            boot: path_of(PartitionRole::Boot),
            swap: path_of(PartitionRole::Swap),
            // Every row of the table ends with ROOT
            root: path_of(PartitionRole::Root).unwrap_or_else(|| partition_path(disk, 1)),
            partitions,
        }
    }

    /// Partitions in on-disk order
    pub fn partitions(&self) -> &[AutoPartition] {
        &self.partitions
    }

    pub fn path_of(&self, role: PartitionRole) -> Option<&str> {
        match role {
            PartitionRole::Efi => self.efi.as_deref(),
            PartitionRole::Boot => self.boot.as_deref(),
            PartitionRole::Swap => self.swap.as_deref(),
            PartitionRole::Root => Some(&self.root),
        }
    }
}

impl fmt::Display for AutoLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .partitions
            .iter()
            .map(|p| format!("{}={}", p.role, p.path))
            .collect();
        write!(
            f,
            "{} ({}): {}",
            self.disk,
            if self.gpt { "gpt" } else { "msdos" },
            parts.join(", ")
        )
    }
}
