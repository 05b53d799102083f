//! Property-based tests for live-installer
//!
//! These tests verify:
//! - The automated layout table and partition naming
//! - Progress clamping and monotonicity
//! - fstab entry policy
//! - Keyboard layout pairing

use proptest::prelude::*;

use live_installer::engine::fstab::{automated_entries, manual_entries};
use live_installer::engine::{AutoLayout, partition_path};
use live_installer::progress::{PROGRESS_TOTAL, ProgressTracker, ProgressUpdate};
use live_installer::setup::{KeyboardSelection, NON_LATIN_LAYOUTS, PartitionSetup};
use live_installer::types::{Filesystem, PartitionRole};
use live_installer::InstallStage;

// =============================================================================
// Automated Layout Property Tests
// =============================================================================

/// Strategy for whole-disk device names, SATA/virtio style and NVMe style
fn disk_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[sv]d[a-z]".prop_map(|d| format!("/dev/{}", d)),
        (0u8..4, 1u8..4).prop_map(|(c, n)| format!("/dev/nvme{}n{}", c, n)),
    ]
}

proptest! {
    /// Partitions are numbered 1..=n in order and ROOT is always last
    #[test]
    fn layout_numbering_is_contiguous(
        disk in disk_strategy(),
        luks in any::<bool>(),
        lvm in any::<bool>(),
        gpt in any::<bool>(),
    ) {
        let layout = AutoLayout::derive(&disk, luks, lvm, gpt);
        let partitions = layout.partitions();
        prop_assert!(!partitions.is_empty());
        for (index, partition) in partitions.iter().enumerate() {
            prop_assert_eq!(partition.number as usize, index + 1);
            prop_assert_eq!(&partition.path, &partition_path(&disk, partition.number));
        }
        prop_assert_eq!(partitions.last().map(|p| p.role), Some(PartitionRole::Root));
    }

    /// EFI exists iff GPT; BOOT iff LUKS; SWAP iff neither LUKS nor LVM
    #[test]
    fn layout_roles_follow_flags(
        disk in disk_strategy(),
        luks in any::<bool>(),
        lvm in any::<bool>(),
        gpt in any::<bool>(),
    ) {
        let layout = AutoLayout::derive(&disk, luks, lvm, gpt);
        prop_assert_eq!(layout.efi.is_some(), gpt);
        prop_assert_eq!(layout.boot.is_some(), luks);
        prop_assert_eq!(layout.swap.is_some(), !luks && !lvm);
        prop_assert_eq!(layout.gpt, gpt);
    }

    /// NVMe partitions carry the `p` infix, other disks do not
    #[test]
    fn partition_path_infix(disk in disk_strategy(), number in 1u32..16) {
        let path = partition_path(&disk, number);
        let expected_infix = if disk.starts_with("/dev/nvme") { "p" } else { "" };
        prop_assert_eq!(path, format!("{}{}{}", disk, expected_infix, number));
    }
}

// =============================================================================
// Progress Property Tests
// =============================================================================

fn stage_strategy() -> impl Strategy<Value = InstallStage> {
    prop::sample::select(
        InstallStage::all_stages()
            .iter()
            .copied()
            .filter(|s| !s.is_terminal() && *s != InstallStage::NotStarted)
            .collect::<Vec<_>>(),
    )
}

proptest! {
    /// A fraction never reports more than its total
    #[test]
    fn fraction_is_clamped(current in any::<u64>(), total in any::<u64>()) {
        let update = ProgressUpdate::fraction(current, total, "x");
        prop_assert!(update.current <= update.total);
    }

    /// Whatever order stages report in, the run-wide value never decreases
    #[test]
    fn tracker_is_monotone(
        steps in prop::collection::vec((stage_strategy(), 0u64..5000, 0u64..5000), 1..60)
    ) {
        let mut tracker = ProgressTracker::new();
        let mut last = 0;
        for (stage, done, of) in steps {
            let update = tracker.within(stage, done, of, "step");
            prop_assert!(update.current >= last);
            prop_assert!(update.current <= PROGRESS_TOTAL);
            prop_assert_eq!(update.total, PROGRESS_TOTAL);
            last = update.current;
        }
    }
}

// =============================================================================
// fstab Policy Property Tests
// =============================================================================

fn mount_point_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        Just(Some("None".to_string())),
        Just(Some("/".to_string())),
        Just(Some("/home".to_string())),
        Just(Some("/boot/efi".to_string())),
        Just(Some("swap".to_string())),
        Just(Some("/srv".to_string())),
    ]
}

fn filesystem_strategy() -> impl Strategy<Value = Option<Filesystem>> {
    prop_oneof![
        Just(None),
        Just(Some(Filesystem::Ext4)),
        Just(Some(Filesystem::Xfs)),
        Just(Some(Filesystem::Fat32)),
        Just(Some(Filesystem::Swap)),
    ]
}

fn partition_strategy() -> impl Strategy<Value = PartitionSetup> {
    (1u8..9, mount_point_strategy(), filesystem_strategy()).prop_map(|(n, mount_as, fs)| {
        PartitionSetup {
            path: format!("/dev/sdc{}", n),
            fs_type: fs,
            mount_as,
            ..Default::default()
        }
    })
}

proptest! {
    /// Automated fstab has one comment and one entry per present role
    #[test]
    fn automated_fstab_covers_present_roles(
        luks in any::<bool>(),
        lvm in any::<bool>(),
        gpt in any::<bool>(),
    ) {
        let layout = AutoLayout::derive("/dev/sda", luks, lvm, gpt);
        let lines = automated_entries(&layout, |d| d.to_string());
        prop_assert_eq!(lines.len(), layout.partitions().len() * 2);
        prop_assert!(lines[1].contains(" /  ext4 "), "root comes first");
    }

    /// Unmounted partitions are skipped and only `/` gets an fsck pass
    #[test]
    fn manual_fstab_policy(partitions in prop::collection::vec(partition_strategy(), 0..8)) {
        let lines = manual_entries(&partitions, |d| d.to_string());
        let mounted = partitions.iter().filter(|p| p.mount_point().is_some()).count();
        prop_assert_eq!(lines.len(), mounted * 2);

        for entry in lines.iter().filter(|l| !l.starts_with('#')) {
            let fields: Vec<&str> = entry.split('\t').collect();
            prop_assert_eq!(fields.len(), 6);
            let expected_pass = if fields[1] == "/" { "1" } else { "0" };
            prop_assert_eq!(fields[5], expected_pass);
            prop_assert_ne!(fields[2], "fat32", "FAT is written as vfat");
        }
    }
}

// =============================================================================
// Keyboard Property Tests
// =============================================================================

proptest! {
    /// Pairing a non-Latin layout with `us` and parsing it back yields the choice
    #[test]
    fn non_latin_pairing_parses_back(
        layout in prop::sample::select(NON_LATIN_LAYOUTS.to_vec()),
        variant in "[a-z]{0,8}",
    ) {
        let (stored_layout, stored_variant) = KeyboardSelection::from_choice(layout, &variant);
        let parsed = KeyboardSelection::parse(&stored_layout, &stored_variant);
        prop_assert!(parsed.composite);
        prop_assert_eq!(parsed.primary, layout);
        prop_assert_eq!(parsed.variant, variant);
    }
}
