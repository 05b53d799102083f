//! The Setup snapshot: every choice the user made in the wizard.
//!
//! The engine reads a `Setup` but never changes it. [`Setup::validate`] holds
//! the checks the wizard runs before it lets the user start an installation;
//! the engine assumes they already passed.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{InstallerError, Result};
use crate::types::Filesystem;

/// Layouts whose keymaps cannot type Latin text, so they are paired with `us`
pub const NON_LATIN_LAYOUTS: &[&str] = &[
    "am", "af", "ara", "ben", "bd", "bg", "bn", "bt", "by", "deva", "et", "ge", "gh", "gn", "gr",
    "guj", "guru", "id", "il", "iku", "in", "iq", "ir", "kan", "kg", "kh", "kz", "la", "lao", "lk",
    "ma", "mk", "mm", "mn", "mv", "mal", "my", "np", "ori", "pk", "ru", "rs", "scc", "sy", "syr",
    "tel", "th", "tj", "tam", "tz", "ua", "uz",
];

/// Minimum size of an EFI system partition
pub const MIN_EFI_SIZE_MB: u64 = 35;

/// Filesystem column of the partition editor; blank and `None` mean unset
fn optional_filesystem<'de, D>(deserializer: D) -> std::result::Result<Option<Filesystem>, D::Error>
where
    D: Deserializer<'de>,
{
    let name = Option::<String>::deserialize(deserializer)?;
    Ok(name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty() && *n != "None")
        .map(Filesystem::from_name))
}

/// One entry of a manual partition plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSetup {
    /// Device node, e.g. `/dev/sda2`
    pub path: String,
    /// Filesystem currently on the partition
    #[serde(rename = "type", default, deserialize_with = "optional_filesystem")]
    pub fs_type: Option<Filesystem>,
    /// Filesystem to create; `None` keeps the existing one
    #[serde(default, deserialize_with = "optional_filesystem")]
    pub format_as: Option<Filesystem>,
    /// Mount point in the installed system (`/`, `/@`, `/@home`, `swap`, `/home`, ...)
    #[serde(default)]
    pub mount_as: Option<String>,
    #[serde(default)]
    pub bootable: bool,
    #[serde(default)]
    pub size_mb: u64,
}

impl PartitionSetup {
    /// Filesystem the partition carries once formatting is done
    pub fn effective_filesystem(&self) -> Option<&Filesystem> {
        self.format_as.as_ref().or(self.fs_type.as_ref())
    }

    /// The mount point, ignoring the empty and `None` placeholders the editor emits
    pub fn mount_point(&self) -> Option<&str> {
        self.mount_as
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty() && *m != "None")
    }

    pub fn is_mounted_at(&self, mount_point: &str) -> bool {
        self.mount_point() == Some(mount_point)
    }
}

/// User choices consumed read-only by the installation engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Setup {
    // Locale & keyboard
    pub language: String,
    pub timezone: String,
    pub keyboard_model: String,
    /// Either a plain layout or the composite `us,<layout>` form
    pub keyboard_layout: String,
    pub keyboard_variant: String,

    // Accounts
    pub username: String,
    pub real_name: String,
    pub hostname: String,
    pub password1: String,
    pub password2: String,
    pub autologin: bool,

    // Disk
    pub automated: bool,
    pub disk: Option<String>,
    /// Human readable disk model, shown by the caller
    pub diskname: Option<String>,
    pub lvm: bool,
    pub luks: bool,
    pub gpt_on_efi: bool,
    pub badblocks: bool,
    pub skip_mount: bool,
    pub partitions: Vec<PartitionSetup>,

    // Bootloader
    pub grub_device: Option<String>,
}

impl Setup {
    /// Parsed keyboard selection
    pub fn keyboard(&self) -> KeyboardSelection {
        KeyboardSelection::parse(&self.keyboard_layout, &self.keyboard_variant)
    }

    /// First partition assigned to `mount_point`
    pub fn partition_for(&self, mount_point: &str) -> Option<&PartitionSetup> {
        self.partitions.iter().find(|p| p.is_mounted_at(mount_point))
    }

    /// Check everything the wizard guarantees before an installation may start
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("Language", &self.language),
            ("Timezone", &self.timezone),
            ("Keyboard layout", &self.keyboard_layout),
        ] {
            if value.trim().is_empty() {
                return Err(InstallerError::validation(format!("{} must be set", name)));
            }
        }

        validate_identifier("Username", &self.username)?;
        validate_identifier("Hostname", &self.hostname)?;

        if self.password1.is_empty() {
            return Err(InstallerError::validation("Password must not be empty"));
        }
        if self.password1 != self.password2 {
            return Err(InstallerError::validation("Passwords do not match"));
        }

        if self.skip_mount {
            return Ok(());
        }

        if self.automated {
            if self.disk.as_deref().is_none_or(|d| d.trim().is_empty()) {
                return Err(InstallerError::validation(
                    "An automated installation needs a target disk",
                ));
            }
            return Ok(());
        }

        self.validate_partitions()
    }

    fn validate_partitions(&self) -> Result<()> {
        let root = self.partition_for("/");
        let root_subvolume = self.partition_for("/@");

        match (root, root_subvolume) {
            (None, None) => {
                return Err(InstallerError::validation(
                    "Please select a root (/) partition",
                ));
            }
            (Some(root), _) if root.format_as.is_none() => {
                return Err(InstallerError::validation(format!(
                    "The root partition {} must be formatted",
                    root.path
                )));
            }
            _ => {}
        }

        if let Some(subvolume) = root_subvolume {
            if subvolume.format_as != Some(Filesystem::Btrfs) {
                return Err(InstallerError::validation(format!(
                    "{} is mounted as /@ and must be formatted as btrfs",
                    subvolume.path
                )));
            }
        }

        if let Some(home) = self.partition_for("/@home") {
            let formatted_btrfs = home.format_as == Some(Filesystem::Btrfs);
            let existing_btrfs =
                home.format_as.is_none() && home.fs_type == Some(Filesystem::Btrfs);
            if !formatted_btrfs && !existing_btrfs {
                return Err(InstallerError::validation(format!(
                    "{} is mounted as /@home and must be a btrfs filesystem",
                    home.path
                )));
            }
        }

        if self.gpt_on_efi {
            let Some(efi) = self.partition_for("/boot/efi") else {
                return Err(InstallerError::validation(
                    "An EFI system partition mounted at /boot/efi is required",
                ));
            };
            if !efi.bootable {
                return Err(InstallerError::validation(format!(
                    "The EFI partition {} must have the boot flag",
                    efi.path
                )));
            }
            if efi.size_mb < MIN_EFI_SIZE_MB {
                return Err(InstallerError::validation(format!(
                    "The EFI partition {} must be at least {}MB",
                    efi.path, MIN_EFI_SIZE_MB
                )));
            }
            if !efi.effective_filesystem().is_some_and(Filesystem::is_fat) {
                return Err(InstallerError::validation(format!(
                    "The EFI partition {} must be a vfat filesystem",
                    efi.path
                )));
            }
        }

        Ok(())
    }
}

fn validate_identifier(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(InstallerError::validation(format!("{} must be set", name)));
    }
    if value.chars().any(|c| c.is_uppercase() || c.is_whitespace()) {
        return Err(InstallerError::validation(format!(
            "{} must be lowercase and contain no spaces",
            name
        )));
    }
    Ok(())
}

/// A keyboard layout with the `us,` pairing for non-Latin layouts undone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardSelection {
    /// The layout the user picked (`ru` for `us,ru`)
    pub primary: String,
    /// The variant of the primary layout, without the leading comma
    pub variant: String,
    /// Whether the stored layout is the `us,<layout>` pair
    pub composite: bool,
}

impl KeyboardSelection {
    /// Parse the stored layout/variant pair
    pub fn parse(layout: &str, variant: &str) -> Self {
        let layout = layout.trim();
        let variant = variant.trim();
        match layout.split_once(',') {
            Some((_, second)) => Self {
                primary: second.trim().to_string(),
                variant: variant
                    .split_once(',')
                    .map_or(variant, |(_, v)| v)
                    .trim()
                    .to_string(),
                composite: true,
            },
            None => Self {
                primary: layout.to_string(),
                variant: variant.to_string(),
                composite: false,
            },
        }
    }

    /// Build the (layout, variant) pair to store for a user choice
    pub fn from_choice(layout: &str, variant: &str) -> (String, String) {
        if NON_LATIN_LAYOUTS.contains(&layout) {
            (format!("us,{}", layout), format!(",{}", variant))
        } else {
            (layout.to_string(), variant.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_setup() -> Setup {
        Setup {
            language: "en_US".to_string(),
            timezone: "Europe/Istanbul".to_string(),
            keyboard_model: "pc105".to_string(),
            keyboard_layout: "us".to_string(),
            username: "ada".to_string(),
            hostname: "workstation".to_string(),
            password1: "secret".to_string(),
            password2: "secret".to_string(),
            partitions: vec![PartitionSetup {
                path: "/dev/sda1".to_string(),
                format_as: Some(Filesystem::Ext4),
                mount_as: Some("/".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn efi(format_as: Option<Filesystem>, bootable: bool, size_mb: u64) -> PartitionSetup {
        PartitionSetup {
            path: "/dev/sda1".to_string(),
            fs_type: Some(Filesystem::Fat32),
            format_as,
            mount_as: Some("/boot/efi".to_string()),
            bootable,
            size_mb,
        }
    }

    #[test]
    fn test_valid_setup_passes() {
        assert!(valid_setup().validate().is_ok());
    }

    #[test]
    fn test_uppercase_or_spaced_identifiers_rejected() {
        let mut setup = valid_setup();
        setup.username = "Ada".to_string();
        assert!(setup.validate().is_err());

        let mut setup = valid_setup();
        setup.hostname = "my host".to_string();
        assert!(setup.validate().is_err());
    }

    #[test]
    fn test_password_mismatch_rejected() {
        let mut setup = valid_setup();
        setup.password2 = "other".to_string();
        let err = setup.validate().unwrap_err();
        assert!(err.to_string().contains("do not match"));
    }

    #[test]
    fn test_missing_root_rejected() {
        let mut setup = valid_setup();
        setup.partitions[0].mount_as = Some("/home".to_string());
        assert!(setup.validate().is_err());
    }

    #[test]
    fn test_unformatted_root_rejected() {
        let mut setup = valid_setup();
        setup.partitions[0].format_as = None;
        assert!(setup.validate().is_err());
    }

    #[test]
    fn test_root_subvolume_requires_btrfs() {
        let mut setup = valid_setup();
        setup.partitions[0].mount_as = Some("/@".to_string());
        assert!(setup.validate().is_err());

        setup.partitions[0].format_as = Some(Filesystem::Btrfs);
        assert!(setup.validate().is_ok());
    }

    #[test]
    fn test_home_subvolume_accepts_existing_btrfs() {
        let mut setup = valid_setup();
        setup.partitions.push(PartitionSetup {
            path: "/dev/sda2".to_string(),
            fs_type: Some(Filesystem::Btrfs),
            mount_as: Some("/@home".to_string()),
            ..Default::default()
        });
        assert!(setup.validate().is_ok());

        setup.partitions[1].fs_type = Some(Filesystem::Ext4);
        assert!(setup.validate().is_err());
    }

    #[test]
    fn test_efi_constraints() {
        let mut setup = valid_setup();
        setup.gpt_on_efi = true;
        assert!(setup.validate().is_err(), "missing EFI partition");

        setup.partitions.push(efi(None, false, 512));
        assert!(setup.validate().is_err(), "not bootable");

        setup.partitions[1] = efi(None, true, 20);
        assert!(setup.validate().is_err(), "too small");

        setup.partitions[1] = efi(Some(Filesystem::Ext4), true, 512);
        assert!(setup.validate().is_err(), "wrong filesystem");

        setup.partitions[1] = efi(None, true, 512);
        assert!(setup.validate().is_ok());

        setup.partitions[1] = efi(Some(Filesystem::Vfat), true, 512);
        assert!(setup.validate().is_ok());
    }

    #[test]
    fn test_automated_requires_disk() {
        let mut setup = valid_setup();
        setup.automated = true;
        setup.partitions.clear();
        assert!(setup.validate().is_err());

        setup.disk = Some("/dev/sda".to_string());
        assert!(setup.validate().is_ok());
    }

    #[test]
    fn test_skip_mount_ignores_partition_plan() {
        let mut setup = valid_setup();
        setup.skip_mount = true;
        setup.partitions.clear();
        assert!(setup.validate().is_ok());
    }

    #[test]
    fn test_mount_point_placeholders() {
        let mut partition = PartitionSetup::default();
        assert_eq!(partition.mount_point(), None);
        partition.mount_as = Some("None".to_string());
        assert_eq!(partition.mount_point(), None);
        partition.mount_as = Some("/home".to_string());
        assert_eq!(partition.mount_point(), Some("/home"));
    }

    #[test]
    fn test_blank_filesystem_columns_are_unset() {
        let partition: PartitionSetup = serde_json::from_str(
            r#"{"path": "/dev/sdb1", "type": "", "format_as": " ", "mount_as": "/"}"#,
        )
        .unwrap();
        assert_eq!(partition.fs_type, None);
        assert_eq!(partition.format_as, None);
        assert_eq!(partition.effective_filesystem(), None);

        let partition: PartitionSetup =
            serde_json::from_str(r#"{"path": "/dev/sdb2", "type": "ext4", "format_as": "None"}"#)
                .unwrap();
        assert_eq!(partition.fs_type, Some(Filesystem::Ext4));
        assert_eq!(partition.format_as, None);
    }

    #[test]
    fn test_blank_format_does_not_count_as_formatted_root() {
        let mut setup = valid_setup();
        setup.partitions = vec![
            serde_json::from_str(
                r#"{"path": "/dev/sdb1", "type": "ext4", "format_as": "", "mount_as": "/"}"#,
            )
            .unwrap(),
        ];
        let err = setup.validate().unwrap_err();
        assert!(err.to_string().contains("must be formatted"));
    }

    #[test]
    fn test_keyboard_composite_parse() {
        let kb = KeyboardSelection::parse("us,ru", ",phonetic");
        assert_eq!(kb.primary, "ru");
        assert_eq!(kb.variant, "phonetic");
        assert!(kb.composite);

        let kb = KeyboardSelection::parse("tr", "f");
        assert_eq!(kb.primary, "tr");
        assert_eq!(kb.variant, "f");
        assert!(!kb.composite);
    }

    #[test]
    fn test_keyboard_from_choice() {
        assert_eq!(
            KeyboardSelection::from_choice("ru", ""),
            ("us,ru".to_string(), ",".to_string())
        );
        assert_eq!(
            KeyboardSelection::from_choice("de", "nodeadkeys"),
            ("de".to_string(), "nodeadkeys".to_string())
        );
    }
}
