//! Configuration file handling
//!
//! A configuration file is a single JSON document: the Setup fields at the
//! top level and an optional `engine` object overriding paths and sizes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::setup::Setup;

/// Environment variable naming a directory holding `preinstall.sh` and `postinstall.sh`
pub const SCRIPTS_DIR_ENV: &str = "LIVE_INSTALLER_SCRIPTS_DIR";
/// Environment variable overriding the live image device
pub const MEDIA_ENV: &str = "LIVE_INSTALLER_MEDIA";

/// Paths, timings and sizes the engine works with.
///
/// Every field has a default matching the live image layout, so an empty
/// `engine` object (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Block device carrying the squashfs live image
    pub media_device: PathBuf,
    /// Where the live image is mounted
    pub source_dir: PathBuf,
    /// Root of the system being installed
    pub target_dir: PathBuf,
    pub preinstall_hook: PathBuf,
    pub postinstall_hook: PathBuf,
    /// Resolver configuration copied into the target while chrooted
    pub host_resolv_conf: PathBuf,
    /// Where `grub-mkconfig` output is appended; `None` discards it
    pub bootloader_log: Option<PathBuf>,
    /// Delay before checking for the generated grub.cfg
    pub bootloader_settle_secs: u64,
    pub efi_size_mib: u64,
    pub boot_size_mib: u64,
    pub swap_size_mib: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            media_device: PathBuf::from("/dev/loop0"),
            source_dir: PathBuf::from("/source"),
            target_dir: PathBuf::from("/target"),
            preinstall_hook: PathBuf::from("/usr/lib/live-installer/scripts/preinstall.sh"),
            postinstall_hook: PathBuf::from("/usr/lib/live-installer/scripts/postinstall.sh"),
            host_resolv_conf: PathBuf::from("/etc/resolv.conf"),
            bootloader_log: Some(PathBuf::from("/var/log/live-installer-grub-output.log")),
            bootloader_settle_secs: 5,
            efi_size_mib: 512,
            boot_size_mib: 1024,
            swap_size_mib: 4096,
        }
    }
}

impl EngineConfig {
    /// Resolve an absolute in-system path (e.g. `/etc/fstab`) under the target root
    pub fn in_target(&self, path: impl AsRef<Path>) -> PathBuf {
        under(&self.target_dir, path.as_ref())
    }

    pub fn bootloader_settle(&self) -> Duration {
        Duration::from_secs(self.bootloader_settle_secs)
    }

    /// Apply `LIVE_INSTALLER_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in production)
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(SCRIPTS_DIR_ENV).filter(|v| !v.is_empty()) {
            let dir = PathBuf::from(dir);
            self.preinstall_hook = dir.join("preinstall.sh");
            self.postinstall_hook = dir.join("postinstall.sh");
            tracing::info!("Using install hooks from {}", dir.display());
        }
        if let Some(media) = lookup(MEDIA_ENV).filter(|v| !v.is_empty()) {
            tracing::info!("Using live media {}", media);
            self.media_device = PathBuf::from(media);
        }
    }
}

/// Join an absolute path onto a root without discarding the root
pub fn under(root: &Path, path: &Path) -> PathBuf {
    let relative = path.strip_prefix("/").unwrap_or(path);
    if relative.as_os_str().is_empty() {
        return root.to_path_buf();
    }
    root.join(relative)
}

/// Installation configuration that can be saved/loaded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallConfig {
    #[serde(flatten)]
    pub setup: Setup,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl InstallConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }
}
