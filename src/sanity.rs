//! Pre-flight sanity checks for the runtime environment
//!
//! Verified before an installation starts:
//! - required tools are on `PATH` (optional ones only produce a warning)
//! - the process runs with root privileges (EUID 0)
//!
//! A failed check prints a report to stderr and exits before any disk is touched.

use std::process::Command;

use crate::process_guard::CommandProcessGroup;

/// Set to `1` or `true` to bypass every pre-flight check
pub const SKIP_PREFLIGHT_ENV: &str = "LIVE_INSTALLER_SKIP_PREFLIGHT";

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub missing_optional: Vec<String>,
    pub is_root: bool,
}

impl SanityCheckResult {
    /// Returns true if all mandatory checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.is_root
    }
}

/// Tools every installation runs
const REQUIRED_BINARIES: &[&str] = &[
    "mount", "umount", "rsync", "chroot", "blkid", "df", "parted", "mkfs.ext4", "mkswap",
];

/// Tools only some setups need
const OPTIONAL_BINARIES: &[&str] = &[
    "badblocks",     // Disk wipe before partitioning
    "grub-install",  // Bootloader
    "grub-mkconfig",
    "update-grub",
    "mkfs.vfat",     // EFI system partition
    "btrfs",         // @ and @home subvolumes
];

/// Check if a binary is available in PATH
fn binary_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .in_new_process_group()
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

fn missing(binaries: &[&str]) -> Vec<String> {
    binaries
        .iter()
        .filter(|b| !binary_exists(b))
        .map(|b| b.to_string())
        .collect()
}

/// Perform all sanity checks and return the result
pub fn verify_environment() -> SanityCheckResult {
    SanityCheckResult {
        missing_binaries: missing(REQUIRED_BINARIES),
        missing_optional: missing(OPTIONAL_BINARIES),
        is_root: is_running_as_root(),
    }
}

/// Upstream package that ships `binary`
fn get_package_for_binary(binary: &str) -> &'static str {
    match binary {
        "mount" | "umount" | "blkid" => "util-linux",
        "chroot" | "df" => "coreutils",
        "rsync" => "rsync",
        "parted" => "parted",
        "mkfs.ext4" | "badblocks" => "e2fsprogs",
        "mkswap" => "util-linux",
        "grub-install" | "grub-mkconfig" | "update-grub" => "grub",
        "mkfs.vfat" => "dosfstools",
        "btrfs" => "btrfs-progs",
        _ => "unknown",
    }
}

/// Print a report to stderr and exit
pub fn print_error_and_exit(result: &SanityCheckResult) -> ! {
    eprintln!();
    eprintln!("╔══════════════════════════════════════════════════════════════════╗");
    eprintln!("║              live-installer - Pre-flight Check Failed            ║");
    eprintln!("╚══════════════════════════════════════════════════════════════════╝");
    eprintln!();

    if !result.is_root {
        eprintln!("❌ ERROR: Root privileges required");
        eprintln!("   The installer partitions disks, mounts filesystems and chroots.");
        eprintln!();
        eprintln!("   Solution: Run as root:");
        eprintln!("     sudo live-installer install --config <file>");
        eprintln!();
    }

    if !result.missing_binaries.is_empty() {
        eprintln!("❌ ERROR: Missing required binaries");
        eprintln!();
        for binary in &result.missing_binaries {
            eprintln!("   • {} (package: {})", binary, get_package_for_binary(binary));
        }
        eprintln!();
    }

    eprintln!("╔══════════════════════════════════════════════════════════════════╗");
    eprintln!("║  Fix the above issues and try again.                             ║");
    eprintln!("╚══════════════════════════════════════════════════════════════════╝");
    eprintln!();

    std::process::exit(1);
}

/// Whether the environment asks to bypass pre-flight checks
pub fn should_skip_preflight() -> bool {
    std::env::var(SKIP_PREFLIGHT_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Verify the environment and exit if a mandatory check fails
pub fn run_preflight_checks() {
    if should_skip_preflight() {
        tracing::warn!("Pre-flight checks skipped ({}=1)", SKIP_PREFLIGHT_ENV);
        return;
    }
    tracing::debug!("Running pre-flight sanity checks...");

    let result = verify_environment();
    for binary in &result.missing_optional {
        tracing::warn!(
            "Optional binary not found: {} (package: {})",
            binary,
            get_package_for_binary(binary)
        );
    }

    if !result.is_ok() {
        print_error_and_exit(&result);
    }

    tracing::info!("Pre-flight checks passed");
}
