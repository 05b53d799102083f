use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// live-installer - installs a running live system onto disk
#[derive(Parser)]
#[command(name = "live-installer")]
#[command(about = "Copies a live system onto a disk and makes it bootable")]
#[command(version)]
pub struct Cli {
    /// Expert mode: allow custom setups where the target is mounted by hand.
    ///
    /// Configurations with `skip_mount` are rejected without this flag.
    #[arg(long, global = true)]
    pub expert_mode: bool,

    /// Ask the frontend for a fullscreen window (presentation only)
    #[arg(long, global = true)]
    pub fullscreen: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an installation from a configuration file
    Install {
        /// Path to the JSON configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
    /// Print the automated partition layout for a disk
    Layout {
        /// Whole-disk device (e.g., /dev/sda or /dev/nvme0n1)
        #[arg(short, long)]
        disk: String,
        /// Encrypted root: adds a separate /boot partition
        #[arg(long)]
        luks: bool,
        /// LVM root: no swap partition
        #[arg(long)]
        lvm: bool,
        /// GPT with an EFI system partition
        #[arg(long)]
        gpt_on_efi: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_install_requires_config() {
        assert!(Cli::try_parse_from(["live-installer", "install"]).is_err());

        let cli = Cli::try_parse_from(["live-installer", "install", "--config", "setup.json"])
            .unwrap();
        assert!(!cli.expert_mode);
        match cli.command {
            Commands::Install { config } => assert_eq!(config, PathBuf::from("setup.json")),
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "live-installer",
            "install",
            "-c",
            "setup.json",
            "--expert-mode",
            "--fullscreen",
        ])
        .unwrap();
        assert!(cli.expert_mode);
        assert!(cli.fullscreen);
    }

    #[test]
    fn test_cli_validate() {
        let result = Cli::try_parse_from(["live-installer", "validate", "setup.json"]);
        assert!(result.is_ok());
    }

    #[test]
    fn test_cli_layout_flags() {
        let cli = Cli::try_parse_from([
            "live-installer",
            "layout",
            "--disk",
            "/dev/nvme0n1",
            "--luks",
            "--gpt-on-efi",
        ])
        .unwrap();
        match cli.command {
            Commands::Layout {
                disk,
                luks,
                lvm,
                gpt_on_efi,
            } => {
                assert_eq!(disk, "/dev/nvme0n1");
                assert!(luks && gpt_on_efi && !lvm);
            }
            _ => panic!("expected layout"),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["live-installer"]).is_err());
    }
}
