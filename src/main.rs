//! live-installer - Main entry point
//!
//! Loads a configuration, runs the installation engine on a worker thread and
//! prints its progress on the main thread.

use std::io::BufRead;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use live_installer::cli::{Cli, Commands};
use live_installer::config::InstallConfig;
use live_installer::engine::AutoLayout;
use live_installer::process_guard::{self, ShutdownGuard};
use live_installer::progress::{ErrorLatch, ProgressUpdate, Severity};
use live_installer::runner::SystemRunner;
use live_installer::sanity;
use live_installer::worker::{EngineEvent, spawn_installation};

/// Initialize the tracing subscriber; `RUST_LOG` overrides the default `info`
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logger();
    info!("live-installer starting up");

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    let cli = Cli::parse_args();
    if cli.fullscreen {
        info!("Fullscreen requested; ignored by the command-line frontend");
    }

    match cli.command {
        Commands::Validate { config } => {
            info!("Validating configuration file: {:?}", config);
            match InstallConfig::load_from_file(&config) {
                Ok(loaded) => match loaded.setup.validate() {
                    Ok(()) => println!("✓ Configuration file is valid: {}", config.display()),
                    Err(e) => {
                        error!("Configuration validation failed: {}", e);
                        eprintln!("✗ Configuration validation failed: {}", e);
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    error!("Failed to load configuration file: {:#}", e);
                    eprintln!("✗ Failed to load configuration file: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Layout {
            disk,
            luks,
            lvm,
            gpt_on_efi,
        } => {
            let layout = AutoLayout::derive(&disk, luks, lvm, gpt_on_efi);
            println!("{}", layout);
        }
        Commands::Install { config } => {
            let succeeded = {
                let _guard = ShutdownGuard::new(Duration::from_secs(3));
                run_installer_with_config(&config, cli.expert_mode)?
            };
            if !succeeded {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Run a full installation; `Ok(false)` means the engine reported a fatal error
fn run_installer_with_config(path: &Path, expert_mode: bool) -> Result<bool> {
    info!("Running installation with config: {:?}", path);
    let mut config = InstallConfig::load_from_file(path)?;
    config.engine.apply_env_overrides();

    if config.setup.skip_mount && !expert_mode {
        bail!("custom setups (skip_mount) are only allowed with --expert-mode");
    }
    config
        .setup
        .validate()
        .context("Configuration validation failed")?;

    sanity::run_preflight_checks();

    let target_dir = config.engine.target_dir.clone();
    let handle = spawn_installation(config.setup, config.engine, SystemRunner::new())?;
    let mut latch = ErrorLatch::new();

    for event in handle.events().iter() {
        match event {
            EngineEvent::Progress(update) => print_progress(&update),
            EngineEvent::Error(report) => {
                match report.severity {
                    Severity::Fatal => eprintln!("✗ {}", report.message),
                    Severity::Warning => eprintln!("! {}", report.message),
                }
                latch.record(&report);
            }
            EngineEvent::AwaitingResume => {
                println!("{}", custom_setup_instructions(&target_dir));
                wait_for_enter()?;
                handle.resume()?;
            }
        }
    }

    if let Err(e) = handle.join() {
        error!("Installation stopped: {}", e);
    }

    for warning in latch.warnings() {
        println!("Note: {}", warning);
    }
    match latch.fatal_message() {
        Some(message) => {
            eprintln!("✗ Installation failed: {}", message);
            Ok(false)
        }
        None => {
            println!("✓ Installation finished. You can now reboot into the installed system.");
            Ok(true)
        }
    }
}

fn print_progress(update: &ProgressUpdate) {
    if update.done {
        println!("[ done ] {}", update.message);
    } else if update.pulse {
        println!("[ .... ] {}", update.message);
    } else if let Some(ratio) = update.ratio() {
        println!("[{:5.1}%] {}", ratio * 100.0, update.message);
    }
}

/// What the user has to do while a custom setup is paused
fn custom_setup_instructions(target: &Path) -> String {
    let target = target.display();
    format!(
        "\n\
         The installation is paused so you can finish the custom setup:\n \
         * Create {target}/etc/fstab for the filesystems as they will be mounted in the\n   \
         new system, matching those mounted at {target} (without the {target} prefix).\n \
         * Install cryptsetup, mdadm or whatever else the new system needs to boot,\n   \
         using chroot {target}.\n \
         * Keep the drives mounted under the same block device names as in fstab.\n\
         \n\
         Press Enter to continue the installation."
    )
}

fn wait_for_enter() -> Result<()> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(())
}
