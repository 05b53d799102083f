//! live-installer library
//!
//! Installation engine that copies a running live system onto a target disk
//! and turns it into a bootable installation, driven by a frozen [`Setup`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod install_state;
pub mod mock;
pub mod process_guard;
pub mod progress;
pub mod runner;
pub mod sanity;
pub mod setup;
pub mod types;
pub mod worker;

// Re-export main types for convenience
pub use config::{EngineConfig, InstallConfig};
pub use engine::{AutoLayout, BootloaderOutcome, InstallationEngine, MountKind, MountRecord};
pub use error::{InstallerError, Result};
pub use install_state::{InstallStage, InstallTransitionError, RunStages};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ShutdownGuard};
pub use progress::{ErrorLatch, ErrorReport, ProgressUpdate, Reporter, Severity};
pub use runner::{CommandOutput, CommandSpec, ProcessRunner, SystemRunner};
pub use setup::{KeyboardSelection, PartitionSetup, Setup};
pub use types::{Filesystem, PartitionRole};
pub use worker::{EngineEvent, InstallHandle, spawn_installation};
