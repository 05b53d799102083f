//! Typed arguments for the external tools the engine drives.
//!
//! Each tool invocation is a struct implementing [`ToolArgs`]. The struct
//! definition is the contract: field-to-flag mapping lives in exactly one
//! `to_cli_args` implementation, and the engine never assembles argv by hand.
//!
//! # Contract
//!
//! - `program()`: executable name resolved through `PATH` (inside the chroot
//!   when the resulting command is chroot-scoped).
//! - `to_cli_args()`: arguments exactly as the tool expects them.
//! - `stdin()`: secrets and other input that must not appear in argv or logs.

pub mod disk;
pub mod system;

use crate::runner::CommandSpec;

/// Trait for typed tool arguments.
pub trait ToolArgs {
    fn program(&self) -> String;

    fn to_cli_args(&self) -> Vec<String>;

    fn stdin(&self) -> Option<String> {
        None
    }

    /// Build the runnable command
    fn command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(self.program()).args(self.to_cli_args());
        if let Some(input) = self.stdin() {
            spec = spec.with_stdin(input);
        }
        spec
    }
}

pub use disk::{
    BadblocksArgs, BindMountArgs, BlkidUuidArgs, BtrfsSubvolumeArgs, MkfsArgs, MountArgs,
    PartedArgs, PartedOp, UmountArgs,
};
pub use system::{
    ChmodArgs, ChownArgs, DfInodesArgs, GrubInstallArgs, GrubMkconfigArgs, HookArgs, MkdirArgs,
    PasswdArgs, RsyncArgs, UpdateGrubArgs, UserAddArgs, UserModGroupArgs,
};
