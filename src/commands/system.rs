//! System tools: rsync, df, account management, grub and the install hooks.

use std::path::PathBuf;

use super::ToolArgs;

/// Directories excluded from the copy, anchored at the source root
pub const COPY_EXCLUDES: &[&str] = &[
    "/data/*",
    "/dev/*",
    "/proc/*",
    "/sys/*",
    "/tmp/*",
    "/run/*",
    "/lost+found",
    "/source",
    "/target",
];

/// Arguments for the archive copy of the live filesystem.
///
/// The trailing slash on the source makes rsync copy the directory contents,
/// which is also what anchors the `/`-prefixed exclude patterns at the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsyncArgs {
    pub source: PathBuf,
    pub target: PathBuf,
    pub excludes: Vec<String>,
}

impl RsyncArgs {
    pub fn live_copy(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            excludes: COPY_EXCLUDES.iter().map(|e| e.to_string()).collect(),
        }
    }
}

fn with_trailing_slash(path: &std::path::Path) -> String {
    let mut s = path.display().to_string();
    if !s.ends_with('/') {
        s.push('/');
    }
    s
}

impl ToolArgs for RsyncArgs {
    fn program(&self) -> String {
        "rsync".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--verbose",
            "--archive",
            "--no-D",
            "--acls",
            "--hard-links",
            "--xattrs",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend(self.excludes.iter().map(|e| format!("--exclude={}", e)));
        args.push(with_trailing_slash(&self.source));
        args.push(with_trailing_slash(&self.target));
        args
    }
}

/// `df --inodes <path>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfInodesArgs {
    pub path: PathBuf,
}

impl ToolArgs for DfInodesArgs {
    fn program(&self) -> String {
        "df".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["--inodes".to_string(), self.path.display().to_string()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAddArgs {
    pub username: String,
}

impl ToolArgs for UserAddArgs {
    fn program(&self) -> String {
        "useradd".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![self.username.clone()]
    }
}

/// `passwd [<user>]` with the new password typed twice on stdin.
///
/// `username: None` targets the invoking account, which is root in the chroot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdArgs {
    pub username: Option<String>,
    pub password: String,
}

impl ToolArgs for PasswdArgs {
    fn program(&self) -> String {
        "passwd".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        self.username.iter().cloned().collect()
    }

    fn stdin(&self) -> Option<String> {
        Some(format!("{0}\n{0}\n", self.password))
    }
}

/// `usermod -a -G <group> <user>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserModGroupArgs {
    pub username: String,
    pub group: String,
}

impl ToolArgs for UserModGroupArgs {
    fn program(&self) -> String {
        "usermod".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-a".to_string(),
            "-G".to_string(),
            self.group.clone(),
            self.username.clone(),
        ]
    }
}

/// `mkdir -p <path>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MkdirArgs {
    pub path: String,
}

impl ToolArgs for MkdirArgs {
    fn program(&self) -> String {
        "mkdir".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-p".to_string(), self.path.clone()]
    }
}

/// `chmod -R <mode> <path>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChmodArgs {
    pub mode: String,
    pub path: String,
}

impl ToolArgs for ChmodArgs {
    fn program(&self) -> String {
        "chmod".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-R".to_string(), self.mode.clone(), self.path.clone()]
    }
}

/// `chown -R <owner> <path>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChownArgs {
    pub owner: String,
    pub path: String,
}

impl ToolArgs for ChownArgs {
    fn program(&self) -> String {
        "chown".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-R".to_string(), self.owner.clone(), self.path.clone()]
    }
}

/// `grub-install --force <device>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrubInstallArgs {
    pub device: String,
}

impl ToolArgs for GrubInstallArgs {
    fn program(&self) -> String {
        "grub-install".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["--force".to_string(), self.device.clone()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateGrubArgs;

impl ToolArgs for UpdateGrubArgs {
    fn program(&self) -> String {
        "update-grub".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        Vec::new()
    }
}

/// `grub-mkconfig -o <output>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrubMkconfigArgs {
    pub output: String,
}

impl ToolArgs for GrubMkconfigArgs {
    fn program(&self) -> String {
        "grub-mkconfig".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-o".to_string(), self.output.clone()]
    }
}

/// An install hook script, run with no arguments.
///
/// With an interpreter the script is passed to it (`bash <script>`); without
/// one the script itself is executed, which needs its executable bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookArgs {
    pub script: PathBuf,
    pub interpreter: Option<&'static str>,
}

impl ToolArgs for HookArgs {
    fn program(&self) -> String {
        match self.interpreter {
            Some(interpreter) => interpreter.to_string(),
            None => self.script.display().to_string(),
        }
    }

    fn to_cli_args(&self) -> Vec<String> {
        match self.interpreter {
            Some(_) => vec![self.script.display().to_string()],
            None => Vec::new(),
        }
    }
}
