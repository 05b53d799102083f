//! Process execution
//!
//! Every external command the engine issues goes through a [`ProcessRunner`].
//! Commands are argument vectors, never shell strings, so device paths and
//! user names need no quoting. Chroot-scoped commands are expressed by
//! [`CommandSpec::in_chroot`] and run as `chroot <root> <program> <args..>`.
//!
//! [`SystemRunner`] is the only implementation that touches the host. It
//! spawns each child in its own process group and registers it with the
//! global child registry for the duration of the call.

use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::{InstallerError, Result};
use crate::process_guard::{CommandProcessGroup, TrackedChild};

/// A fully specified external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Data written to the child's stdin; never logged
    pub stdin: Option<String>,
    /// Root directory to chroot into before running `program`
    pub chroot: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            chroot: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn in_chroot(mut self, root: impl Into<PathBuf>) -> Self {
        self.chroot = Some(root.into());
        self
    }

    /// The argv actually executed, including the chroot wrapper
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 3);
        if let Some(root) = &self.chroot {
            argv.push("chroot".to_string());
            argv.push(root.display().to_string());
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))?;
        if self.stdin.is_some() {
            write!(f, " <stdin redacted>")?;
        }
        Ok(())
    }
}

/// Output from a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal or never started)
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    /// A successful run with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: Some(0),
            success: true,
            ..Default::default()
        }
    }

    /// A run that exited with `code`
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            success: code == 0,
            ..Default::default()
        }
    }

    /// Stand-in for a command that could not be started at all
    pub fn not_started(reason: impl Into<String>) -> Self {
        Self {
            stderr: reason.into(),
            ..Default::default()
        }
    }
}

/// Executes external commands on behalf of the engine
pub trait ProcessRunner: Send {
    /// Run to completion and capture stdout and stderr
    fn run(&self, command: &CommandSpec) -> Result<CommandOutput>;

    /// Run to completion, handing each stdout line to `on_line` as it arrives.
    /// The returned output carries stderr only.
    fn run_streaming(
        &self,
        command: &CommandSpec,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput>;
}

/// Runs commands on the host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    fn build(command: &CommandSpec) -> Command {
        let argv = command.argv();
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();
        cmd
    }

    fn feed_stdin(child: &mut std::process::Child, command: &CommandSpec) -> Result<()> {
        if let (Some(input), Some(mut stdin)) = (&command.stdin, child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .map_err(|e| InstallerError::command(format!("{}: {}", command.program, e)))?;
        }
        Ok(())
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        tracing::info!("Running: {}", command);

        let mut child = Self::build(command)
            .spawn()
            .map_err(|e| InstallerError::command(format!("failed to spawn {}: {}", command, e)))?;
        let _tracked = TrackedChild::track(child.id());

        Self::feed_stdin(&mut child, command)?;
        let output = child
            .wait_with_output()
            .map_err(|e| InstallerError::command(format!("failed waiting for {}: {}", command, e)))?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            success: output.status.success(),
        };
        tracing::debug!("{} exited with {:?}", command.program, result.exit_code);
        Ok(result)
    }

    fn run_streaming(
        &self,
        command: &CommandSpec,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput> {
        tracing::info!("Running: {}", command);

        let mut child = Self::build(command)
            .spawn()
            .map_err(|e| InstallerError::command(format!("failed to spawn {}: {}", command, e)))?;
        let _tracked = TrackedChild::track(child.id());

        Self::feed_stdin(&mut child, command)?;

        // Drain stderr concurrently so a chatty child cannot block on a full pipe
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            })
        });

        // File names are arbitrary bytes: decode lossily and keep reading to EOF,
        // since closing the pipe early would kill the child with SIGPIPE
        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        on_line(line.trim_end_matches(['\n', '\r']));
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!("Unreadable output from {}: {}", command.program, e);
                        let _ = std::io::copy(&mut reader, &mut std::io::sink());
                        break;
                    }
                }
            }
        }

        let status = child
            .wait()
            .map_err(|e| InstallerError::command(format!("failed waiting for {}: {}", command, e)))?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        tracing::debug!("{} exited with {:?}", command.program, status.code());
        Ok(CommandOutput {
            stdout: String::new(),
            stderr,
            exit_code: status.code(),
            success: status.success(),
        })
    }
}
