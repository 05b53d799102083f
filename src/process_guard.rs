//! Lifecycle management for external commands
//!
//! A killed installer must not leave `mkfs`, `badblocks` or `rsync` running
//! against the target disk. Every command is therefore spawned as the leader
//! of its own process group with a parent-death signal, and its PID is kept
//! in a global registry while it runs. Signal handlers and
//! [`ShutdownGuard`] terminate whatever is still registered.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Registry of running child process groups
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    /// Set once termination started, so concurrent exit paths do not race
    terminating: bool,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        tracing::debug!("Registered child process group {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::debug!("Unregistered child process group {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Terminate all tracked process groups.
    ///
    /// Sends SIGTERM, waits up to `grace_period`, then SIGKILLs survivors.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.terminating {
            return;
        }
        self.terminating = true;

        if self.pids.is_empty() {
            return;
        }

        let pids: Vec<u32> = self.pids.iter().copied().collect();
        tracing::warn!("Terminating {} running command(s)", pids.len());

        for &pid in &pids {
            if let Err(e) = signal_group(pid, Signal::SIGTERM) {
                tracing::warn!("SIGTERM to process group {} failed: {}", pid, e);
                let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        let start = Instant::now();
        while start.elapsed() < grace_period {
            if pids.iter().all(|&pid| !is_process_alive(pid)) {
                self.pids.clear();
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in &pids {
            if is_process_alive(pid) {
                tracing::warn!("Process group {} ignored SIGTERM, sending SIGKILL", pid);
                if signal_group(pid, Signal::SIGKILL).is_err() {
                    let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
                }
            }
        }
        self.pids.clear();
    }
}

/// Registers a PID on creation and unregisters it when dropped
pub struct TrackedChild {
    pid: u32,
}

impl TrackedChild {
    pub fn track(pid: u32) -> Self {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }
        Self { pid }
    }
}

impl Drop for TrackedChild {
    fn drop(&mut self) {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(self.pid);
        }
    }
}

/// Negative PID addresses the whole group, so children of a hook script die too
fn signal_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// Alive means present and neither zombie nor dead
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/<pid>/stat is the state letter
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        if let Some(state) = stat.split_whitespace().nth(2) {
            return !matches!(state, "Z" | "X");
        }
    }

    true
}

/// Terminates every registered command when dropped; held by `main`
pub struct ShutdownGuard {
    grace_period: Duration,
}

impl ShutdownGuard {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.terminate_all(self.grace_period);
        }
    }
}

/// Install SIGINT, SIGTERM and SIGHUP handlers that kill running commands and exit
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            tracing::warn!("Received signal {}, stopping running commands", sig);
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(Duration::from_secs(3));
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for `std::process::Command` to isolate children
pub trait CommandProcessGroup {
    /// Run the command as leader of a new process group that dies with us
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: the closure only calls async-signal-safe setpgid and prctl
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;

                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn wait_for_exit(child: &mut std::process::Child, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Ok(Some(_)) = child.try_wait() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_registry_register_unregister() {
        let mut registry = ChildRegistry::default();
        registry.register(1234);
        registry.register(5678);
        assert_eq!(registry.count(), 2);

        registry.unregister(1234);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_terminate_all_kills_process_group() {
        let mut child = Command::new("sleep")
            .arg("60")
            .in_new_process_group()
            .spawn()
            .expect("spawn sleep");

        let mut registry = ChildRegistry::default();
        registry.register(child.id());
        registry.terminate_all(Duration::from_millis(500));

        assert!(wait_for_exit(&mut child, Duration::from_secs(2)));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_terminate_all_runs_once() {
        let mut registry = ChildRegistry::default();
        registry.register(999_999);
        registry.terminate_all(Duration::from_millis(10));
        assert!(registry.terminating);

        registry.register(999_998);
        registry.terminate_all(Duration::from_millis(10));
        assert_eq!(registry.count(), 1, "second call must be a no-op");
    }

    #[test]
    fn test_nonexistent_pid_is_not_alive() {
        assert!(!is_process_alive(999_999));
    }
}
