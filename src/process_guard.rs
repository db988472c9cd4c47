//! Process lifecycle management for child processes
//!
//! External tools (winget, netsh, reg) run as child processes. A winget
//! install can take minutes, so the program keeps track of every live child
//! and can terminate them if the user aborts.
//!
//! # Ctrl+C behaviour
//! - First press: the running job is cancelled cooperatively. The current
//!   package finishes, the remaining ones are skipped.
//! - Second press: every tracked child is terminated and the program exits
//!   with status 130.

use std::collections::HashSet;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::orchestrator::CancellationToken;

/// Shared handle to a registry.
pub type SharedRegistry = Arc<Mutex<ChildRegistry>>;

/// Registry tracking all spawned child processes
#[derive(Debug, Default)]
pub struct ChildRegistry {
    /// Set of child PIDs currently running
    pids: HashSet<u32>,
    /// Whether cleanup has already been initiated (prevent double-cleanup)
    cleanup_initiated: bool,
}

impl ChildRegistry {
    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Register a new child process
    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        debug!("Registered child process PID {}", pid);
    }

    /// Unregister a child process (called when it exits normally)
    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        debug!("Unregistered child process PID {}", pid);
    }

    /// Get count of tracked children
    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Terminate all tracked child processes (and their trees).
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.cleanup_initiated {
            debug!("Cleanup already initiated, skipping");
            return;
        }
        self.cleanup_initiated = true;

        if self.pids.is_empty() {
            debug!("No child processes to terminate");
            return;
        }

        info!("Terminating {} child process(es)...", self.pids.len());
        let pids: Vec<u32> = self.pids.drain().collect();
        terminate_pids(&pids, grace_period);
        info!("Child process cleanup complete");
    }
}

/// Windows: `taskkill /T /F` takes the whole tree down at once, there is no
/// SIGTERM equivalent for console tools.
#[cfg(windows)]
fn terminate_pids(pids: &[u32], _grace_period: Duration) {
    for &pid in pids {
        let result = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .isolated()
            .output();
        match result {
            Ok(out) if out.status.success() => debug!("Killed process tree {}", pid),
            Ok(out) => warn!(
                "taskkill for PID {} failed: {}",
                pid,
                String::from_utf8_lossy(&out.stderr).trim()
            ),
            Err(e) => warn!("Failed to run taskkill for PID {}: {}", pid, e),
        }
    }
}

/// Unix: SIGTERM to each process group, wait up to `grace_period`, then SIGKILL.
#[cfg(unix)]
fn terminate_pids(pids: &[u32], grace_period: Duration) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;
    use std::time::Instant;

    let group = |pid: u32| Pid::from_raw(-(pid as i32));
    let alive = |pid: u32| signal::kill(Pid::from_raw(pid as i32), None).is_ok();

    for &pid in pids {
        if let Err(e) = signal::kill(group(pid), Signal::SIGTERM) {
            warn!("Failed to send SIGTERM to process group {}: {}", pid, e);
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
    }

    let start = Instant::now();
    while start.elapsed() < grace_period {
        if pids.iter().all(|&pid| !alive(pid)) {
            return;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    for &pid in pids {
        if alive(pid) {
            warn!("Process group {} did not terminate, sending SIGKILL", pid);
            let _ = signal::kill(group(pid), Signal::SIGKILL);
        }
    }
}

/// Unregisters a PID when dropped, on every exit path of the runner.
pub struct Registration {
    registry: SharedRegistry,
    pid: u32,
}

impl Registration {
    pub fn new(registry: &SharedRegistry, pid: u32) -> Self {
        if let Ok(mut guard) = registry.lock() {
            guard.register(pid);
        }
        Self {
            registry: Arc::clone(registry),
            pid,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.registry.lock() {
            guard.unregister(self.pid);
        }
    }
}

/// Install the Ctrl+C handler. Call once at program start.
pub fn init_interrupt_handler(
    cancel: CancellationToken,
    registry: SharedRegistry,
) -> Result<(), ctrlc::Error> {
    let presses = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        if presses.fetch_add(1, Ordering::SeqCst) == 0 {
            info!("Interrupt received, cancelling after the current package");
            eprintln!("\nCancelling after the current package... (Ctrl+C again to abort now)");
            cancel.cancel();
            return;
        }
        info!("Second interrupt received, terminating child processes");
        if let Ok(mut guard) = registry.lock() {
            guard.terminate_all(Duration::from_secs(3));
        }
        std::process::exit(130);
    })
}

/// Extension trait for `std::process::Command`: children get their own
/// process group (Unix) or no console window (Windows).
pub trait CommandIsolation {
    fn isolated(&mut self) -> &mut Self;
}

impl CommandIsolation for Command {
    #[cfg(windows)]
    fn isolated(&mut self) -> &mut Self {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        self.creation_flags(CREATE_NO_WINDOW)
    }

    #[cfg(unix)]
    fn isolated(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // PGID = child PID, so the whole tree can be signalled at once
        self.process_group(0)
    }

    #[cfg(not(any(windows, unix)))]
    fn isolated(&mut self) -> &mut Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_register_unregister() {
        let mut registry = ChildRegistry::default();

        registry.register(1234);
        assert_eq!(registry.count(), 1);

        registry.register(5678);
        assert_eq!(registry.count(), 2);

        registry.unregister(1234);
        assert_eq!(registry.count(), 1);

        registry.unregister(5678);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_registration_guard_unregisters_on_drop() {
        let registry = ChildRegistry::shared();
        {
            let _reg = Registration::new(&registry, 4242);
            assert_eq!(registry.lock().unwrap().count(), 1);
        }
        assert_eq!(registry.lock().unwrap().count(), 0);
    }

    #[test]
    fn test_cleanup_initiated_flag_prevents_double_cleanup() {
        let mut registry = ChildRegistry::default();

        registry.terminate_all(Duration::from_millis(10));
        assert!(registry.cleanup_initiated);

        registry.terminate_all(Duration::from_millis(10));
        assert!(registry.cleanup_initiated);
        assert_eq!(registry.count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_all_kills_real_process() {
        let mut child = Command::new("sleep")
            .arg("60")
            .isolated()
            .spawn()
            .expect("Failed to spawn sleep");

        let mut registry = ChildRegistry::default();
        registry.register(child.id());
        registry.terminate_all(Duration::from_millis(500));

        let status = child.wait().expect("wait");
        assert!(!status.success(), "sleep should have been terminated");
    }
}
