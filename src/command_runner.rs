//! Bounded-time execution of external tools.
//!
//! `CommandRunner` is the seam between the adapters (package manager, network)
//! and the operating system. `SystemRunner` is the real implementation; tests
//! substitute a scripted runner.
//!
//! # Guarantees of `SystemRunner`
//!
//! - stdin is closed, stdout/stderr are captured
//! - the child is tracked in the `ChildRegistry` while it runs
//! - past the timeout the child is killed and `PostInstallError::Timeout` is returned
//! - a missing executable is `PostInstallError::ToolMissing`
//! - in dry-run mode mutating invocations are logged and not executed

use std::io::{ErrorKind, Read};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{PostInstallError, Result};
use crate::process_guard::{ChildRegistry, CommandIsolation, Registration, SharedRegistry};
use crate::tool_args::{Invocation, ToolArgs};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Output from a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (None if terminated by signal, or skipped in dry-run).
    pub exit_code: Option<i32>,
    /// Whether the command exited successfully (exit code 0).
    pub success: bool,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(code),
            success: false,
        }
    }

    /// The most useful diagnostic text: stderr, or stdout when stderr is empty
    /// (winget and netsh report most errors on stdout).
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }

    /// Turn a non-success exit into `PostInstallError::CommandFailed`.
    pub fn ensure_success(self, tool: &str) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(PostInstallError::command_failed(
                tool,
                self.exit_code.unwrap_or(-1),
                self.diagnostic(),
            ))
        }
    }
}

/// Runs one invocation to completion or until the timeout.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation, timeout: Duration) -> Result<CommandOutput>;

    /// Convenience wrapper for typed arguments.
    fn run_args(&self, args: &dyn ToolArgs, timeout: Duration) -> Result<CommandOutput> {
        self.run(&Invocation::from_args(args), timeout)
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, invocation: &Invocation, timeout: Duration) -> Result<CommandOutput> {
        (**self).run(invocation, timeout)
    }
}

/// Spawns real processes.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    registry: SharedRegistry,
    dry_run: bool,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(ChildRegistry::shared(), false)
    }
}

impl SystemRunner {
    pub fn new(registry: SharedRegistry, dry_run: bool) -> Self {
        Self { registry, dry_run }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation, timeout: Duration) -> Result<CommandOutput> {
        let command_line = invocation.display();

        if self.dry_run && invocation.mutating {
            info!("[dry-run] would run: {}", command_line);
            return Ok(CommandOutput::success(String::new()));
        }

        debug!("run: {} (timeout {}s)", command_line, timeout.as_secs());

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .isolated()
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    warn!("{} not found on PATH", invocation.program);
                    PostInstallError::ToolMissing(invocation.program.clone())
                } else {
                    warn!("Failed to spawn {}: {}", command_line, e);
                    PostInstallError::Io(e)
                }
            })?;

        let _registration = Registration::new(&self.registry, child.id());
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let status = match wait_with_deadline(&mut child, timeout)? {
            Some(status) => status,
            None => {
                warn!("{} timed out after {}s, killing it", command_line, timeout.as_secs());
                let _ = child.kill();
                let _ = child.wait();
                return Err(PostInstallError::Timeout {
                    tool: invocation.program.clone(),
                    secs: timeout.as_secs(),
                });
            }
        };

        let output = CommandOutput {
            stdout: join_reader(stdout_reader),
            stderr: join_reader(stderr_reader),
            exit_code: status.code(),
            success: status.success(),
        };

        if output.success {
            debug!("{} succeeded", command_line);
        } else {
            debug!(
                "{} exited with {:?}: {}",
                command_line,
                output.exit_code,
                output.diagnostic()
            );
        }
        Ok(output)
    }
}

/// Poll the child until it exits or the deadline passes (`Ok(None)`).
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Read a pipe to the end on its own thread so a chatty child never blocks
/// on a full pipe buffer.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
