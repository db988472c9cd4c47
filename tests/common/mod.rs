//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use postinstall::command_runner::{CommandOutput, CommandRunner};
use postinstall::error::{PostInstallError, Result};
use postinstall::orchestrator::SystemControl;
use postinstall::package_manager::{InstallFailure, PackageManager};
use postinstall::tool_args::Invocation;

/// In-memory package manager that records every call.
#[derive(Default)]
pub struct FakePackageManager {
    installed: Mutex<HashSet<String>>,
    unknown: HashSet<String>,
    /// id -> number of install attempts that fail before one succeeds
    /// (`u32::MAX` fails forever)
    failures: Mutex<HashMap<String, u32>>,
    install_delay: Duration,
    calls: Mutex<Vec<String>>,
    on_install: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

impl FakePackageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_installed(self, id: &str) -> Self {
        self.installed.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn with_unknown(mut self, id: &str) -> Self {
        self.unknown.insert(id.to_string());
        self
    }

    pub fn failing(self, id: &str, times: u32) -> Self {
        self.failures.lock().unwrap().insert(id.to_string(), times);
        self
    }

    pub fn with_install_delay(mut self, delay: Duration) -> Self {
        self.install_delay = delay;
        self
    }

    /// Run `hook` after each install attempt.
    pub fn on_install(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_install = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn install_calls(&self, id: &str) -> usize {
        let wanted = format!("install {}", id);
        self.calls().iter().filter(|c| **c == wanted).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl PackageManager for FakePackageManager {
    fn is_available(&self) -> bool {
        true
    }

    fn exists(&self, id: &str) -> bool {
        self.record(format!("exists {}", id));
        !self.unknown.contains(id)
    }

    fn is_installed(&self, id: &str) -> bool {
        self.record(format!("is_installed {}", id));
        self.installed.lock().unwrap().contains(id)
    }

    fn install(&self, id: &str) -> std::result::Result<(), InstallFailure> {
        self.record(format!("install {}", id));
        if !self.install_delay.is_zero() {
            std::thread::sleep(self.install_delay);
        }
        let result = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(id) {
                Some(left) if *left > 0 => {
                    if *left != u32::MAX {
                        *left -= 1;
                    }
                    Err(InstallFailure::ExitCode {
                        code: 1,
                        message: "installer error".to_string(),
                    })
                }
                _ => {
                    self.installed.lock().unwrap().insert(id.to_string());
                    Ok(())
                }
            }
        };
        if let Some(hook) = &self.on_install {
            hook(id);
        }
        result
    }

    fn uninstall(&self, id: &str) -> bool {
        self.record(format!("uninstall {}", id));
        self.installed.lock().unwrap().remove(id)
    }
}

/// Records reboot requests instead of restarting anything.
#[derive(Default)]
pub struct RecordingSystem {
    pub reboots: Mutex<Vec<u32>>,
    pub fail: bool,
}

impl SystemControl for RecordingSystem {
    fn schedule_reboot(&self, delay_secs: u32) -> Result<()> {
        self.reboots.lock().unwrap().push(delay_secs);
        if self.fail {
            Err(PostInstallError::command_failed(
                "shutdown",
                1190,
                "A system shutdown has already been scheduled.",
            ))
        } else {
            Ok(())
        }
    }
}

/// Command runner that answers by program name and records every invocation.
#[derive(Default)]
pub struct ScriptedRunner {
    replies: Mutex<HashMap<String, Vec<CommandOutput>>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `output` as the next reply for invocations whose command line
    /// starts with `prefix` (e.g. `"netsh interface show"`).
    pub fn reply(self, prefix: &str, output: CommandOutput) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(prefix.to_string())
            .or_default()
            .push(output);
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.display()).collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation, _timeout: Duration) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        let line = invocation.display();
        let mut replies = self.replies.lock().unwrap();
        let key = replies
            .keys()
            .filter(|prefix| line.starts_with(prefix.as_str()))
            .max_by_key(|prefix| prefix.len())
            .cloned();
        match key.and_then(|k| {
            let queue = replies.get_mut(&k)?;
            if queue.len() > 1 {
                Some(queue.remove(0))
            } else {
                queue.first().cloned()
            }
        }) {
            Some(output) => Ok(output),
            None => Ok(CommandOutput::success("")),
        }
    }
}
