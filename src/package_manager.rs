//! Package manager adapter.
//!
//! `PackageManager` is the contract the orchestrator depends on; `Winget` is
//! the production implementation on top of a `CommandRunner`.
//!
//! # Fail closed
//!
//! No method panics or propagates an error to the caller unexpectedly. A
//! missing tool, a timeout or a non-zero exit all mean "no" (`false`) or
//! `Err(InstallFailure)`, and each is logged with the package id.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, PackageDescriptor};
use crate::command_runner::CommandRunner;
use crate::config::AppConfig;
use crate::error::PostInstallError;
use crate::tools::winget::WingetArgs;

/// Why an install did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallFailure {
    /// The installer exited with a non-zero status.
    ExitCode { code: i32, message: String },
    /// The installer exceeded its time budget and was killed.
    TimedOut { secs: u64 },
    /// The package manager executable is not on this system.
    ToolMissing,
    /// Anything else (spawn error, IO error).
    Other(String),
}

impl fmt::Display for InstallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitCode { code, message } if message.is_empty() => {
                write!(f, "installer exited with code {}", code)
            }
            Self::ExitCode { code, message } => {
                write!(f, "installer exited with code {}: {}", code, message)
            }
            Self::TimedOut { secs } => write!(f, "timed out after {}s", secs),
            Self::ToolMissing => write!(f, "package manager not found"),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<PostInstallError> for InstallFailure {
    fn from(err: PostInstallError) -> Self {
        match err {
            PostInstallError::Timeout { secs, .. } => Self::TimedOut { secs },
            PostInstallError::ToolMissing(_) => Self::ToolMissing,
            PostInstallError::CommandFailed { code, message, .. } => {
                Self::ExitCode { code, message }
            }
            other => Self::Other(other.to_string()),
        }
    }
}

/// Operations the install orchestrator needs from a package manager.
pub trait PackageManager: Send + Sync {
    /// Whether the package manager itself is usable.
    fn is_available(&self) -> bool;

    /// Whether the package source knows `id`.
    fn exists(&self, id: &str) -> bool;

    /// Whether `id` is currently installed.
    fn is_installed(&self, id: &str) -> bool;

    /// Install `id` silently, accepting all agreements.
    fn install(&self, id: &str) -> Result<(), InstallFailure>;

    /// Uninstall `id` silently.
    fn uninstall(&self, id: &str) -> bool;
}

impl<T: PackageManager + ?Sized> PackageManager for Arc<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn exists(&self, id: &str) -> bool {
        (**self).exists(id)
    }

    fn is_installed(&self, id: &str) -> bool {
        (**self).is_installed(id)
    }

    fn install(&self, id: &str) -> Result<(), InstallFailure> {
        (**self).install(id)
    }

    fn uninstall(&self, id: &str) -> bool {
        (**self).uninstall(id)
    }
}

/// Time budgets for each kind of winget call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WingetTimeouts {
    pub query: Duration,
    pub install: Duration,
    pub uninstall: Duration,
}

impl Default for WingetTimeouts {
    fn default() -> Self {
        Self {
            query: Duration::from_secs(30),
            install: Duration::from_secs(300),
            uninstall: Duration::from_secs(60),
        }
    }
}

impl From<&AppConfig> for WingetTimeouts {
    fn from(config: &AppConfig) -> Self {
        Self {
            query: config.query_timeout(),
            install: config.install_timeout(),
            uninstall: config.uninstall_timeout(),
        }
    }
}

/// `winget`-backed package manager.
pub struct Winget<R: CommandRunner> {
    runner: R,
    timeouts: WingetTimeouts,
}

impl<R: CommandRunner> Winget<R> {
    pub fn new(runner: R, timeouts: WingetTimeouts) -> Self {
        Self { runner, timeouts }
    }

    /// Run a query and reduce it to its exit status; every error is `false`.
    fn query(&self, args: WingetArgs, what: &str, id: &str) -> bool {
        match self.runner.run_args(&args, self.timeouts.query) {
            Ok(out) => {
                debug!("winget {} {} -> {}", what, id, out.success);
                out.success
            }
            Err(e) => {
                warn!("winget {} {} failed: {}", what, id, e);
                false
            }
        }
    }
}

impl<R: CommandRunner> PackageManager for Winget<R> {
    fn is_available(&self) -> bool {
        match self.runner.run_args(&WingetArgs::Version, self.timeouts.query) {
            Ok(out) if out.success => {
                info!("winget available: {}", out.stdout.trim());
                true
            }
            Ok(out) => {
                warn!("winget --version failed: {}", out.diagnostic());
                false
            }
            Err(e) => {
                warn!("winget not usable: {}", e);
                false
            }
        }
    }

    fn exists(&self, id: &str) -> bool {
        self.query(WingetArgs::Show { id: id.to_string() }, "show", id)
    }

    fn is_installed(&self, id: &str) -> bool {
        self.query(WingetArgs::List { id: id.to_string() }, "list", id)
    }

    fn install(&self, id: &str) -> Result<(), InstallFailure> {
        info!("Installing {}", id);
        let args = WingetArgs::Install { id: id.to_string() };
        let result = self
            .runner
            .run_args(&args, self.timeouts.install)
            .and_then(|out| out.ensure_success("winget"));

        match result {
            Ok(_) => {
                info!("Installed {}", id);
                Ok(())
            }
            Err(e) => {
                error!("Install of {} failed: {}", id, e);
                Err(e.into())
            }
        }
    }

    fn uninstall(&self, id: &str) -> bool {
        info!("Uninstalling {}", id);
        let args = WingetArgs::Uninstall { id: id.to_string() };
        match self
            .runner
            .run_args(&args, self.timeouts.uninstall)
            .and_then(|out| out.ensure_success("winget"))
        {
            Ok(_) => {
                info!("Uninstalled {}", id);
                true
            }
            Err(e) => {
                error!("Uninstall of {} failed: {}", id, e);
                false
            }
        }
    }
}

/// Catalog entries the package manager reports as installed, in catalog order.
pub fn installed_packages(pm: &dyn PackageManager, catalog: &Catalog) -> Vec<PackageDescriptor> {
    catalog
        .iter()
        .filter(|pkg| pm.is_installed(&pkg.id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_runner::CommandOutput;
    use crate::error::Result;
    use crate::tool_args::Invocation;
    use std::sync::Mutex;

    /// Replies to each call with the next scripted result.
    struct Scripted {
        replies: Mutex<Vec<Result<CommandOutput>>>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<Result<CommandOutput>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for Scripted {
        fn run(&self, invocation: &Invocation, _timeout: Duration) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(CommandOutput::success("")))
        }
    }

    #[test]
    fn test_queries_map_exit_status() {
        let winget = Winget::new(
            Scripted::new(vec![
                Ok(CommandOutput::success("Found Steam")),
                Ok(CommandOutput::failure(1, "No installed package found")),
            ]),
            WingetTimeouts::default(),
        );
        assert!(winget.exists("Valve.Steam"));
        assert!(!winget.is_installed("Valve.Steam"));

        let calls = winget.runner.calls.lock().unwrap();
        assert_eq!(calls[0].args[0], "show");
        assert_eq!(calls[1].args[0], "list");
    }

    #[test]
    fn test_queries_fail_closed() {
        let winget = Winget::new(
            Scripted::new(vec![
                Err(PostInstallError::ToolMissing("winget".to_string())),
                Err(PostInstallError::Timeout {
                    tool: "winget".to_string(),
                    secs: 30,
                }),
            ]),
            WingetTimeouts::default(),
        );
        assert!(!winget.exists("Valve.Steam"));
        assert!(!winget.is_installed("Valve.Steam"));
    }

    #[test]
    fn test_install_failure_reasons() {
        let winget = Winget::new(
            Scripted::new(vec![
                Ok(CommandOutput::failure(-1978335212, "No package found")),
                Err(PostInstallError::Timeout {
                    tool: "winget".to_string(),
                    secs: 300,
                }),
                Ok(CommandOutput::success("Successfully installed")),
            ]),
            WingetTimeouts::default(),
        );

        let err = winget.install("Nope.Nope").unwrap_err();
        assert_eq!(
            err,
            InstallFailure::ExitCode {
                code: -1978335212,
                message: "No package found".to_string()
            }
        );
        assert_eq!(
            winget.install("Slow.Pkg").unwrap_err(),
            InstallFailure::TimedOut { secs: 300 }
        );
        assert!(winget.install("Valve.Steam").is_ok());
    }

    #[test]
    fn test_uninstall() {
        let winget = Winget::new(
            Scripted::new(vec![
                Ok(CommandOutput::success("")),
                Ok(CommandOutput::failure(1, "")),
            ]),
            WingetTimeouts::default(),
        );
        assert!(winget.uninstall("VideoLAN.VLC"));
        assert!(!winget.uninstall("VideoLAN.VLC"));
    }

    #[test]
    fn test_installed_packages_keeps_catalog_order() {
        let catalog = Catalog::builtin();
        // list replies: everything "not installed" except entries 2 and 5
        let replies = (0..catalog.len())
            .map(|i| {
                if i == 2 || i == 5 {
                    Ok(CommandOutput::success(""))
                } else {
                    Ok(CommandOutput::failure(1, ""))
                }
            })
            .collect();
        let winget = Winget::new(Scripted::new(replies), WingetTimeouts::default());

        let installed = installed_packages(&winget, &catalog);
        let ids: Vec<&str> = installed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["Ubisoft.Connect", "Git.Git"]);
    }

    #[test]
    fn test_install_failure_display() {
        assert_eq!(
            InstallFailure::TimedOut { secs: 300 }.to_string(),
            "timed out after 300s"
        );
        assert_eq!(
            InstallFailure::ExitCode {
                code: 1,
                message: String::new()
            }
            .to_string(),
            "installer exited with code 1"
        );
    }
}
