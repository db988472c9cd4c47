//! Install orchestration.
//!
//! `run_job` walks a selection of descriptors in order, asks the package
//! manager about each one and installs what is missing. Everything the
//! presentation layer needs to know is sent as a `JobEvent` over a single
//! channel, so the receiver sees the events in the order they were produced.
//!
//! The job never touches presentation state and never prompts by itself: the
//! reboot confirmation is a `RebootRequested` event carrying a reply channel.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::time::Duration;
use tracing::{info, warn};

use crate::catalog::PackageDescriptor;
use crate::command_runner::CommandRunner;
use crate::error::Result;
use crate::install_state::{JobState, JobStateMachine};
use crate::package_manager::PackageManager;
use crate::tools::system::RebootArgs;

/// Cooperative cancellation flag shared between the job and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-package status shown while the job runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageStatus {
    Checking,
    AlreadyInstalled,
    Installing,
    NotFound,
    Installed,
    Failed(String),
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checking => write!(f, "checking"),
            Self::AlreadyInstalled => write!(f, "already installed"),
            Self::Installing => write!(f, "installing"),
            Self::NotFound => write!(f, "not found"),
            Self::Installed => write!(f, "installed"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Final result for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    AlreadyInstalled,
    NotFound,
    Installed,
    Failed(String),
    /// Not processed because the job was cancelled.
    Skipped,
}

/// Summary of a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub state: JobState,
    pub outcomes: Vec<(PackageDescriptor, ItemOutcome)>,
    pub needs_reboot: bool,
    /// `special` tags of successfully installed descriptors, in install order.
    pub specials: Vec<String>,
    pub progress: u8,
}

impl JobReport {
    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    pub fn installed(&self) -> usize {
        self.count(|o| *o == ItemOutcome::Installed)
    }

    pub fn already_installed(&self) -> usize {
        self.count(|o| *o == ItemOutcome::AlreadyInstalled)
    }

    pub fn not_found(&self) -> usize {
        self.count(|o| *o == ItemOutcome::NotFound)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| *o == ItemOutcome::Skipped)
    }

    pub fn has_special(&self, tag: &str) -> bool {
        self.specials.iter().any(|s| s == tag)
    }
}

/// Everything a job reports while it runs.
#[derive(Debug)]
pub enum JobEvent {
    Started {
        total: usize,
    },
    Status {
        /// 1-based position in the selection
        index: usize,
        total: usize,
        name: String,
        id: String,
        status: PackageStatus,
    },
    Progress(u8),
    /// The job waits for a `bool` on `reply`; a dropped sender means "no".
    RebootRequested {
        packages: Vec<String>,
        reply: Sender<bool>,
    },
    RebootScheduled {
        delay_secs: u32,
    },
    RebootFailed(String),
    Finished(JobReport),
}

/// Host operations the job needs besides package management.
pub trait SystemControl: Send + Sync {
    fn schedule_reboot(&self, delay_secs: u32) -> Result<()>;
}

/// Reboots through `shutdown /r /t <delay>`.
pub struct ShutdownControl<R: CommandRunner> {
    runner: R,
    timeout: Duration,
}

impl<R: CommandRunner> ShutdownControl<R> {
    pub fn new(runner: R, timeout: Duration) -> Self {
        Self { runner, timeout }
    }
}

impl<R: CommandRunner> SystemControl for ShutdownControl<R> {
    fn schedule_reboot(&self, delay_secs: u32) -> Result<()> {
        info!("Scheduling reboot in {}s", delay_secs);
        self.runner
            .run_args(&RebootArgs { delay_secs }, self.timeout)?
            .ensure_success("shutdown")?;
        Ok(())
    }
}

/// Knobs for a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    /// Extra attempts after a failed install.
    pub install_retries: u32,
    pub reboot_delay_secs: u32,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            install_retries: 0,
            reboot_delay_secs: 15,
        }
    }
}

/// Run one install job over `selection` (in order) and return its report.
///
/// The report is also sent as the last event, `JobEvent::Finished`. A closed
/// event channel does not stop the job.
pub fn run_job(
    selection: &[PackageDescriptor],
    pm: &dyn PackageManager,
    system: &dyn SystemControl,
    options: &JobOptions,
    cancel: &CancellationToken,
    events: &Sender<JobEvent>,
) -> Result<JobReport> {
    let emit = |event: JobEvent| {
        let _ = events.send(event);
    };

    let total = selection.len();
    let mut machine = JobStateMachine::new();
    machine.start()?;
    info!("Install job started with {} package(s)", total);

    emit(JobEvent::Started { total });
    emit(JobEvent::Progress(0));

    let mut outcomes = Vec::with_capacity(total);
    let mut specials = Vec::new();
    let mut reboot_packages = Vec::new();
    let mut progress = 0u8;

    for (i, pkg) in selection.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(
                "Job cancelled, skipping {} remaining package(s)",
                total - i
            );
            outcomes.extend(
                selection[i..]
                    .iter()
                    .map(|p| (p.clone(), ItemOutcome::Skipped)),
            );
            break;
        }

        let index = i + 1;
        let status = |status: PackageStatus| JobEvent::Status {
            index,
            total,
            name: pkg.name.clone(),
            id: pkg.id.clone(),
            status,
        };

        emit(status(PackageStatus::Checking));
        let outcome = if pm.is_installed(&pkg.id) {
            info!("{} ({}) is already installed", pkg.name, pkg.id);
            emit(status(PackageStatus::AlreadyInstalled));
            ItemOutcome::AlreadyInstalled
        } else {
            emit(status(PackageStatus::Installing));
            if !pm.exists(&pkg.id) {
                warn!("{} ({}) not found in the package source", pkg.name, pkg.id);
                emit(status(PackageStatus::NotFound));
                ItemOutcome::NotFound
            } else {
                match install_with_retries(pm, &pkg.id, options.install_retries) {
                    Ok(()) => {
                        if let Some(tag) = &pkg.special {
                            specials.push(tag.clone());
                        }
                        if pkg.requires_reboot() {
                            reboot_packages.push(pkg.name.clone());
                        }
                        emit(status(PackageStatus::Installed));
                        ItemOutcome::Installed
                    }
                    Err(reason) => {
                        emit(status(PackageStatus::Failed(reason.clone())));
                        ItemOutcome::Failed(reason)
                    }
                }
            }
        };
        outcomes.push((pkg.clone(), outcome));

        progress = (index * 100 / total) as u8;
        emit(JobEvent::Progress(progress));
    }

    let needs_reboot = !reboot_packages.is_empty();
    if cancel.is_cancelled() && outcomes.iter().any(|(_, o)| *o == ItemOutcome::Skipped) {
        machine.cancel()?;
    } else {
        machine.finish(needs_reboot)?;
    }

    if machine.current() == JobState::CompletedWithRebootPending {
        request_reboot(reboot_packages, system, options.reboot_delay_secs, &emit);
    }

    let report = JobReport {
        state: machine.current(),
        outcomes,
        needs_reboot,
        specials,
        progress,
    };
    info!(
        "Install job finished: {} ({} installed, {} already installed, {} not found, {} failed, {} skipped)",
        report.state,
        report.installed(),
        report.already_installed(),
        report.not_found(),
        report.failed(),
        report.skipped()
    );
    emit(JobEvent::Finished(report.clone()));
    Ok(report)
}

fn install_with_retries(
    pm: &dyn PackageManager,
    id: &str,
    retries: u32,
) -> std::result::Result<(), String> {
    let mut attempt = 0;
    loop {
        match pm.install(id) {
            Ok(()) => return Ok(()),
            Err(failure) if attempt < retries => {
                attempt += 1;
                warn!(
                    "Install of {} failed ({}), retry {}/{}",
                    id, failure, attempt, retries
                );
            }
            Err(failure) => return Err(failure.to_string()),
        }
    }
}

fn request_reboot(
    packages: Vec<String>,
    system: &dyn SystemControl,
    delay_secs: u32,
    emit: &dyn Fn(JobEvent),
) {
    let (reply, answer) = mpsc::channel();
    emit(JobEvent::RebootRequested { packages, reply });

    // a dropped sender (no presenter, or it gave up) counts as "no"
    let confirmed = answer.recv().unwrap_or(false);
    if !confirmed {
        info!("Reboot declined");
        return;
    }

    match system.schedule_reboot(delay_secs) {
        Ok(()) => emit(JobEvent::RebootScheduled { delay_secs }),
        Err(e) => {
            warn!("Failed to schedule reboot: {}", e);
            emit(JobEvent::RebootFailed(e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(PackageStatus::AlreadyInstalled.to_string(), "already installed");
        assert_eq!(
            PackageStatus::Failed("timed out after 300s".into()).to_string(),
            "failed: timed out after 300s"
        );
    }

    #[test]
    fn test_report_counters() {
        let pkg = |id: &str| PackageDescriptor::new(id, id, "G");
        let report = JobReport {
            state: JobState::Completed,
            outcomes: vec![
                (pkg("A.a"), ItemOutcome::Installed),
                (pkg("B.b"), ItemOutcome::Installed),
                (pkg("C.c"), ItemOutcome::Failed("x".into())),
                (pkg("D.d"), ItemOutcome::NotFound),
                (pkg("E.e"), ItemOutcome::AlreadyInstalled),
            ],
            needs_reboot: false,
            specials: vec!["valorant".into()],
            progress: 100,
        };
        assert_eq!(report.installed(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.not_found(), 1);
        assert_eq!(report.already_installed(), 1);
        assert_eq!(report.skipped(), 0);
        assert!(report.has_special("valorant"));
    }
}
