//! Pre-flight sanity checks for the runtime environment
//!
//! This module verifies the host before packages or DNS settings are touched:
//! - `winget` is present and answers `--version`
//! - the process is elevated (needed for DNS changes and most installers)
//! - the Windows build, and with it native DoH support
//!
//! `doctor` prints the full report. Install commands call
//! `require_package_manager` and stop early with a clear message if `winget`
//! is missing.

use std::time::Duration;
use tracing::{debug, info};

use crate::command_runner::CommandRunner;
use crate::package_manager::PackageManager;
use crate::platform::{self, OsInfo};

/// Result of environment verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanityCheckResult {
    pub winget_available: bool,
    pub is_elevated: bool,
    pub os: OsInfo,
}

impl SanityCheckResult {
    /// Returns true if packages can be installed at all
    pub fn is_ok(&self) -> bool {
        self.winget_available
    }

    pub fn doh_supported(&self) -> bool {
        self.os.supports_doh()
    }
}

/// Perform all sanity checks and return the result
pub fn verify_environment(
    pm: &dyn PackageManager,
    runner: &dyn CommandRunner,
    timeout: Duration,
) -> SanityCheckResult {
    debug!("Running pre-flight sanity checks...");
    let result = SanityCheckResult {
        winget_available: pm.is_available(),
        is_elevated: platform::is_elevated(runner, timeout),
        os: OsInfo::detect(runner, timeout),
    };
    info!(
        "Pre-flight: winget={}, elevated={}, os={}",
        result.winget_available, result.is_elevated, result.os
    );
    result
}

fn mark(ok: bool) -> &'static str {
    if ok { "✓" } else { "✗" }
}

/// Print the report for `doctor`
pub fn print_report(result: &SanityCheckResult) {
    println!("Pre-flight check");
    println!();
    println!("  {} winget available", mark(result.winget_available));
    println!("  {} running as administrator", mark(result.is_elevated));
    println!("  {} {}", mark(result.os.build.is_some()), result.os);
    println!(
        "  {} DNS over HTTPS {}",
        mark(result.doh_supported()),
        if result.doh_supported() {
            "supported"
        } else {
            "not supported (Windows 11 required)"
        }
    );
    println!();

    if !result.winget_available {
        println!("  winget is part of \"App Installer\" from the Microsoft Store.");
    }
    if !result.is_elevated {
        println!("  DNS commands need an elevated prompt (Run as administrator).");
    }
}

/// Print a pretty error message to stderr and exit
pub fn print_error_and_exit(result: &SanityCheckResult) -> ! {
    eprintln!();
    eprintln!("╔══════════════════════════════════════════════════════════════════╗");
    eprintln!("║              postinstall - Pre-flight Check Failed               ║");
    eprintln!("╚══════════════════════════════════════════════════════════════════╝");
    eprintln!();

    if !result.winget_available {
        eprintln!("❌ ERROR: winget not found");
        eprintln!("   Packages are installed through the Windows Package Manager.");
        eprintln!();
        eprintln!("   Solution: install or update \"App Installer\" from the Microsoft Store,");
        eprintln!("   then open a new terminal.");
        eprintln!();
    }

    std::process::exit(1);
}

/// Verify the package manager and exit if it is unusable
pub fn require_package_manager(pm: &dyn PackageManager) {
    if !pm.is_available() {
        print_error_and_exit(&SanityCheckResult {
            winget_available: false,
            is_elevated: false,
            os: OsInfo::unknown(),
        });
    }
    debug!("Package manager check passed");
}
