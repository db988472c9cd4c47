//! Host environment detection: Windows build and process elevation.
//!
//! # Design
//!
//! - **Safe defaults**: an unreadable version means "DoH unsupported", a failed
//!   elevation check means "not elevated"
//! - **Detected once**: the CLI detects at startup and passes the results to
//!   the adapters, which never check on their own

use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::command_runner::CommandRunner;
use crate::tools::system::VerArgs;

/// First Windows build with native DNS-over-HTTPS in the DNS client (Windows 11).
pub const DOH_MIN_BUILD: u32 = 22000;

/// Windows version as reported by `ver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OsInfo {
    pub major: Option<u32>,
    pub minor: Option<u32>,
    pub build: Option<u32>,
}

impl OsInfo {
    /// Construct from a known build number (major 10, minor 0).
    pub fn windows_build(build: u32) -> Self {
        Self {
            major: Some(10),
            minor: Some(0),
            build: Some(build),
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    /// Parse `Microsoft Windows [Version 10.0.22631.4169]`.
    pub fn parse_ver_output(output: &str) -> Self {
        let Some(start) = output.find("[Version ") else {
            return Self::unknown();
        };
        let rest = &output[start + "[Version ".len()..];
        let version = rest.split(']').next().unwrap_or_default();
        let mut parts = version.trim().split('.').map(|p| p.parse::<u32>().ok());

        Self {
            major: parts.next().flatten(),
            minor: parts.next().flatten(),
            build: parts.next().flatten(),
        }
    }

    /// Run `ver` and parse it. Any failure yields `OsInfo::unknown()`.
    pub fn detect(runner: &dyn CommandRunner, timeout: Duration) -> Self {
        match runner.run_args(&VerArgs, timeout) {
            Ok(out) if out.success => {
                let info = Self::parse_ver_output(&out.stdout);
                info!("Detected OS: {}", info);
                info
            }
            Ok(out) => {
                warn!("ver failed: {}", out.diagnostic());
                Self::unknown()
            }
            Err(e) => {
                warn!("OS version detection failed: {}", e);
                Self::unknown()
            }
        }
    }

    /// Windows 11 and later expose the DoH server table in the DNS client.
    pub fn supports_doh(&self) -> bool {
        self.major == Some(10) && self.build.is_some_and(|b| b >= DOH_MIN_BUILD)
    }

    pub fn product_name(&self) -> &'static str {
        match (self.major, self.minor, self.build) {
            (Some(10), _, Some(b)) if b >= DOH_MIN_BUILD => "Windows 11",
            (Some(10), _, _) => "Windows 10",
            (Some(6), Some(3), _) => "Windows 8.1",
            (Some(6), Some(2), _) => "Windows 8",
            (Some(6), Some(1), _) => "Windows 7",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for OsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.major, self.minor, self.build) {
            (Some(major), Some(minor), Some(build)) => {
                write!(f, "{} ({}.{}.{})", self.product_name(), major, minor, build)
            }
            _ => write!(f, "Unknown OS version"),
        }
    }
}

/// Whether the current process runs with administrator rights.
#[cfg(windows)]
pub fn is_elevated(runner: &dyn CommandRunner, timeout: Duration) -> bool {
    use crate::tools::system::NetSessionArgs;

    match runner.run_args(&NetSessionArgs, timeout) {
        Ok(out) => out.success,
        Err(e) => {
            warn!("Elevation check failed: {}", e);
            false
        }
    }
}

/// Whether the current process runs with root privileges (EUID 0).
#[cfg(unix)]
pub fn is_elevated(_runner: &dyn CommandRunner, _timeout: Duration) -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(any(windows, unix)))]
pub fn is_elevated(_runner: &dyn CommandRunner, _timeout: Duration) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_windows_11() {
        let info = OsInfo::parse_ver_output("\r\nMicrosoft Windows [Version 10.0.22631.4169]\r\n");
        assert_eq!(info.major, Some(10));
        assert_eq!(info.minor, Some(0));
        assert_eq!(info.build, Some(22631));
        assert!(info.supports_doh());
        assert_eq!(info.product_name(), "Windows 11");
    }

    #[test]
    fn test_parse_windows_10() {
        let info = OsInfo::parse_ver_output("Microsoft Windows [Version 10.0.19045.3803]");
        assert_eq!(info.build, Some(19045));
        assert!(!info.supports_doh());
        assert_eq!(info.to_string(), "Windows 10 (10.0.19045)");
    }

    #[test]
    fn test_parse_older_windows_and_garbage() {
        let info = OsInfo::parse_ver_output("Microsoft Windows [Version 6.1.7601]");
        assert_eq!(info.product_name(), "Windows 7");

        let info = OsInfo::parse_ver_output("something else entirely");
        assert_eq!(info, OsInfo::unknown());
        assert!(!info.supports_doh());
        assert_eq!(info.to_string(), "Unknown OS version");
    }

    #[test]
    fn test_doh_boundary() {
        assert!(OsInfo::windows_build(22000).supports_doh());
        assert!(!OsInfo::windows_build(21999).supports_doh());
    }
}
