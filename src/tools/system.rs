//! Type-safe arguments for the small system tools: OS version, elevation check
//! and delayed restart.

use crate::tool_args::ToolArgs;

/// `cmd /c ver`, prints `Microsoft Windows [Version 10.0.22631.4169]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerArgs;

impl ToolArgs for VerArgs {
    fn program(&self) -> &'static str {
        "cmd"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["/c".to_string(), "ver".to_string()]
    }
}

/// `net session` exits 0 only in an elevated process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetSessionArgs;

impl ToolArgs for NetSessionArgs {
    fn program(&self) -> &'static str {
        "net"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["session".to_string()]
    }
}

/// `shutdown /r /t <delay>`: restart after a delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebootArgs {
    pub delay_secs: u32,
}

impl ToolArgs for RebootArgs {
    fn program(&self) -> &'static str {
        "shutdown"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "/r".to_string(),
            "/t".to_string(),
            self.delay_secs.to_string(),
        ]
    }

    fn is_mutating(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reboot_args() {
        let args = RebootArgs { delay_secs: 15 };
        assert_eq!(args.program(), "shutdown");
        assert_eq!(args.to_cli_args(), vec!["/r", "/t", "15"]);
        assert!(args.is_mutating());
    }

    #[test]
    fn test_queries_are_read_only() {
        assert!(!VerArgs.is_mutating());
        assert!(!NetSessionArgs.is_mutating());
        assert_eq!(VerArgs.to_cli_args(), vec!["/c", "ver"]);
    }
}
