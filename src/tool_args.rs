//! Type-safe tool argument contracts.
//!
//! Every external tool call (`winget`, `netsh`, `reg`, `shutdown`, ...) is
//! described by a Rust struct or enum implementing `ToolArgs`. Nothing builds
//! a raw argument vector by hand, so a misspelt flag is a compile error in one
//! place instead of a runtime failure in many.
//!
//! # Contract
//!
//! - `program()`: executable name, resolved through `PATH`.
//! - `to_cli_args()`: arguments exactly as the tool expects them.
//! - `is_mutating()`: true if the call changes system state. Mutating calls
//!   are skipped (and logged) in dry-run mode.

/// Trait for typed tool arguments.
pub trait ToolArgs {
    /// Executable to run.
    fn program(&self) -> &'static str;

    /// Convert struct fields to CLI arguments.
    fn to_cli_args(&self) -> Vec<String>;

    /// Whether the invocation changes system state.
    fn is_mutating(&self) -> bool {
        false
    }
}

/// A fully resolved command line, ready for a `CommandRunner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub mutating: bool,
}

impl Invocation {
    pub fn from_args<T: ToolArgs + ?Sized>(args: &T) -> Self {
        Self {
            program: args.program().to_string(),
            args: args.to_cli_args(),
            mutating: args.is_mutating(),
        }
    }

    /// Command line as one string, for logs and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}
