//! Type-safe arguments for the Windows package manager (`winget`).
//!
//! Every package-scoped call passes `--id <id> -e` so that ids match exactly.

use crate::tool_args::ToolArgs;

/// One `winget` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WingetArgs {
    /// `winget --version`, used to detect whether winget is present.
    Version,
    /// `winget show --id <id> -e`: exits 0 if the source knows the id.
    Show { id: String },
    /// `winget list --id <id> -e`: exits 0 if the id is installed.
    List { id: String },
    /// Silent install accepting source and package agreements.
    Install { id: String },
    /// Silent uninstall.
    Uninstall { id: String },
}

impl WingetArgs {
    fn exact_id(id: &str) -> [String; 3] {
        ["--id".to_string(), id.to_string(), "-e".to_string()]
    }
}

impl ToolArgs for WingetArgs {
    fn program(&self) -> &'static str {
        "winget"
    }

    fn to_cli_args(&self) -> Vec<String> {
        match self {
            Self::Version => vec!["--version".to_string()],
            Self::Show { id } => {
                let mut args = vec!["show".to_string()];
                args.extend(Self::exact_id(id));
                args
            }
            Self::List { id } => {
                let mut args = vec!["list".to_string()];
                args.extend(Self::exact_id(id));
                args
            }
            Self::Install { id } => {
                let mut args = vec!["install".to_string()];
                args.extend(Self::exact_id(id));
                args.extend([
                    "--silent".to_string(),
                    "--accept-source-agreements".to_string(),
                    "--accept-package-agreements".to_string(),
                ]);
                args
            }
            Self::Uninstall { id } => {
                let mut args = vec!["uninstall".to_string()];
                args.extend(Self::exact_id(id));
                args.push("--silent".to_string());
                args
            }
        }
    }

    /// Install and uninstall change the system; queries do not.
    fn is_mutating(&self) -> bool {
        matches!(self, Self::Install { .. } | Self::Uninstall { .. })
    }
}
