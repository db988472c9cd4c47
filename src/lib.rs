//! postinstall library
//!
//! Core functionality for the Windows post-install helper: the package
//! catalog and its sources, the winget adapter, the install orchestrator and
//! the DNS configurator.

pub mod catalog;
pub mod catalog_source;
pub mod cli;
pub mod command_runner;
pub mod config;
pub mod context;
pub mod error;
pub mod install_state;
pub mod logging;
pub mod network;
pub mod orchestrator;
pub mod package_manager;
pub mod platform;
pub mod process_guard;
pub mod sanity;
pub mod tool_args;
pub mod tools;

// Re-export main types for convenience
pub use catalog::{Catalog, PackageDescriptor};
pub use catalog_source::{CatalogLoader, CatalogOrigin, LoadedCatalog, RemoteSource, UpdateCheck};
pub use command_runner::{CommandOutput, CommandRunner, SystemRunner};
pub use config::{AppConfig, DnsPreset};
pub use context::{AppContext, JobHandle};
pub use error::{PostInstallError, Result};
pub use install_state::{JobState, JobStateMachine, JobTransitionError};
pub use network::{DnsReport, DohStatus, NetworkConfigurator};
pub use orchestrator::{
    CancellationToken, ItemOutcome, JobEvent, JobOptions, JobReport, PackageStatus,
    ShutdownControl, SystemControl,
};
pub use package_manager::{InstallFailure, PackageManager, Winget, WingetTimeouts};
pub use platform::OsInfo;
pub use process_guard::{ChildRegistry, SharedRegistry};
pub use tool_args::{Invocation, ToolArgs};
