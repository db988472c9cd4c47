use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// postinstall - set up a fresh Windows machine with winget
#[derive(Parser)]
#[command(name = "postinstall")]
#[command(about = "Install a curated set of applications and configure DNS on a fresh Windows system")]
#[command(version)]
pub struct Cli {
    /// Path to a JSON configuration file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Dry-run mode: show what would be executed without making changes.
    ///
    /// Installs, uninstalls, DNS changes and reboots are logged and skipped.
    /// Read-only queries (winget list/show, netsh show) still execute so the
    /// preview is realistic.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log debug output (RUST_LOG overrides this)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the package catalog
    List {
        /// Only packages in this group
        #[arg(short, long)]
        group: Option<String>,
        /// Only packages that are not installed yet (queries winget)
        #[arg(long)]
        not_installed: bool,
    },
    /// Show the catalog groups
    Groups,
    /// Install packages by id, by group, or the whole catalog
    Install {
        /// Package ids (e.g. Valve.Steam)
        ids: Vec<String>,
        /// Install every package of this group
        #[arg(short, long, conflicts_with_all = ["all", "ids"])]
        group: Option<String>,
        /// Install the whole catalog
        #[arg(long, conflicts_with = "ids")]
        all: bool,
        /// Reboot without asking if a package needs it
        #[arg(long, conflicts_with = "no_reboot")]
        yes_reboot: bool,
        /// Never reboot, even if a package needs it
        #[arg(long)]
        no_reboot: bool,
    },
    /// Uninstall one package
    Uninstall {
        /// Package id
        id: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show which catalog packages are installed
    Installed,
    /// Check the remote catalog for changes
    Update {
        /// Make the new catalog active without asking
        #[arg(long)]
        apply: bool,
    },
    /// Validate a catalog file
    Validate {
        /// Path to the catalog JSON file
        file: PathBuf,
    },
    /// DNS and DNS-over-HTTPS tools
    Dns {
        #[command(subcommand)]
        action: DnsCommands,
    },
    /// Check winget, elevation and OS support
    Doctor,
}

#[derive(Subcommand)]
pub enum DnsCommands {
    /// Show the DNS servers and DoH state of the active interface
    Check {
        /// Interface name (default: first connected interface)
        #[arg(short, long)]
        interface: Option<String>,
    },
    /// Set static DNS servers and register their DoH template
    Set {
        /// Interface name (default: first connected interface)
        #[arg(short, long)]
        interface: Option<String>,
        /// Primary DNS server (default from configuration)
        #[arg(long)]
        primary: Option<String>,
        /// Secondary DNS server (default from configuration)
        #[arg(long)]
        secondary: Option<String>,
        /// DoH URL template (default from configuration)
        #[arg(long)]
        doh_template: Option<String>,
    },
    /// Return to DHCP DNS and drop the DoH servers
    Reset {
        /// Interface name (default: first connected interface)
        #[arg(short, long)]
        interface: Option<String>,
    },
}

impl DnsCommands {
    pub fn interface(&self) -> Option<&str> {
        match self {
            Self::Check { interface } | Self::Set { interface, .. } | Self::Reset { interface } => {
                interface.as_deref()
            }
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
