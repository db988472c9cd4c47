//! DNS and DNS-over-HTTPS configuration through `netsh` and `reg`.
//!
//! # Gates
//!
//! - Every operation checks elevation first and fails with
//!   `PostInstallError::PrivilegeDenied` before any command runs.
//! - The DoH registry table is only read or written when the OS supports it
//!   (`OsInfo::supports_doh`).
//! - `set_dns` validates both addresses and the template before the first
//!   command.
//!
//! A failed step aborts the operation. Steps that already ran are not rolled
//! back.

use std::net::IpAddr;
use std::time::Duration;
use strum::Display;
use tracing::{info, warn};

use crate::command_runner::{CommandOutput, CommandRunner};
use crate::error::{PostInstallError, Result};
use crate::platform::OsInfo;
use crate::tool_args::ToolArgs;
use crate::tools::netsh::{IpFamily, NetshArgs};
use crate::tools::reg::RegArgs;

/// State column value of an interface that is up.
const CONNECTED: &str = "Connected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DohStatus {
    #[strum(serialize = "enabled")]
    Enabled,
    #[strum(serialize = "disabled")]
    Disabled,
    /// The OS has no native DoH support (before Windows 11)
    #[strum(serialize = "unsupported")]
    Unsupported,
}

/// What `check_dns` found for one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsReport {
    pub interface: String,
    pub servers: Vec<IpAddr>,
    /// Unparsed `netsh` output, for display.
    pub raw: String,
    pub doh: DohStatus,
}

/// Reads and changes the DNS settings of the host.
pub struct NetworkConfigurator<R: CommandRunner> {
    runner: R,
    elevated: bool,
    os: OsInfo,
    timeout: Duration,
}

impl<R: CommandRunner> NetworkConfigurator<R> {
    pub fn new(runner: R, elevated: bool, os: OsInfo, timeout: Duration) -> Self {
        Self {
            runner,
            elevated,
            os,
            timeout,
        }
    }

    fn require_elevation(&self, operation: &str) -> Result<()> {
        if self.elevated {
            Ok(())
        } else {
            warn!("{} refused: process is not elevated", operation);
            Err(PostInstallError::privilege(format!(
                "{} requires administrator rights",
                operation
            )))
        }
    }

    /// Run one step; any non-success exit aborts with `CommandFailed`.
    fn step(&self, args: &dyn ToolArgs) -> Result<CommandOutput> {
        self.runner
            .run_args(args, self.timeout)?
            .ensure_success(args.program())
    }

    /// First connected, non-loopback interface.
    pub fn query_active_interface(&self) -> Result<Option<String>> {
        self.require_elevation("Interface query")?;
        let out = self.step(&NetshArgs::ShowInterfaces)?;
        let iface = parse_active_interface(&out.stdout);
        match &iface {
            Some(name) => info!("Active interface: {}", name),
            None => warn!("No connected interface found"),
        }
        Ok(iface)
    }

    /// DNS servers of `interface` and the DoH state of the host.
    pub fn check_dns(&self, interface: &str) -> Result<DnsReport> {
        self.require_elevation("DNS check")?;
        let out = self.step(&NetshArgs::ShowDns {
            interface: interface.to_string(),
        })?;
        let servers = parse_dns_servers(&out.stdout);
        let doh = self.doh_status();
        info!(
            "DNS on {}: {:?}, DoH {}",
            interface, servers, doh
        );

        Ok(DnsReport {
            interface: interface.to_string(),
            servers,
            raw: out.stdout,
            doh,
        })
    }

    fn doh_status(&self) -> DohStatus {
        if !self.os.supports_doh() {
            return DohStatus::Unsupported;
        }
        match self.runner.run_args(&RegArgs::QueryDohServers, self.timeout) {
            Ok(out) if out.success && out.stdout.contains("AutoUpgrade") => DohStatus::Enabled,
            Ok(_) => DohStatus::Disabled,
            Err(e) => {
                warn!("DoH registry query failed: {}", e);
                DohStatus::Disabled
            }
        }
    }

    /// Static primary and secondary servers, plus DoH templates when supported.
    pub fn set_dns(
        &self,
        interface: &str,
        primary: &str,
        secondary: &str,
        doh_template: &str,
    ) -> Result<()> {
        self.require_elevation("DNS change")?;

        let primary = parse_address(primary)?;
        let secondary = parse_address(secondary)?;
        if IpFamily::of(&primary) != IpFamily::of(&secondary) {
            return Err(PostInstallError::validation(format!(
                "{} and {} are not of the same address family",
                primary, secondary
            )));
        }
        validate_template(doh_template)?;

        info!(
            "Setting DNS on {} to {}, {}",
            interface, primary, secondary
        );
        self.step(&NetshArgs::SetStaticDns {
            interface: interface.to_string(),
            server: primary,
        })?;
        self.step(&NetshArgs::AddDns {
            interface: interface.to_string(),
            server: secondary,
            index: 2,
        })?;

        if self.os.supports_doh() {
            for server in [primary, secondary] {
                self.step(&RegArgs::SetDohTemplate {
                    server,
                    template: doh_template.to_string(),
                })?;
                self.step(&RegArgs::EnableDohAutoUpgrade { server })?;
            }
            info!("DoH template registered for {} and {}", primary, secondary);
        } else {
            info!("{} has no native DoH, skipping DoH registration", self.os);
        }
        Ok(())
    }

    /// Back to DHCP DNS for both address families and no DoH servers.
    pub fn reset_dns(&self, interface: &str) -> Result<()> {
        self.require_elevation("DNS reset")?;

        info!("Resetting DNS on {} to DHCP", interface);
        for family in [IpFamily::V4, IpFamily::V6] {
            self.step(&NetshArgs::SetDhcpDns {
                interface: interface.to_string(),
                family,
            })?;
        }
        if self.os.supports_doh() {
            self.step(&RegArgs::DeleteDohServers)?;
            info!("DoH server table removed");
        }
        Ok(())
    }
}

fn parse_address(text: &str) -> Result<IpAddr> {
    text.trim()
        .parse()
        .map_err(|_| PostInstallError::validation(format!("'{}' is not an IP address", text)))
}

fn validate_template(template: &str) -> Result<()> {
    let rest = template.trim().strip_prefix("https://").unwrap_or_default();
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return Err(PostInstallError::validation(format!(
            "'{}' is not an https:// DoH template",
            template
        )));
    }
    Ok(())
}

/// Pick the interface name from `netsh interface show interface`.
///
/// ```text
/// Admin State    State          Type             Interface Name
/// -------------------------------------------------------------------------
/// Enabled        Connected      Dedicated        Wi-Fi 2
/// ```
pub fn parse_active_interface(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let columns = split_columns(line);
        if columns.len() < 4 || columns[1] != CONNECTED {
            return None;
        }
        let name = columns[columns.len() - 1];
        if name.to_ascii_lowercase().contains("loopback") {
            return None;
        }
        Some(name.to_string())
    })
}

/// Columns are separated by two or more spaces; names may contain single spaces.
fn split_columns(line: &str) -> Vec<&str> {
    line.trim()
        .split("  ")
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect()
}

/// Every token of `netsh ... show dns` output that is an IP address, deduplicated.
pub fn parse_dns_servers(output: &str) -> Vec<IpAddr> {
    let mut servers = Vec::new();
    for addr in output
        .split_whitespace()
        .filter_map(|token| token.parse::<IpAddr>().ok())
    {
        if !servers.contains(&addr) {
            servers.push(addr);
        }
    }
    servers
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOW_INTERFACE: &str = "\r
Admin State    State          Type             Interface Name\r
-------------------------------------------------------------------------\r
Enabled        Disconnected   Dedicated        Ethernet\r
Enabled        Connected      Loopback         Loopback Pseudo-Interface 1\r
Enabled        Connected      Dedicated        Wi-Fi 2\r
";

    #[test]
    fn test_parse_active_interface() {
        assert_eq!(parse_active_interface(SHOW_INTERFACE), Some("Wi-Fi 2".to_string()));
    }

    #[test]
    fn test_disconnected_is_not_connected() {
        let out = "Enabled        Disconnected   Dedicated        Ethernet\n";
        assert_eq!(parse_active_interface(out), None);
        assert_eq!(parse_active_interface(""), None);
    }

    #[test]
    fn test_parse_dns_servers() {
        let out = "
Configuration for interface \"Wi-Fi\"
    Statically Configured DNS Servers:    176.99.11.77
                                          80.78.247.254
                                          176.99.11.77
    Register with which suffix:           Primary only
";
        let servers = parse_dns_servers(out);
        assert_eq!(
            servers,
            vec![
                "176.99.11.77".parse::<IpAddr>().unwrap(),
                "80.78.247.254".parse::<IpAddr>().unwrap()
            ]
        );
    }

    #[test]
    fn test_template_validation() {
        assert!(validate_template("https://xbox-dns.ru/dns-query").is_ok());
        assert!(validate_template("http://xbox-dns.ru/dns-query").is_err());
        assert!(validate_template("https://").is_err());
        assert!(validate_template("dns-query").is_err());
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address(" 1.1.1.1 ").is_ok());
        assert!(parse_address("2606:4700:4700::1111").is_ok());
        assert!(matches!(
            parse_address("1.1.1"),
            Err(PostInstallError::Validation(_))
        ));
    }
}
