//! Type-safe arguments for `netsh` DNS commands.

use std::net::IpAddr;

use crate::tool_args::ToolArgs;

/// Address family context for `netsh interface <family> ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    fn context(self) -> &'static str {
        match self {
            Self::V4 => "ipv4",
            Self::V6 => "ipv6",
        }
    }
}

/// One `netsh` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetshArgs {
    /// `netsh interface show interface`
    ShowInterfaces,
    /// `netsh interface ip show dns name=<iface>`
    ShowDns { interface: String },
    /// Replace the DNS list with a single static server.
    SetStaticDns { interface: String, server: IpAddr },
    /// Append a server at the given position (1-based).
    AddDns {
        interface: String,
        server: IpAddr,
        index: u8,
    },
    /// Back to DHCP-assigned DNS for one address family.
    SetDhcpDns { interface: String, family: IpFamily },
}

fn name_arg(interface: &str) -> String {
    format!("name={}", interface)
}

impl ToolArgs for NetshArgs {
    fn program(&self) -> &'static str {
        "netsh"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["interface".to_string()];
        match self {
            Self::ShowInterfaces => {
                args.extend(["show".to_string(), "interface".to_string()]);
            }
            Self::ShowDns { interface } => {
                args.extend([
                    "ip".to_string(),
                    "show".to_string(),
                    "dns".to_string(),
                    name_arg(interface),
                ]);
            }
            Self::SetStaticDns { interface, server } => {
                args.extend([
                    IpFamily::of(server).context().to_string(),
                    "set".to_string(),
                    "dns".to_string(),
                    name_arg(interface),
                    "static".to_string(),
                    server.to_string(),
                ]);
            }
            Self::AddDns {
                interface,
                server,
                index,
            } => {
                args.extend([
                    IpFamily::of(server).context().to_string(),
                    "add".to_string(),
                    "dns".to_string(),
                    name_arg(interface),
                    server.to_string(),
                    format!("index={}", index),
                ]);
            }
            Self::SetDhcpDns { interface, family } => {
                args.extend([
                    family.context().to_string(),
                    "set".to_string(),
                    "dns".to_string(),
                    name_arg(interface),
                    "source=dhcp".to_string(),
                ]);
            }
        }
        args
    }

    fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::SetStaticDns { .. } | Self::AddDns { .. } | Self::SetDhcpDns { .. }
        )
    }
}
