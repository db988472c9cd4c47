//! Type-safe arguments for `reg` calls on the DNS client's DoH server table.

use std::net::IpAddr;

use crate::tool_args::ToolArgs;

/// Registry key listing the DNS servers the DNS client may upgrade to DoH.
pub const DOH_SERVERS_KEY: &str =
    r"HKLM\SYSTEM\CurrentControlSet\Services\Dnscache\Parameters\DohWellKnownServers";

/// `AutoUpgrade` value that makes the DNS client prefer DoH for a server.
pub const DOH_AUTO_UPGRADE: u32 = 2;

/// One `reg` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegArgs {
    /// `reg query <key> /s`
    QueryDohServers,
    /// Register the DoH template for one server.
    SetDohTemplate { server: IpAddr, template: String },
    /// Turn on automatic DoH upgrade for one server.
    EnableDohAutoUpgrade { server: IpAddr },
    /// Drop the whole DoH server table.
    DeleteDohServers,
}

fn server_key(server: &IpAddr) -> String {
    format!(r"{}\{}", DOH_SERVERS_KEY, server)
}

impl ToolArgs for RegArgs {
    fn program(&self) -> &'static str {
        "reg"
    }

    fn to_cli_args(&self) -> Vec<String> {
        match self {
            Self::QueryDohServers => vec![
                "query".to_string(),
                DOH_SERVERS_KEY.to_string(),
                "/s".to_string(),
            ],
            Self::SetDohTemplate { server, template } => vec![
                "add".to_string(),
                server_key(server),
                "/v".to_string(),
                "Template".to_string(),
                "/t".to_string(),
                "REG_SZ".to_string(),
                "/d".to_string(),
                template.clone(),
                "/f".to_string(),
            ],
            Self::EnableDohAutoUpgrade { server } => vec![
                "add".to_string(),
                server_key(server),
                "/v".to_string(),
                "AutoUpgrade".to_string(),
                "/t".to_string(),
                "REG_DWORD".to_string(),
                "/d".to_string(),
                DOH_AUTO_UPGRADE.to_string(),
                "/f".to_string(),
            ],
            Self::DeleteDohServers => vec![
                "delete".to_string(),
                DOH_SERVERS_KEY.to_string(),
                "/f".to_string(),
            ],
        }
    }

    fn is_mutating(&self) -> bool {
        !matches!(self, Self::QueryDohServers)
    }
}
