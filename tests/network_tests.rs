//! Tests for the DNS configurator
//!
//! These tests verify:
//! - The privilege gate runs before any command
//! - Input validation runs before any command
//! - DoH registry steps depend on the OS build
//! - A failing step aborts the operation with the raw diagnostic

mod common;

use std::time::Duration;

use common::ScriptedRunner;
use postinstall::command_runner::CommandOutput;
use postinstall::error::PostInstallError;
use postinstall::network::{DohStatus, NetworkConfigurator};
use postinstall::platform::OsInfo;

const TIMEOUT: Duration = Duration::from_secs(15);

const SHOW_INTERFACE: &str = "
Admin State    State          Type             Interface Name
-------------------------------------------------------------------------
Enabled        Connected      Dedicated        Ethernet 3
Enabled        Disconnected   Dedicated        Wi-Fi
";

const SHOW_DNS: &str = "
Configuration for interface \"Ethernet 3\"
    Statically Configured DNS Servers:    176.99.11.77
                                          80.78.247.254
    Register with which suffix:           Primary only
";

fn windows_11() -> OsInfo {
    OsInfo::windows_build(22631)
}

fn windows_10() -> OsInfo {
    OsInfo::windows_build(19045)
}

// =============================================================================
// Gates
// =============================================================================

#[test]
fn test_not_elevated_runs_nothing() {
    let net = NetworkConfigurator::new(ScriptedRunner::new(), false, windows_11(), TIMEOUT);

    assert!(matches!(
        net.query_active_interface(),
        Err(PostInstallError::PrivilegeDenied(_))
    ));
    assert!(matches!(
        net.check_dns("Ethernet 3"),
        Err(PostInstallError::PrivilegeDenied(_))
    ));
    assert!(matches!(
        net.set_dns("Ethernet 3", "1.1.1.1", "1.0.0.1", "https://cloudflare-dns.com/dns-query"),
        Err(PostInstallError::PrivilegeDenied(_))
    ));
    assert!(matches!(
        net.reset_dns("Ethernet 3"),
        Err(PostInstallError::PrivilegeDenied(_))
    ));
}

#[test]
fn test_not_elevated_issues_no_commands() {
    let runner = ScriptedRunner::new();
    {
        let net = NetworkConfigurator::new(&runner, false, windows_11(), TIMEOUT);
        let _ = net.reset_dns("Ethernet 3");
        let _ = net.set_dns("Ethernet 3", "1.1.1.1", "1.0.0.1", "https://x/dns-query");
    }
    assert!(runner.calls().is_empty());
}

#[test]
fn test_malformed_input_issues_no_commands() {
    let runner = ScriptedRunner::new();
    {
        let net = NetworkConfigurator::new(&runner, true, windows_11(), TIMEOUT);
        for (primary, secondary, template) in [
            ("not-an-ip", "1.0.0.1", "https://x/dns-query"),
            ("1.1.1.1", "1.0.0.300", "https://x/dns-query"),
            ("1.1.1.1", "1.0.0.1", "http://x/dns-query"),
            ("1.1.1.1", "1.0.0.1", ""),
        ] {
            let result = net.set_dns("Ethernet 3", primary, secondary, template);
            assert!(
                matches!(result, Err(PostInstallError::Validation(_))),
                "{} / {} / {} should be rejected",
                primary,
                secondary,
                template
            );
        }
    }
    assert!(runner.calls().is_empty());
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn test_query_active_interface() {
    let runner =
        ScriptedRunner::new().reply("netsh interface show", CommandOutput::success(SHOW_INTERFACE));
    let net = NetworkConfigurator::new(&runner, true, windows_11(), TIMEOUT);
    assert_eq!(
        net.query_active_interface().unwrap(),
        Some("Ethernet 3".to_string())
    );
}

#[test]
fn test_check_dns_with_doh_enabled() {
    let runner = ScriptedRunner::new()
        .reply("netsh interface ip show dns", CommandOutput::success(SHOW_DNS))
        .reply(
            "reg query",
            CommandOutput::success(
                "HKEY_LOCAL_MACHINE\\...\\DohWellKnownServers\\176.99.11.77\n    Template    REG_SZ    https://xbox-dns.ru/dns-query\n    AutoUpgrade    REG_DWORD    0x2\n",
            ),
        );
    let net = NetworkConfigurator::new(&runner, true, windows_11(), TIMEOUT);

    let report = net.check_dns("Ethernet 3").unwrap();
    assert_eq!(report.interface, "Ethernet 3");
    assert_eq!(report.servers.len(), 2);
    assert_eq!(report.servers[0].to_string(), "176.99.11.77");
    assert_eq!(report.doh, DohStatus::Enabled);
}

#[test]
fn test_check_dns_doh_disabled_and_unsupported() {
    let runner = ScriptedRunner::new()
        .reply("netsh interface ip show dns", CommandOutput::success(SHOW_DNS))
        .reply(
            "reg query",
            CommandOutput::failure(1, "ERROR: The system was unable to find the specified registry key or value."),
        );
    {
        let net = NetworkConfigurator::new(&runner, true, windows_11(), TIMEOUT);
        assert_eq!(net.check_dns("Ethernet 3").unwrap().doh, DohStatus::Disabled);
    }

    let runner = ScriptedRunner::new()
        .reply("netsh interface ip show dns", CommandOutput::success(SHOW_DNS));
    {
        let net = NetworkConfigurator::new(&runner, true, windows_10(), TIMEOUT);
        assert_eq!(net.check_dns("Ethernet 3").unwrap().doh, DohStatus::Unsupported);
    }
    assert!(
        runner.command_lines().iter().all(|c| !c.starts_with("reg")),
        "no registry access before Windows 11"
    );
}

// =============================================================================
// Changes
// =============================================================================

#[test]
fn test_set_dns_on_windows_11_registers_doh() {
    let runner = ScriptedRunner::new();
    {
        let net = NetworkConfigurator::new(&runner, true, windows_11(), TIMEOUT);
        net.set_dns(
            "Ethernet 3",
            "176.99.11.77",
            "80.78.247.254",
            "https://xbox-dns.ru/dns-query",
        )
        .unwrap();
    }

    let key = r"HKLM\SYSTEM\CurrentControlSet\Services\Dnscache\Parameters\DohWellKnownServers";
    assert_eq!(
        runner.command_lines(),
        vec![
            "netsh interface ipv4 set dns name=Ethernet 3 static 176.99.11.77".to_string(),
            "netsh interface ipv4 add dns name=Ethernet 3 80.78.247.254 index=2".to_string(),
            format!(r"reg add {}\176.99.11.77 /v Template /t REG_SZ /d https://xbox-dns.ru/dns-query /f", key),
            format!(r"reg add {}\176.99.11.77 /v AutoUpgrade /t REG_DWORD /d 2 /f", key),
            format!(r"reg add {}\80.78.247.254 /v Template /t REG_SZ /d https://xbox-dns.ru/dns-query /f", key),
            format!(r"reg add {}\80.78.247.254 /v AutoUpgrade /t REG_DWORD /d 2 /f", key),
        ]
    );
    assert!(runner.calls().iter().all(|c| c.mutating));
}

#[test]
fn test_set_dns_on_windows_10_skips_registry() {
    let runner = ScriptedRunner::new();
    {
        let net = NetworkConfigurator::new(&runner, true, windows_10(), TIMEOUT);
        net.set_dns("Ethernet 3", "1.1.1.1", "1.0.0.1", "https://cloudflare-dns.com/dns-query")
            .unwrap();
    }
    let lines = runner.command_lines();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.starts_with("netsh")));
}

#[test]
fn test_set_dns_ipv6_uses_ipv6_context() {
    let runner = ScriptedRunner::new();
    {
        let net = NetworkConfigurator::new(&runner, true, windows_10(), TIMEOUT);
        net.set_dns(
            "Ethernet 3",
            "2606:4700:4700::1111",
            "2606:4700:4700::1001",
            "https://x/dns-query",
        )
        .unwrap();
    }
    assert_eq!(
        runner.command_lines(),
        vec![
            "netsh interface ipv6 set dns name=Ethernet 3 static 2606:4700:4700::1111".to_string(),
            "netsh interface ipv6 add dns name=Ethernet 3 2606:4700:4700::1001 index=2".to_string(),
        ]
    );
}

#[test]
fn test_set_dns_mixed_families_rejected() {
    let runner = ScriptedRunner::new();
    let result = {
        let net = NetworkConfigurator::new(&runner, true, windows_11(), TIMEOUT);
        net.set_dns("Ethernet 3", "2606:4700:4700::1111", "1.0.0.1", "https://x/dns-query")
    };
    assert!(matches!(result, Err(PostInstallError::Validation(_))));
    assert!(runner.calls().is_empty());
}

#[test]
fn test_reset_after_ipv6_set_clears_ipv6() {
    let runner = ScriptedRunner::new();
    {
        let net = NetworkConfigurator::new(&runner, true, windows_10(), TIMEOUT);
        net.set_dns(
            "Ethernet",
            "2606:4700:4700::1111",
            "2606:4700:4700::1001",
            "https://cloudflare-dns.com/dns-query",
        )
        .unwrap();
        net.reset_dns("Ethernet").unwrap();
    }
    let lines = runner.command_lines();
    assert_eq!(
        &lines[2..],
        &[
            "netsh interface ipv4 set dns name=Ethernet source=dhcp".to_string(),
            "netsh interface ipv6 set dns name=Ethernet source=dhcp".to_string(),
        ]
    );
}

#[test]
fn test_failed_step_aborts_without_rollback() {
    let runner = ScriptedRunner::new().reply(
        "netsh interface ipv4 add",
        CommandOutput::failure(1, "The object already exists."),
    );
    let result = {
        let net = NetworkConfigurator::new(&runner, true, windows_11(), TIMEOUT);
        net.set_dns("Ethernet 3", "1.1.1.1", "1.0.0.1", "https://x/dns-query")
    };

    match result {
        Err(PostInstallError::CommandFailed { tool, message, .. }) => {
            assert_eq!(tool, "netsh");
            assert_eq!(message, "The object already exists.");
        }
        other => panic!("expected CommandFailed, got {:?}", other),
    }
    // the static server stays set, nothing after the failure ran
    assert_eq!(runner.calls().len(), 2);
}

#[test]
fn test_reset_dns() {
    let runner = ScriptedRunner::new();
    {
        let net = NetworkConfigurator::new(&runner, true, windows_11(), TIMEOUT);
        net.reset_dns("Wi-Fi").unwrap();
    }
    assert_eq!(
        runner.command_lines(),
        vec![
            "netsh interface ipv4 set dns name=Wi-Fi source=dhcp".to_string(),
            "netsh interface ipv6 set dns name=Wi-Fi source=dhcp".to_string(),
            r"reg delete HKLM\SYSTEM\CurrentControlSet\Services\Dnscache\Parameters\DohWellKnownServers /f".to_string(),
        ]
    );
}
