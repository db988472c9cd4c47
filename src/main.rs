//! postinstall - Main entry point
//!
//! Thin presentation layer over the library: parses the command line, wires
//! the runner, package manager and context together, prints job events and
//! asks the confirmations.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use postinstall::catalog::{Catalog, PackageDescriptor};
use postinstall::catalog_source::{self, CatalogLoader, LoadedCatalog, UpdateCheck};
use postinstall::cli::{Cli, Commands, DnsCommands};
use postinstall::command_runner::SystemRunner;
use postinstall::config::AppConfig;
use postinstall::context::AppContext;
use postinstall::error::PostInstallError;
use postinstall::install_state::JobState;
use postinstall::network::{DnsReport, NetworkConfigurator};
use postinstall::orchestrator::{
    CancellationToken, ItemOutcome, JobEvent, JobOptions, JobReport, ShutdownControl,
};
use postinstall::package_manager::{Winget, WingetTimeouts};
use postinstall::platform::{self, OsInfo};
use postinstall::process_guard::{self, ChildRegistry};
use postinstall::{logging, sanity};

/// Everything a command needs, built once at startup.
struct Runtime {
    config: AppConfig,
    runner: SystemRunner,
    cancel: CancellationToken,
    dry_run: bool,
}

/// Main application entry point
fn main() {
    let cli = Cli::parse_args();

    let config = match AppConfig::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    logging::init(&config.log_path, cli.verbose);
    info!("postinstall {} starting", env!("CARGO_PKG_VERSION"));
    if cli.dry_run {
        info!("Dry-run mode: mutating commands are logged, not executed");
        println!("(dry run: nothing will be changed)");
    }

    let registry = ChildRegistry::shared();
    let cancel = CancellationToken::new();
    if let Err(e) = process_guard::init_interrupt_handler(cancel.clone(), registry.clone()) {
        warn!("Failed to install Ctrl+C handler: {}", e);
    }

    let runtime = Runtime {
        runner: SystemRunner::new(registry, cli.dry_run),
        config,
        cancel,
        dry_run: cli.dry_run,
    };

    if let Err(e) = run(cli.command, &runtime) {
        error!("{:#}", e);
        match e.downcast_ref::<PostInstallError>() {
            Some(err) => eprintln!("✗ {}", err.user_message()),
            None => eprintln!("✗ {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(command: Commands, rt: &Runtime) -> Result<()> {
    match command {
        Commands::Validate { file } => validate_catalog_file(&file),
        Commands::Doctor => {
            let pm = winget(rt);
            let result =
                sanity::verify_environment(&pm, &rt.runner, rt.config.network_timeout());
            sanity::print_report(&result);
            Ok(())
        }
        Commands::Dns { action } => run_dns(action, rt),
        Commands::Groups => {
            let ctx = load_context(rt)?;
            let catalog = ctx.catalog();
            for group in catalog.groups() {
                println!("{} ({})", group, catalog.by_group(group).len());
            }
            Ok(())
        }
        Commands::List {
            group,
            not_installed,
        } => {
            let ctx = load_context(rt)?;
            let catalog = ctx.catalog();
            let installed: HashSet<String> = if not_installed {
                sanity::require_package_manager(ctx.package_manager().as_ref());
                let rx = ctx.installed_in_background()?;
                rx.recv()
                    .context("installed-package query stopped")?
                    .into_iter()
                    .map(|p| p.id)
                    .collect()
            } else {
                HashSet::new()
            };

            let packages = match &group {
                Some(g) => catalog.by_group(g),
                None => catalog.packages().to_vec(),
            };
            print_packages(
                packages
                    .iter()
                    .filter(|p| !installed.contains(&p.id)),
            );
            Ok(())
        }
        Commands::Installed => {
            let ctx = load_context(rt)?;
            sanity::require_package_manager(ctx.package_manager().as_ref());
            let installed = ctx
                .installed_in_background()?
                .recv()
                .context("installed-package query stopped")?;
            if installed.is_empty() {
                println!("No catalog packages are installed.");
            } else {
                print_packages(installed.iter());
            }
            Ok(())
        }
        Commands::Install {
            ids,
            group,
            all,
            yes_reboot,
            no_reboot,
        } => {
            let ctx = load_context(rt)?;
            let catalog = ctx.catalog();
            let selection = select(&catalog, &ids, group.as_deref(), all)?;
            sanity::require_package_manager(ctx.package_manager().as_ref());

            let reboot_answer = match (yes_reboot, no_reboot) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let handle = ctx.start_install_with_token(selection, rt.cancel.clone())?;
            for event in handle.events.iter() {
                print_event(event, reboot_answer);
            }
            let report = handle.join()?;
            print_summary(&report);
            Ok(())
        }
        Commands::Uninstall { id, yes } => {
            let ctx = load_context(rt)?;
            let pkg = ctx
                .catalog()
                .find(&id)
                .cloned()
                .ok_or_else(|| PostInstallError::UnknownPackage(id.clone()))?;
            if !yes && !confirm(&format!("Uninstall {} ({})?", pkg.name, pkg.id)) {
                println!("Cancelled.");
                return Ok(());
            }
            sanity::require_package_manager(ctx.package_manager().as_ref());
            let removed = ctx
                .uninstall_in_background(&pkg.id)?
                .recv()
                .context("uninstall worker stopped")?;
            if removed {
                println!("✓ {} uninstalled", pkg.name);
                Ok(())
            } else {
                anyhow::bail!("Failed to uninstall {} (see {})", pkg.name, rt.config.log_path.display())
            }
        }
        Commands::Update { apply } => {
            let ctx = load_local_context(rt)?;
            let check = ctx
                .check_for_update_in_background()?
                .recv()
                .context("update check stopped")?;
            match check {
                UpdateCheck::Available(catalog) => {
                    println!(
                        "A new package list is available ({} -> {} packages).",
                        ctx.catalog().len(),
                        catalog.len()
                    );
                    if apply || confirm("Use the new package list?") {
                        ctx.apply_catalog_update(catalog)?;
                        println!(
                            "✓ Package list updated ({})",
                            rt.config.cache_path.display()
                        );
                    }
                }
                UpdateCheck::UpToDate => println!("✓ Package list is up to date"),
                UpdateCheck::Unavailable(reason) => {
                    debug!("Update check unavailable: {}", reason);
                    println!("✗ Could not reach the package list server");
                }
            }
            Ok(())
        }
    }
}

fn winget(rt: &Runtime) -> Winget<SystemRunner> {
    Winget::new(rt.runner.clone(), WingetTimeouts::from(&rt.config))
}

fn build_context(rt: &Runtime) -> Result<AppContext> {
    let loader = CatalogLoader::from_config(&rt.config)?;
    let options = JobOptions {
        install_retries: rt.config.install_retries,
        reboot_delay_secs: rt.config.reboot_delay_secs,
    };
    Ok(AppContext::new(
        Catalog::builtin(),
        Arc::new(winget(rt)),
        Arc::new(ShutdownControl::new(
            rt.runner.clone(),
            rt.config.network_timeout(),
        )),
        loader,
        options,
    ))
}

/// Build the context and wait for the catalog to load.
fn load_context(rt: &Runtime) -> Result<AppContext> {
    let ctx = build_context(rt)?;
    let loaded = ctx
        .spawn_load()?
        .recv()
        .context("catalog loader stopped")?;
    print_loaded(&loaded);
    Ok(ctx)
}

/// Like `load_context`, but the active catalog is the saved one (cache or
/// built-in) so it can be compared with the remote list.
fn load_local_context(rt: &Runtime) -> Result<AppContext> {
    let ctx = build_context(rt)?;
    let loaded = ctx
        .spawn_load_local()?
        .recv()
        .context("catalog loader stopped")?;
    print_loaded(&loaded);
    Ok(ctx)
}

fn print_loaded(loaded: &LoadedCatalog) {
    println!(
        "Package list: {} packages ({})",
        loaded.catalog.len(),
        loaded.origin
    );
}

fn select(
    catalog: &Catalog,
    ids: &[String],
    group: Option<&str>,
    all: bool,
) -> Result<Vec<PackageDescriptor>> {
    if all {
        return Ok(catalog.packages().to_vec());
    }
    if let Some(group) = group {
        let packages = catalog.by_group(group);
        if packages.is_empty() {
            anyhow::bail!(
                "Unknown group '{}'. Groups: {}",
                group,
                catalog.groups().join(", ")
            );
        }
        return Ok(packages);
    }
    Ok(catalog.select(ids)?)
}

fn print_packages<'a>(packages: impl Iterator<Item = &'a PackageDescriptor>) {
    for pkg in packages {
        let reboot = if pkg.requires_reboot() { "  (reboot)" } else { "" };
        println!("{:<28} {:<32} {}{}", pkg.name, pkg.id, pkg.group, reboot);
    }
}

fn print_event(event: JobEvent, reboot_answer: Option<bool>) {
    match event {
        JobEvent::Started { total } => println!("Installing {} package(s)...", total),
        JobEvent::Status {
            index,
            total,
            name,
            status,
            ..
        } => println!("[{}/{}] {}: {}", index, total, name, status),
        JobEvent::Progress(pct) => debug!("progress {}%", pct),
        JobEvent::RebootRequested { packages, reply } => {
            println!("A restart is required by: {}", packages.join(", "));
            let answer = reboot_answer.unwrap_or_else(|| confirm("Restart now?"));
            let _ = reply.send(answer);
        }
        JobEvent::RebootScheduled { delay_secs } => {
            println!("✓ Restarting in {} seconds", delay_secs)
        }
        JobEvent::RebootFailed(reason) => println!("✗ Could not schedule the restart: {}", reason),
        JobEvent::Finished(_) => {}
    }
}

fn print_summary(report: &JobReport) {
    println!();
    match report.state {
        JobState::Cancelled => println!("✗ Installation cancelled"),
        _ => println!("✓ Installation finished"),
    }
    println!(
        "  installed: {}, already installed: {}, not found: {}, failed: {}, skipped: {}",
        report.installed(),
        report.already_installed(),
        report.not_found(),
        report.failed(),
        report.skipped()
    );
    for (pkg, outcome) in &report.outcomes {
        if let ItemOutcome::Failed(reason) = outcome {
            println!("  ✗ {}: {}", pkg.name, reason);
        }
    }
    for tag in &report.specials {
        match tag.as_str() {
            "valorant" => {
                println!("  VALORANT installed: Riot Vanguard starts after the next restart.")
            }
            other => debug!("No message for special tag '{}'", other),
        }
    }
    if report.needs_reboot && report.state != JobState::CompletedWithRebootPending {
        println!("  A restart is still required to finish some installs.");
    }
}

/// Ask a yes/no question on stdin. Anything but y/yes is "no".
fn confirm(question: &str) -> bool {
    print!("{} [y/N] ", question);
    let _ = io::stdout().flush();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn validate_catalog_file(file: &Path) -> Result<()> {
    info!("Validating catalog file: {:?}", file);
    match catalog_source::load_catalog(file) {
        Ok(catalog) => {
            info!("Catalog validation successful");
            println!(
                "✓ Catalog file is valid: {} packages in {} groups",
                catalog.len(),
                catalog.groups().len()
            );
            Ok(())
        }
        Err(e) => {
            error!("Catalog validation failed: {}", e);
            eprintln!("✗ Catalog validation failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn run_dns(action: DnsCommands, rt: &Runtime) -> Result<()> {
    let timeout = rt.config.network_timeout();
    let elevated = platform::is_elevated(&rt.runner, timeout);
    let os = OsInfo::detect(&rt.runner, timeout);
    let net = NetworkConfigurator::new(rt.runner.clone(), elevated, os, timeout);

    let interface = match action.interface() {
        Some(name) => name.to_string(),
        None => net
            .query_active_interface()?
            .ok_or(PostInstallError::InterfaceNotFound)?,
    };

    match action {
        DnsCommands::Check { .. } => {
            let report = net.check_dns(&interface)?;
            print_dns_report(&report);
        }
        DnsCommands::Set {
            primary,
            secondary,
            doh_template,
            ..
        } => {
            let preset = &rt.config.dns;
            let primary = primary.unwrap_or_else(|| preset.primary.clone());
            let secondary = secondary.unwrap_or_else(|| preset.secondary.clone());
            let template = doh_template.unwrap_or_else(|| preset.doh_template.clone());
            net.set_dns(&interface, &primary, &secondary, &template)?;
            println!("✓ DNS on {} set to {}, {}", interface, primary, secondary);
            if os.supports_doh() {
                println!("✓ DNS over HTTPS template registered: {}", template);
            } else {
                println!("  DNS over HTTPS needs Windows 11, skipped");
            }
        }
        DnsCommands::Reset { .. } => {
            net.reset_dns(&interface)?;
            println!("✓ DNS on {} reset to automatic (DHCP)", interface);
        }
    }
    if rt.dry_run {
        println!("(dry run: no DNS setting was changed)");
    }
    Ok(())
}

fn print_dns_report(report: &DnsReport) {
    println!("Interface: {}", report.interface);
    if report.servers.is_empty() {
        println!("DNS servers: automatic (DHCP) or none");
    } else {
        let servers: Vec<String> = report.servers.iter().map(|s| s.to_string()).collect();
        println!("DNS servers: {}", servers.join(", "));
    }
    println!("DNS over HTTPS: {}", report.doh);
    debug!("netsh output:\n{}", report.raw);
}
