//! Log file setup.
//!
//! Records go to an append-only file, one line each with timestamp, level and
//! message. `RUST_LOG` overrides the default filter.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// If the log file cannot be opened the subscriber writes to stderr instead,
/// so a read-only working directory never stops the program.
pub fn init(log_path: &Path, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(file) => {
            let result = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .try_init();
            if result.is_err() {
                eprintln!("warning: logging was already initialised");
            }
        }
        Err(e) => {
            eprintln!(
                "warning: cannot open log file {}: {} (logging to stderr)",
                log_path.display(),
                e
            );
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
