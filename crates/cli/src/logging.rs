//! File-based logging for the CLI.
//!
//! Logs go to `~/.local/state/shellfleet/shellfleet.log` through a daily
//! rolling appender. Stderr output is added when `RUST_LOG` is set or
//! `--verbose` is given. Stdout is reserved for run results.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// The directory under `~/.local/state/` where logs are stored.
const LOG_DIR_NAME: &str = "shellfleet";

/// The base filename for the rolling log file.
const LOG_FILE_NAME: &str = "shellfleet.log";

/// Crates whose debug output drowns ours.
const QUIET_CRATES: &[&str] = &["russh=warn", "hyper=warn", "tungstenite=warn", "tokio=warn"];

/// Initialise the tracing subscriber with file + optional stderr layers.
///
/// The returned [`WorkerGuard`] must be held for the lifetime of the program;
/// dropping it flushes and closes the log file writer.
pub fn init_logging(verbose: bool) -> WorkerGuard {
    let log_dir = log_directory();

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!(
            "warning: could not create log directory {}: {e}",
            log_dir.display()
        );
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);

    let stderr_layer = if verbose || std::env::var("RUST_LOG").is_ok() {
        Some(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(true),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(build_filter(verbose))
        .with(file_layer)
        .with(stderr_layer)
        .init();

    guard
}

/// `RUST_LOG` if set, otherwise `info` (`debug` with `--verbose`), with the
/// transport crates held at `warn`.
fn build_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    for directive in QUIET_CRATES {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("warning: bad log directive {directive}: {e}"),
        }
    }
    filter
}

/// Resolve the log directory path.
///
/// Uses `dirs::state_dir()` where the platform has one, falling back to
/// `~/.local/state/shellfleet/` and finally the current directory.
fn log_directory() -> PathBuf {
    if let Some(state) = dirs::state_dir() {
        return state.join(LOG_DIR_NAME);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".local").join("state").join(LOG_DIR_NAME);
    }
    PathBuf::from(".")
}
