//! Console and file logging.
//!
//! Console output defaults to INFO (DEBUG with `--debug`) and honors
//! `RUST_LOG`. Every run also writes a DEBUG-level log file named after the
//! start time, so a failed unattended session can be inspected afterwards.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log file name for a run started now.
pub fn log_file_name() -> String {
    format!("summary_capture_{}.log", Utc::now().format("%Y-%m-%d_%H-%M-%S"))
}

/// Installs the global subscriber. Returns the path of the log file.
pub fn init_logging(log_dir: &Path, debug: bool) -> Result<PathBuf> {
    let log_path = log_dir.join(log_file_name());
    let file = File::create(&log_path)
        .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

    let default_level = if debug { "debug" } else { "info" };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    install_panic_hook();
    Ok(log_path)
}

/// Routes panics through the logger as well as stderr.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();

        eprintln!("[PANIC]{} {}", location, msg);
        tracing::error!("[PANIC]{} {}", location, msg);
    }));
}
