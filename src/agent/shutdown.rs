//! Cooperative shutdown for the poll loop.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Cloneable stop flag shared between the signal handler and the poll loop.
///
/// The loop reads it once per iteration, so a stop request never interrupts
/// a burst or an upload in progress.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    running: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Idempotent.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes SIGINT/SIGTERM (Ctrl+C / console close on Windows) to `token`.
///
/// Can only be installed once per process.
pub fn install_signal_handler(token: &ShutdownToken) -> Result<()> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        info!("Exit signal detected!");
        token.request_stop();
    })
    .context("Failed to install termination signal handler")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_running() {
        assert!(ShutdownToken::new().is_running());
    }

    #[test]
    fn test_stop_is_shared_between_clones() {
        let token = ShutdownToken::new();
        let handle = token.clone();

        handle.request_stop();
        assert!(!token.is_running());

        // Repeated requests are harmless
        handle.request_stop();
        assert!(!token.is_running());
    }
}
