//! Capture agent.
//!
//! This module provides:
//! - Configuration loading and command-line overrides (`AgentConfig`)
//! - The poll loop and per-cycle pipeline (`Agent`)
//! - Signal-driven graceful shutdown (`ShutdownToken`)

pub mod config;
pub mod runner;
pub mod shutdown;

pub use config::{load_config, AgentConfig, ConfigOverrides};
pub use runner::{Agent, CycleSettings};
pub use shutdown::{install_signal_handler, ShutdownToken};
