//! Screen capture of the primary display.
//!
//! This module provides:
//! - Display geometry discovery (`primary_display`)
//! - Single screenshots (`ScreenGrabber`, `MonitorGrabber`)
//! - Burst capture (`capture_burst`)

pub mod display;
pub mod screenshot;
pub mod sequencer;

pub use display::{primary_display, DisplayRect};
pub use screenshot::{MonitorGrabber, ScreenGrabber};
pub use sequencer::{capture_burst, CaptureBurst};
