//! Burst capture: N screenshots taken at a fixed spacing.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use tracing::debug;

use super::display::DisplayRect;
use super::screenshot::{Capture, ScreenGrabber};
use crate::clock::Clock;

/// Ordered, non-empty sequence of captures sharing identical dimensions.
#[derive(Clone, Debug)]
pub struct CaptureBurst {
    captures: Vec<Capture>,
}

impl CaptureBurst {
    /// Builds a burst, rejecting empty input and mismatched dimensions.
    pub fn new(captures: Vec<Capture>) -> Result<Self> {
        let first = captures
            .first()
            .ok_or_else(|| anyhow!("A capture burst needs at least one capture"))?;
        let expected = first.dimensions();

        for (i, capture) in captures.iter().enumerate().skip(1) {
            if capture.dimensions() != expected {
                return Err(anyhow!(
                    "Capture {} is {:?}, expected {:?} like the rest of the burst",
                    i,
                    capture.dimensions(),
                    expected
                ));
            }
        }

        Ok(Self { captures })
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    /// Shared `(width, height)` of every capture in the burst.
    pub fn dimensions(&self) -> (u32, u32) {
        self.captures[0].dimensions()
    }

    pub fn first(&self) -> &Capture {
        &self.captures[0]
    }

    pub fn captures(&self) -> &[Capture] {
        &self.captures
    }
}

/// Takes `count` captures of `display`, pausing `delay` after each one.
///
/// Captures are returned in the order they were taken. Any grab failure or a
/// capture whose size differs from the display rectangle aborts the burst.
pub fn capture_burst<G, C>(
    grabber: &mut G,
    display: &DisplayRect,
    count: usize,
    delay: Duration,
    clock: &C,
) -> Result<CaptureBurst>
where
    G: ScreenGrabber + ?Sized,
    C: Clock + ?Sized,
{
    if count == 0 {
        return Err(anyhow!("Burst size must be at least 1"));
    }

    let mut captures = Vec::with_capacity(count);
    for i in 0..count {
        let capture = grabber
            .grab(display)
            .with_context(|| format!("Failed to take capture {}/{}", i + 1, count))?;

        if capture.dimensions() != display.dimensions() {
            return Err(anyhow!(
                "Capture {}/{} is {:?} but the display is {:?}",
                i + 1,
                count,
                capture.dimensions(),
                display.dimensions()
            ));
        }

        debug!("Took capture {}/{}", i + 1, count);
        captures.push(capture);
        clock.sleep(delay);
    }

    CaptureBurst::new(captures)
}
