//! Detection regions and their calibration to the display.

use anyhow::{anyhow, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::capture::DisplayRect;

/// A rectangle in relative coordinates (0.0 to 1.0).
/// Used for defining screen regions that scale with display size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    /// X position of top-left corner (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Y position of top-left corner (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
    /// Width as fraction of display width
    pub width: f32,
    /// Height as fraction of display height
    pub height: f32,
}

/// A rectangle in absolute pixels relative to the captured image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Crops this rectangle out of a full-display capture, clamped to its bounds.
    pub fn crop(&self, img: &RgbaImage) -> RgbaImage {
        let (w, h) = img.dimensions();
        let x = self.x.min(w);
        let y = self.y.min(h);
        let width = self.width.min(w - x);
        let height = self.height.min(h - y);
        image::imageops::crop_imm(img, x, y, width, height).to_image()
    }
}

impl RelativeRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Converts to pixels for a `width` x `height` display, clamped to its bounds.
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let clamp = |v: f32| v.clamp(0.0, 1.0);

        let x = ((clamp(self.x) * width as f32) as u32).min(width);
        let y = ((clamp(self.y) * height as f32) as u32).min(height);
        let w = ((clamp(self.width) * width as f32) as u32).min(width - x);
        let h = ((clamp(self.height) * height as f32) as u32).min(height - y);

        PixelRect {
            x,
            y,
            width: w,
            height: h,
        }
    }
}

/// Named detection regions after scaling to the display.
#[derive(Clone, Debug, Default)]
pub struct ScaledRegions {
    regions: BTreeMap<String, PixelRect>,
}

impl ScaledRegions {
    pub fn get(&self, name: &str) -> Result<PixelRect> {
        self.regions
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("Unknown detection region \"{}\"", name))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }
}

/// Scales every named region to the display. Called once at startup.
pub fn scale_regions(
    regions: &BTreeMap<String, RelativeRect>,
    display: &DisplayRect,
) -> ScaledRegions {
    let regions = regions
        .iter()
        .map(|(name, rect)| {
            let px = rect.to_pixels(display.width, display.height);
            tracing::debug!(
                "Region {}: {}x{} at ({}, {})",
                name,
                px.width,
                px.height,
                px.x,
                px.y
            );
            (name.clone(), px)
        })
        .collect();

    ScaledRegions { regions }
}
