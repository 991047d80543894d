//! Fusing a capture burst into one denoised image.
//!
//! The default mode blends frames pairwise into a running composite through a
//! constant gray mask. With the default mask value of 128 every step is a
//! near 50/50 mix, so later frames carry more weight than earlier ones.

use anyhow::{anyhow, Result};
use image::{GrayImage, Luma, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::capture::CaptureBurst;

/// Default mask level: the running composite keeps 128/255, the new frame adds 127/255.
pub const DEFAULT_MASK_VALUE: u8 = 128;

/// How a burst is reduced to a single image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeMode {
    /// Pairwise masked blend of each frame into the running composite.
    #[default]
    Sequential,
    /// Per-channel rounded average over all frames.
    Mean,
}

/// Constant-valued grayscale mask matching the capture dimensions.
pub struct BlendMask {
    mask: GrayImage,
}

impl BlendMask {
    pub fn new(width: u32, height: u32, value: u8) -> Self {
        Self {
            mask: GrayImage::from_pixel(width, height, Luma([value])),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    fn value_at(&self, x: u32, y: u32) -> u8 {
        self.mask.get_pixel(x, y)[0]
    }
}

/// Rounded `a / 255` for `a` in `0..=255*255`.
#[inline]
fn div255(a: u32) -> u8 {
    let t = a + 128;
    (((t >> 8) + t) >> 8) as u8
}

/// Mixes one channel: `mask` is the weight of `running`, `255 - mask` the weight of `next`.
#[inline]
fn blend_channel(running: u8, next: u8, mask: u8) -> u8 {
    let m = mask as u32;
    div255(next as u32 * (255 - m) + running as u32 * m)
}

/// Blends `next` into `running` in place, pixel by pixel, through `mask`.
pub fn blend_into(running: &mut RgbaImage, next: &RgbaImage, mask: &BlendMask) -> Result<()> {
    if running.dimensions() != next.dimensions() || running.dimensions() != mask.dimensions() {
        return Err(anyhow!(
            "Cannot blend {:?} with {:?} through a {:?} mask",
            running.dimensions(),
            next.dimensions(),
            mask.dimensions()
        ));
    }

    for (x, y, pixel) in running.enumerate_pixels_mut() {
        let m = mask.value_at(x, y);
        let incoming = next.get_pixel(x, y);
        for c in 0..4 {
            pixel[c] = blend_channel(pixel[c], incoming[c], m);
        }
    }

    Ok(())
}

/// Reduces a burst to one image of the same dimensions.
///
/// A single-capture burst comes back unchanged in either mode.
pub fn composite_burst(
    burst: &CaptureBurst,
    mode: CompositeMode,
    mask_value: u8,
) -> Result<RgbaImage> {
    let mut composite = burst.first().clone();
    if burst.len() == 1 {
        return Ok(composite);
    }

    match mode {
        CompositeMode::Sequential => {
            let (w, h) = burst.dimensions();
            let mask = BlendMask::new(w, h, mask_value);
            for next in &burst.captures()[1..] {
                blend_into(&mut composite, next, &mask)?;
            }
        }
        CompositeMode::Mean => {
            let n = burst.len() as u32;
            let mut sums: Vec<u32> = composite.as_raw().iter().map(|&v| v as u32).collect();
            for next in &burst.captures()[1..] {
                for (sum, &v) in sums.iter_mut().zip(next.as_raw().iter()) {
                    *sum += v as u32;
                }
            }
            for (out, sum) in composite.iter_mut().zip(sums) {
                *out = ((sum + n / 2) / n) as u8;
            }
        }
    }

    Ok(composite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, v: u8) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([v, v, v, 255]))
    }

    /// Floating-point reference for one sequential step.
    fn reference_step(running: u8, next: u8) -> u8 {
        ((next as f64 * 127.0 + running as f64 * 128.0) / 255.0).round() as u8
    }

    #[test]
    fn test_single_capture_is_identity() {
        let img = RgbaImage::from_fn(5, 3, |x, y| Rgba([x as u8 * 40, y as u8 * 70, 9, 200]));
        let burst = CaptureBurst::new(vec![img.clone()]).unwrap();

        for mode in [CompositeMode::Sequential, CompositeMode::Mean] {
            let out = composite_burst(&burst, mode, DEFAULT_MASK_VALUE).unwrap();
            assert_eq!(out, img);
        }
    }

    #[test]
    fn test_output_dimensions_match_inputs() {
        for n in 1..=5 {
            let frames = (0..n).map(|i| solid(7, 11, i as u8 * 50)).collect();
            let burst = CaptureBurst::new(frames).unwrap();
            let out =
                composite_burst(&burst, CompositeMode::Sequential, DEFAULT_MASK_VALUE).unwrap();
            assert_eq!(out.dimensions(), (7, 11));
        }
    }

    #[test]
    fn test_two_frame_blend_weights() {
        let burst = CaptureBurst::new(vec![solid(2, 2, 200), solid(2, 2, 100)]).unwrap();
        let out = composite_burst(&burst, CompositeMode::Sequential, DEFAULT_MASK_VALUE).unwrap();

        assert_eq!(out.get_pixel(0, 0)[0], 150);
        assert_eq!(out.get_pixel(1, 1)[0], reference_step(200, 100));
        // Opaque alpha stays opaque
        assert_eq!(out.get_pixel(0, 0)[3], 255);
    }

    #[test]
    fn test_blend_is_sequential_not_averaged() {
        let burst =
            CaptureBurst::new(vec![solid(1, 1, 0), solid(1, 1, 255), solid(1, 1, 0)]).unwrap();
        let out = composite_burst(&burst, CompositeMode::Sequential, DEFAULT_MASK_VALUE).unwrap();

        // 0 -> 127 after the white frame, then 127 mixed with black
        assert_eq!(out.get_pixel(0, 0)[0], 64);
        // A true mean would give 85
        let mean = composite_burst(&burst, CompositeMode::Mean, DEFAULT_MASK_VALUE).unwrap();
        assert_eq!(mean.get_pixel(0, 0)[0], 85);
    }

    #[test]
    fn test_blend_channel_matches_reference() {
        for running in (0..=255u16).step_by(17) {
            for next in (0..=255u16).step_by(15) {
                assert_eq!(
                    blend_channel(running as u8, next as u8, DEFAULT_MASK_VALUE),
                    reference_step(running as u8, next as u8),
                    "running={} next={}",
                    running,
                    next
                );
            }
        }
    }

    #[test]
    fn test_mask_extremes() {
        assert_eq!(blend_channel(10, 250, 255), 10);
        assert_eq!(blend_channel(10, 250, 0), 250);
    }

    #[test]
    fn test_composite_is_deterministic() {
        let frames: Vec<RgbaImage> = (0..4)
            .map(|i| {
                RgbaImage::from_fn(6, 6, |x, y| {
                    Rgba([(x * 40 + i * 7) as u8, (y * 30) as u8, (i * 60) as u8, 255])
                })
            })
            .collect();
        let burst = CaptureBurst::new(frames).unwrap();

        let a = composite_burst(&burst, CompositeMode::Sequential, DEFAULT_MASK_VALUE).unwrap();
        let b = composite_burst(&burst, CompositeMode::Sequential, DEFAULT_MASK_VALUE).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_blend_into_rejects_mismatched_sizes() {
        let mut running = solid(2, 2, 0);
        let next = solid(3, 2, 0);
        let mask = BlendMask::new(2, 2, DEFAULT_MASK_VALUE);
        assert!(blend_into(&mut running, &next, &mask).is_err());
    }

    #[test]
    fn test_mode_deserializes_from_snake_case() {
        let mode: CompositeMode = serde_json::from_str("\"mean\"").unwrap();
        assert_eq!(mode, CompositeMode::Mean);
        assert_eq!(CompositeMode::default(), CompositeMode::Sequential);
    }
}
