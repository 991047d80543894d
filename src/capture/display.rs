//! Primary display geometry discovery.

use anyhow::Result;

/// Bounding rectangle of a display in virtual-desktop coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayRect {
    /// Left edge (may be negative on multi-monitor setups)
    pub x: i32,
    /// Top edge (may be negative on multi-monitor setups)
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl DisplayRect {
    #[cfg(any(windows, test))]
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns `(left, top, right, bottom)`.
    pub fn bbox(&self) -> (i32, i32, i32, i32) {
        (
            self.x,
            self.y,
            self.x + self.width as i32,
            self.y + self.height as i32,
        )
    }

    /// Returns `(width, height)`, matching `image::ImageBuffer::dimensions`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl std::fmt::Display for DisplayRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} at ({}, {})", self.width, self.height, self.x, self.y)
    }
}

/// Returns the primary monitor's rectangle.
///
/// Marks the process per-monitor DPI aware first so the rectangle is reported
/// in physical pixels, matching what the capture API hands back.
#[cfg(windows)]
pub fn primary_display() -> Result<DisplayRect> {
    use anyhow::anyhow;
    use windows::Win32::Foundation::POINT;
    use windows::Win32::Graphics::Gdi::{
        GetMonitorInfoW, MonitorFromPoint, MONITORINFO, MONITOR_DEFAULTTOPRIMARY,
    };
    use windows::Win32::UI::HiDpi::{
        SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
    };

    // Fails harmlessly if awareness was already set (e.g. by a manifest)
    let _ = unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) };

    let monitor = unsafe { MonitorFromPoint(POINT { x: 0, y: 0 }, MONITOR_DEFAULTTOPRIMARY) };
    if monitor.0.is_null() {
        return Err(anyhow!("No primary monitor found"));
    }

    let mut info = MONITORINFO {
        cbSize: std::mem::size_of::<MONITORINFO>() as u32,
        ..Default::default()
    };
    unsafe {
        if !GetMonitorInfoW(monitor, &mut info).as_bool() {
            return Err(anyhow!("GetMonitorInfoW failed for primary monitor"));
        }
    }

    let rc = info.rcMonitor;
    let rect = DisplayRect::new(
        rc.left,
        rc.top,
        (rc.right - rc.left) as u32,
        (rc.bottom - rc.top) as u32,
    );
    tracing::debug!("Primary monitor rectangle: {}", rect);
    Ok(rect)
}

#[cfg(not(windows))]
pub fn primary_display() -> Result<DisplayRect> {
    Err(anyhow::anyhow!(
        "Primary display discovery is only supported on Windows"
    ))
}
