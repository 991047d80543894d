//! Screen capture of the primary display.
//!
//! On Windows this uses the Windows Graphics Capture API against the primary
//! monitor. Other platforms get a grabber that always fails, which keeps the
//! pipeline buildable and testable everywhere.

use anyhow::Result;
use image::RgbaImage;

use super::display::DisplayRect;

/// A single raw screen image.
pub type Capture = RgbaImage;

/// Something that can take one screenshot of a display rectangle.
pub trait ScreenGrabber {
    /// Captures the given display. The returned image must be
    /// `display.width` x `display.height`.
    fn grab(&mut self, display: &DisplayRect) -> Result<Capture>;
}

#[cfg(windows)]
pub use self::wgc::MonitorGrabber;

#[cfg(not(windows))]
pub use self::unsupported::MonitorGrabber;

#[cfg(windows)]
mod wgc {
    use anyhow::{anyhow, Context, Result};
    use image::RgbaImage;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tracing::{debug, trace};

    use windows::core::Interface;
    use windows::Foundation::TypedEventHandler;
    use windows::Graphics::Capture::{
        Direct3D11CaptureFramePool, GraphicsCaptureItem, GraphicsCaptureSession,
    };
    use windows::Graphics::DirectX::Direct3D11::IDirect3DDevice;
    use windows::Graphics::DirectX::DirectXPixelFormat;
    use windows::Win32::Foundation::POINT;
    use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
    use windows::Win32::Graphics::Direct3D11::{
        D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Resource, ID3D11Texture2D,
        D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAP_READ,
        D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
    };
    use windows::Win32::Graphics::Dxgi::IDXGIDevice;
    use windows::Win32::Graphics::Gdi::{HMONITOR, MonitorFromPoint, MONITOR_DEFAULTTOPRIMARY};
    use windows::Win32::System::WinRT::Direct3D11::{
        CreateDirect3D11DeviceFromDXGIDevice, IDirect3DDxgiInterfaceAccess,
    };
    use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;

    use super::{Capture, ScreenGrabber};
    use crate::capture::display::DisplayRect;

    /// Maximum time to wait for the first frame of a capture session.
    const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

    /// Captures the primary monitor through Windows Graphics Capture.
    ///
    /// The D3D11 device is created once and reused for every grab; the
    /// capture session itself is opened per frame.
    pub struct MonitorGrabber {
        device: ID3D11Device,
        context: ID3D11DeviceContext,
        d3d_device: IDirect3DDevice,
    }

    impl MonitorGrabber {
        pub fn new() -> Result<Self> {
            let (device, context) = create_d3d11_device()?;
            let d3d_device = create_direct3d_device(&device)?;
            debug!("D3D11 device created for monitor capture");
            Ok(Self {
                device,
                context,
                d3d_device,
            })
        }
    }

    impl ScreenGrabber for MonitorGrabber {
        fn grab(&mut self, display: &DisplayRect) -> Result<Capture> {
            let monitor =
                unsafe { MonitorFromPoint(POINT { x: 0, y: 0 }, MONITOR_DEFAULTTOPRIMARY) };
            let item = create_capture_item(monitor)?;
            let size = item.Size()?;
            trace!("Capture item size: {}x{}", size.Width, size.Height);

            let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
                &self.d3d_device,
                DirectXPixelFormat::B8G8R8A8UIntNormalized,
                1,
                size,
            )?;
            let session = frame_pool.CreateCaptureSession(&item)?;
            hide_capture_overlays(&session)?;

            let frame_arrived = Arc::new(AtomicBool::new(false));
            let frame_arrived_clone = frame_arrived.clone();
            frame_pool.FrameArrived(&TypedEventHandler::new(
                move |_pool: &Option<Direct3D11CaptureFramePool>, _| {
                    frame_arrived_clone.store(true, Ordering::SeqCst);
                    Ok(())
                },
            ))?;

            session.StartCapture()?;

            let start = Instant::now();
            while !frame_arrived.load(Ordering::SeqCst) {
                if start.elapsed() > FRAME_TIMEOUT {
                    let _ = session.Close();
                    let _ = frame_pool.Close();
                    return Err(anyhow!("Timeout waiting for monitor frame"));
                }
                std::thread::sleep(Duration::from_millis(10));
            }

            let frame = frame_pool.TryGetNextFrame()?;
            let surface = frame.Surface()?;
            let access: IDirect3DDxgiInterfaceAccess = surface.cast()?;
            let texture: ID3D11Texture2D = unsafe { access.GetInterface()? };

            let img = self.read_texture(&texture, display)?;

            session.Close()?;
            frame_pool.Close()?;

            Ok(img)
        }
    }

    /// Keeps the mouse pointer and the capture border out of the frame.
    ///
    /// The border toggle only exists on Windows 11 and later; older systems
    /// reject it and draw no border anyway.
    fn hide_capture_overlays(session: &GraphicsCaptureSession) -> Result<()> {
        session
            .SetIsCursorCaptureEnabled(false)
            .context("Failed to disable cursor capture")?;
        if let Err(e) = session.SetIsBorderRequired(false) {
            trace!("Capture border cannot be disabled: {}", e);
        }
        Ok(())
    }

    impl MonitorGrabber {
        /// Copies the GPU texture to a staging texture and converts it into an
        /// RGBA image cropped to the display size.
        fn read_texture(
            &self,
            texture: &ID3D11Texture2D,
            display: &DisplayRect,
        ) -> Result<RgbaImage> {
            let mut desc = D3D11_TEXTURE2D_DESC::default();
            unsafe { texture.GetDesc(&mut desc) };

            let staging_desc = D3D11_TEXTURE2D_DESC {
                Width: desc.Width,
                Height: desc.Height,
                MipLevels: 1,
                ArraySize: 1,
                Format: desc.Format,
                SampleDesc: desc.SampleDesc,
                Usage: D3D11_USAGE_STAGING,
                BindFlags: Default::default(),
                CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
                MiscFlags: Default::default(),
            };

            let staging_texture = unsafe {
                let mut staging: Option<ID3D11Texture2D> = None;
                self.device
                    .CreateTexture2D(&staging_desc, None, Some(&mut staging))?;
                staging.ok_or_else(|| anyhow!("Failed to create staging texture"))?
            };

            let staging_resource = staging_texture.cast::<ID3D11Resource>()?;
            unsafe {
                self.context
                    .CopyResource(&staging_resource, &texture.cast::<ID3D11Resource>()?);
            }

            let mapped = unsafe {
                let mut mapped = Default::default();
                self.context
                    .Map(&staging_resource, 0, D3D11_MAP_READ, 0, Some(&mut mapped))?;
                mapped
            };

            let width = display.width.min(desc.Width);
            let height = display.height.min(desc.Height);
            let row_pitch = mapped.RowPitch as usize;
            let src_data = unsafe {
                std::slice::from_raw_parts(
                    mapped.pData as *const u8,
                    row_pitch * desc.Height as usize,
                )
            };

            let mut rgba = Vec::with_capacity((width * height * 4) as usize);
            for y in 0..height as usize {
                let row = &src_data[y * row_pitch..y * row_pitch + width as usize * 4];
                for bgra in row.chunks_exact(4) {
                    rgba.extend_from_slice(&[bgra[2], bgra[1], bgra[0], bgra[3]]);
                }
            }

            unsafe {
                self.context.Unmap(&staging_resource, 0);
            }

            RgbaImage::from_raw(width, height, rgba)
                .ok_or_else(|| anyhow!("Captured buffer does not match {}x{}", width, height))
        }
    }

    fn create_d3d11_device() -> Result<(ID3D11Device, ID3D11DeviceContext)> {
        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;

        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                None,
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )?;
        }

        Ok((
            device.ok_or_else(|| anyhow!("Failed to create D3D11 device"))?,
            context.ok_or_else(|| anyhow!("Failed to create D3D11 context"))?,
        ))
    }

    /// Wraps the D3D11 device in the WinRT interface the capture API expects.
    fn create_direct3d_device(device: &ID3D11Device) -> Result<IDirect3DDevice> {
        let dxgi_device: IDXGIDevice = device.cast()?;
        let inspectable = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi_device)? };
        inspectable
            .cast()
            .context("Failed to cast to IDirect3DDevice")
    }

    fn create_capture_item(monitor: HMONITOR) -> Result<GraphicsCaptureItem> {
        let class_name = windows::core::h!("Windows.Graphics.Capture.GraphicsCaptureItem");
        let interop: IGraphicsCaptureItemInterop = unsafe {
            windows::Win32::System::WinRT::RoGetActivationFactory(class_name)
                .context("Failed to get IGraphicsCaptureItemInterop")?
        };
        unsafe {
            interop
                .CreateForMonitor(monitor)
                .context("Failed to create capture item for primary monitor")
        }
    }
}

#[cfg(not(windows))]
mod unsupported {
    use anyhow::{anyhow, Result};

    use super::{Capture, ScreenGrabber};
    use crate::capture::display::DisplayRect;

    /// Placeholder grabber for platforms without a capture backend.
    pub struct MonitorGrabber;

    impl MonitorGrabber {
        pub fn new() -> Result<Self> {
            Ok(Self)
        }
    }

    impl ScreenGrabber for MonitorGrabber {
        fn grab(&mut self, display: &DisplayRect) -> Result<Capture> {
            Err(anyhow!(
                "Screen capture of {} is only supported on Windows",
                display
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn test_grab_fails_off_windows() {
        let mut grabber = MonitorGrabber::new().unwrap();
        let err = grabber.grab(&DisplayRect::new(0, 0, 8, 8)).unwrap_err();
        assert!(err.to_string().contains("only supported on Windows"));
    }

    #[cfg(windows)]
    #[test]
    #[ignore = "needs an interactive desktop session"]
    fn test_repeated_grabs_match_primary_display() {
        use crate::capture::display::primary_display;

        let _ = unsafe {
            windows::Win32::System::WinRT::RoInitialize(
                windows::Win32::System::WinRT::RO_INIT_MULTITHREADED,
            )
        };
        let screen = primary_display().unwrap();
        let mut grabber = MonitorGrabber::new().unwrap();

        // Each grab opens its own session with cursor and border hidden
        for _ in 0..2 {
            let capture = grabber.grab(&screen).unwrap();
            assert_eq!(capture.dimensions(), screen.dimensions());
        }
    }
}
