//! GDI screen capture for Windows.
//!
//! The screen DC is blitted into a compatible bitmap and read back as a
//! 24-bit top-down DIB. Bitmap and memory DC are kept across frames and
//! recreated when the capture region changes size.

use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;

use windows::Win32::Foundation::{BOOL, LPARAM, RECT};
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject,
    EnumDisplayMonitors, GetDC, GetDIBits, GetMonitorInfoW, ReleaseDC, SelectObject, BITMAPINFO,
    BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HBITMAP, HDC, HGDIOBJ, HMONITOR, MONITORINFOEXW,
    SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetSystemMetrics, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN, SM_XVIRTUALSCREEN,
    SM_YVIRTUALSCREEN,
};

use super::convert::{normalize_into, SourceLayout};
use super::errors::CaptureError;
use super::monitors::{CaptureRegion, MonitorDescriptor, MonitorLayout, MonitorSelector};
use super::ScreenCapture;
use crate::frame::{CaptureFrame, Geometry};

const MONITORINFOF_PRIMARY: u32 = 1;

/// GDI objects sized for one capture region.
struct Surface {
    mem_dc: HDC,
    bitmap: HBITMAP,
    old_bitmap: HGDIOBJ,
    width: u32,
    height: u32,
}

/// Screen capture through the Windows GDI.
pub struct GdiCapture {
    screen_dc: Option<HDC>,
    surface: Option<Surface>,
    layout: MonitorLayout,
    pixels: Vec<u8>,
}

// GDI handles are plain values; the capture thread is their only user once
// the provider has been moved there.
unsafe impl Send for GdiCapture {}

impl std::fmt::Debug for GdiCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GdiCapture")
            .field("initialized", &self.screen_dc.is_some())
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl Default for GdiCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// Row stride of a 24-bit DIB: rows are padded to 4 bytes.
fn dib_stride(width: u32) -> usize {
    (width as usize * 3 + 3) & !3
}

impl GdiCapture {
    pub fn new() -> Self {
        Self {
            screen_dc: None,
            surface: None,
            layout: MonitorLayout::default(),
            pixels: Vec::new(),
        }
    }

    fn release_surface(&mut self) {
        if let Some(surface) = self.surface.take() {
            unsafe {
                SelectObject(surface.mem_dc, surface.old_bitmap);
                let _ = DeleteObject(surface.bitmap);
                let _ = DeleteDC(surface.mem_dc);
            }
        }
    }

    /// Make sure the memory DC and bitmap match the current region.
    fn ensure_surface(&mut self, screen_dc: HDC) -> Result<(), CaptureError> {
        let region = self.layout.region();
        if let Some(surface) = &self.surface {
            if surface.width == region.width && surface.height == region.height {
                return Ok(());
            }
        }
        self.release_surface();

        unsafe {
            let mem_dc = CreateCompatibleDC(screen_dc);
            if mem_dc.is_invalid() {
                return Err(CaptureError::AcquireFailed(
                    "CreateCompatibleDC failed".to_string(),
                ));
            }
            let bitmap =
                CreateCompatibleBitmap(screen_dc, region.width as i32, region.height as i32);
            if bitmap.is_invalid() {
                let _ = DeleteDC(mem_dc);
                return Err(CaptureError::AcquireFailed(format!(
                    "CreateCompatibleBitmap failed for {}",
                    region.geometry()
                )));
            }
            let old_bitmap = SelectObject(mem_dc, bitmap);
            self.surface = Some(Surface {
                mem_dc,
                bitmap,
                old_bitmap,
                width: region.width,
                height: region.height,
            });
        }

        self.pixels = vec![0; dib_stride(region.width) * region.height as usize];
        Ok(())
    }
}

fn desktop_region() -> CaptureRegion {
    unsafe {
        CaptureRegion {
            origin_x: GetSystemMetrics(SM_XVIRTUALSCREEN),
            origin_y: GetSystemMetrics(SM_YVIRTUALSCREEN),
            width: GetSystemMetrics(SM_CXVIRTUALSCREEN).max(0) as u32,
            height: GetSystemMetrics(SM_CYVIRTUALSCREEN).max(0) as u32,
        }
    }
}

fn list_monitors() -> Vec<MonitorDescriptor> {
    let mut monitors: Vec<MonitorDescriptor> = Vec::new();
    unsafe {
        let _ = EnumDisplayMonitors(
            HDC::default(),
            None,
            Some(enum_monitor_callback),
            LPARAM(&mut monitors as *mut Vec<MonitorDescriptor> as isize),
        );
    }
    monitors
}

unsafe extern "system" fn enum_monitor_callback(
    hmonitor: HMONITOR,
    _hdc: HDC,
    _rect: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    let monitors = &mut *(lparam.0 as *mut Vec<MonitorDescriptor>);

    let mut info = MONITORINFOEXW::default();
    info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;

    if GetMonitorInfoW(hmonitor, &mut info as *mut _ as *mut _).as_bool() {
        let rect = info.monitorInfo.rcMonitor;
        let name_len = info
            .szDevice
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(info.szDevice.len());
        let label = OsString::from_wide(&info.szDevice[..name_len])
            .to_string_lossy()
            .into_owned();

        monitors.push(MonitorDescriptor {
            id: monitors.len() as u32,
            label,
            origin_x: rect.left,
            origin_y: rect.top,
            width: (rect.right - rect.left).max(0) as u32,
            height: (rect.bottom - rect.top).max(0) as u32,
            is_primary: info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY != 0,
        });
    }

    BOOL(1)
}

impl ScreenCapture for GdiCapture {
    fn name(&self) -> &'static str {
        "gdi"
    }

    fn initialize(&mut self) -> Result<Geometry, CaptureError> {
        log::info!("Initializing GDI screen capture...");
        self.shutdown();

        let screen_dc = unsafe { GetDC(None) };
        if screen_dc.is_invalid() {
            return Err(CaptureError::PlatformUnavailable(
                "failed to get screen DC".to_string(),
            ));
        }

        let monitors = list_monitors();
        let desktop = desktop_region();
        log::info!(
            "Screen capture initialized: {} ({} monitor(s))",
            desktop.geometry(),
            monitors.len()
        );
        self.layout = MonitorLayout::new(monitors, Some(desktop));
        self.screen_dc = Some(screen_dc);

        if let Err(e) = self.ensure_surface(screen_dc) {
            self.shutdown();
            return Err(CaptureError::PlatformUnavailable(e.to_string()));
        }
        Ok(desktop.geometry())
    }

    fn capture_frame(&mut self, frame: &mut CaptureFrame) -> Result<(), CaptureError> {
        let screen_dc = self.screen_dc.ok_or(CaptureError::NotInitialized)?;
        self.ensure_surface(screen_dc)?;
        let region = self.layout.region();
        let surface = self.surface.as_ref().ok_or(CaptureError::NotInitialized)?;

        unsafe {
            BitBlt(
                surface.mem_dc,
                0,
                0,
                region.width as i32,
                region.height as i32,
                screen_dc,
                region.origin_x,
                region.origin_y,
                SRCCOPY,
            )
            .map_err(|e| CaptureError::AcquireFailed(format!("BitBlt failed: {}", e)))?;

            let mut bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: region.width as i32,
                    // Negative height: top-down rows
                    biHeight: -(region.height as i32),
                    biPlanes: 1,
                    biBitCount: 24,
                    biCompression: BI_RGB.0,
                    biSizeImage: 0,
                    biXPelsPerMeter: 0,
                    biYPelsPerMeter: 0,
                    biClrUsed: 0,
                    biClrImportant: 0,
                },
                bmiColors: [Default::default()],
            };

            let lines = GetDIBits(
                surface.mem_dc,
                surface.bitmap,
                0,
                region.height,
                Some(self.pixels.as_mut_ptr() as *mut _),
                &mut bmi,
                DIB_RGB_COLORS,
            );
            if lines <= 0 {
                return Err(CaptureError::AcquireFailed("GetDIBits failed".to_string()));
            }
        }

        let layout = SourceLayout::bgr24(region.width).with_stride(dib_stride(region.width));
        normalize_into(&self.pixels, &layout, region.width, region.height, frame)
    }

    fn enumerate_monitors(&self) -> Vec<MonitorDescriptor> {
        self.layout.monitors()
    }

    fn select_monitor(&mut self, selector: MonitorSelector) -> Result<(), CaptureError> {
        let screen_dc = self.screen_dc.ok_or(CaptureError::NotInitialized)?;
        let previous = self.layout.selected();
        let region = self.layout.select(selector)?;
        if let Err(e) = self.ensure_surface(screen_dc) {
            let _ = self.layout.select(previous);
            return Err(e);
        }
        log::info!("Capturing {}: {}", selector, region.geometry());
        Ok(())
    }

    fn current_monitor(&self) -> MonitorSelector {
        self.layout.selected()
    }

    fn region(&self) -> CaptureRegion {
        self.layout.region()
    }

    fn shutdown(&mut self) {
        self.release_surface();
        if let Some(screen_dc) = self.screen_dc.take() {
            unsafe {
                ReleaseDC(None, screen_dc);
            }
            log::info!("Shutting down GDI screen capture");
        }
        self.pixels = Vec::new();
    }
}

impl Drop for GdiCapture {
    fn drop(&mut self) {
        self.shutdown();
    }
}
