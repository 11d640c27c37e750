//! X11 screen capture.
//!
//! Frames are fetched with `GetImage` on the root window. Outputs are
//! enumerated through RandR; disconnected outputs and outputs without an
//! active CRTC are skipped.

use std::error::Error;

use x11rb::connection::Connection;
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{ConnectionExt as _, ImageFormat, ImageOrder, Window};
use x11rb::rust_connection::RustConnection;

use super::convert::{normalize_into, ByteOrder, SourceLayout};
use super::errors::CaptureError;
use super::monitors::{CaptureRegion, MonitorDescriptor, MonitorLayout, MonitorSelector};
use super::ScreenCapture;
use crate::frame::{CaptureFrame, Geometry};

/// Depth, bits per pixel, and scanline pad of one server pixmap format.
#[derive(Debug, Clone, Copy)]
struct PixmapFormat {
    depth: u8,
    bits_per_pixel: u8,
    scanline_pad: u8,
}

/// Screen capture through an X server connection.
pub struct X11Capture {
    conn: Option<RustConnection>,
    root: Window,
    formats: Vec<PixmapFormat>,
    byte_order: ByteOrder,
    masks: (u32, u32, u32),
    layout: MonitorLayout,
}

impl std::fmt::Debug for X11Capture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X11Capture")
            .field("connected", &self.conn.is_some())
            .field("root", &self.root)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl Default for X11Capture {
    fn default() -> Self {
        Self::new()
    }
}

impl X11Capture {
    pub fn new() -> Self {
        Self {
            conn: None,
            root: 0,
            formats: Vec::new(),
            byte_order: ByteOrder::LsbFirst,
            masks: (0x00ff_0000, 0x0000_ff00, 0x0000_00ff),
            layout: MonitorLayout::default(),
        }
    }

    fn source_layout(&self, depth: u8, width: u32) -> Result<SourceLayout, CaptureError> {
        let format = self
            .formats
            .iter()
            .find(|f| f.depth == depth)
            .ok_or_else(|| {
                CaptureError::AcquireFailed(format!("no pixmap format for depth {}", depth))
            })?;
        let pad = format.scanline_pad.max(8) as usize;
        let row_bits = width as usize * format.bits_per_pixel as usize;
        let stride = row_bits.div_ceil(pad) * pad / 8;
        Ok(SourceLayout {
            bits_per_pixel: format.bits_per_pixel,
            stride,
            byte_order: self.byte_order,
            red_mask: self.masks.0,
            green_mask: self.masks.1,
            blue_mask: self.masks.2,
        })
    }
}

fn query_monitors(
    conn: &RustConnection,
    root: Window,
) -> Result<Vec<MonitorDescriptor>, Box<dyn Error>> {
    conn.randr_query_version(1, 3)?.reply()?;
    let primary = conn
        .randr_get_output_primary(root)?
        .reply()
        .map(|r| r.output)
        .unwrap_or(0);
    let resources = conn.randr_get_screen_resources_current(root)?.reply()?;

    let mut monitors = Vec::new();
    for &output in &resources.outputs {
        let info = conn
            .randr_get_output_info(output, resources.config_timestamp)?
            .reply()?;
        if info.connection != randr::Connection::CONNECTED || info.crtc == 0 {
            continue;
        }
        let crtc = conn
            .randr_get_crtc_info(info.crtc, resources.config_timestamp)?
            .reply()?;
        if crtc.width == 0 || crtc.height == 0 {
            continue;
        }
        monitors.push(MonitorDescriptor {
            id: monitors.len() as u32,
            label: String::from_utf8_lossy(&info.name).into_owned(),
            origin_x: crtc.x as i32,
            origin_y: crtc.y as i32,
            width: crtc.width as u32,
            height: crtc.height as u32,
            is_primary: output == primary,
        });
    }
    Ok(monitors)
}

impl ScreenCapture for X11Capture {
    fn name(&self) -> &'static str {
        "x11"
    }

    fn initialize(&mut self) -> Result<Geometry, CaptureError> {
        log::info!("Initializing X11 screen capture...");
        let (conn, screen_num) = x11rb::connect(None)
            .map_err(|e| CaptureError::PlatformUnavailable(format!("cannot open X display: {}", e)))?;

        let setup = conn.setup();
        let screen = setup.roots.get(screen_num).ok_or_else(|| {
            CaptureError::PlatformUnavailable(format!("X screen {} does not exist", screen_num))
        })?;
        let root = screen.root;
        let desktop = CaptureRegion {
            origin_x: 0,
            origin_y: 0,
            width: screen.width_in_pixels as u32,
            height: screen.height_in_pixels as u32,
        };
        let masks = screen
            .allowed_depths
            .iter()
            .flat_map(|d| d.visuals.iter())
            .find(|v| v.visual_id == screen.root_visual)
            .map(|v| (v.red_mask, v.green_mask, v.blue_mask))
            .unwrap_or(self.masks);
        self.formats = setup
            .pixmap_formats
            .iter()
            .map(|f| PixmapFormat {
                depth: f.depth,
                bits_per_pixel: f.bits_per_pixel,
                scanline_pad: f.scanline_pad,
            })
            .collect();
        self.byte_order = if setup.image_byte_order == ImageOrder::MSB_FIRST {
            ByteOrder::MsbFirst
        } else {
            ByteOrder::LsbFirst
        };
        self.masks = masks;

        let monitors = query_monitors(&conn, root).unwrap_or_else(|e| {
            log::warn!("RandR monitor enumeration failed, using whole screen only: {}", e);
            Vec::new()
        });

        log::info!(
            "Screen capture initialized: {} ({} monitor(s))",
            desktop.geometry(),
            monitors.len()
        );
        self.layout = MonitorLayout::new(monitors, Some(desktop));
        self.root = root;
        self.conn = Some(conn);
        Ok(desktop.geometry())
    }

    fn capture_frame(&mut self, frame: &mut CaptureFrame) -> Result<(), CaptureError> {
        let conn = self.conn.as_ref().ok_or(CaptureError::NotInitialized)?;
        let region = self.layout.region();

        let reply = conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                self.root,
                region.origin_x as i16,
                region.origin_y as i16,
                region.width as u16,
                region.height as u16,
                !0,
            )
            .map_err(|e| CaptureError::AcquireFailed(format!("GetImage request failed: {}", e)))?
            .reply()
            .map_err(|e| CaptureError::AcquireFailed(format!("GetImage failed: {}", e)))?;

        let layout = self.source_layout(reply.depth, region.width)?;
        normalize_into(&reply.data, &layout, region.width, region.height, frame)
    }

    fn enumerate_monitors(&self) -> Vec<MonitorDescriptor> {
        self.layout.monitors()
    }

    fn select_monitor(&mut self, selector: MonitorSelector) -> Result<(), CaptureError> {
        if self.conn.is_none() {
            return Err(CaptureError::NotInitialized);
        }
        let region = self.layout.select(selector)?;
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
        if self.conn.take().is_some() {
            log::info!("Shutting down X11 screen capture");
        }
    }
}

impl Drop for X11Capture {
    fn drop(&mut self) {
        self.shutdown();
    }
}
