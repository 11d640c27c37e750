//! Synthetic capture backend.
//!
//! Renders a moving gradient in virtual-desktop coordinates instead of reading
//! a real display. Used for headless runs and for exercising the pipeline in
//! tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::errors::CaptureError;
use super::monitors::{CaptureRegion, MonitorDescriptor, MonitorLayout, MonitorSelector};
use super::ScreenCapture;
use crate::frame::{CaptureFrame, Geometry};

/// A provider that draws a test pattern.
#[derive(Debug)]
pub struct SyntheticCapture {
    monitors: Vec<MonitorDescriptor>,
    layout: Option<MonitorLayout>,
    tick: u32,
    failing: Arc<AtomicBool>,
}

impl Default for SyntheticCapture {
    /// A single 640x480 monitor.
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl SyntheticCapture {
    /// A single primary monitor of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_monitors(vec![MonitorDescriptor {
            id: 0,
            label: "Synthetic-0".to_string(),
            origin_x: 0,
            origin_y: 0,
            width,
            height,
            is_primary: true,
        }])
    }

    /// An arbitrary monitor arrangement.
    pub fn with_monitors(monitors: Vec<MonitorDescriptor>) -> Self {
        Self {
            monitors,
            layout: None,
            tick: 0,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared switch that makes `capture_frame` fail while set.
    pub fn failure_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.failing)
    }

    fn layout(&self) -> Result<&MonitorLayout, CaptureError> {
        self.layout.as_ref().ok_or(CaptureError::NotInitialized)
    }
}

impl ScreenCapture for SyntheticCapture {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn initialize(&mut self) -> Result<Geometry, CaptureError> {
        if self.monitors.is_empty() {
            return Err(CaptureError::PlatformUnavailable(
                "synthetic provider has no monitors".to_string(),
            ));
        }
        let layout = MonitorLayout::new(self.monitors.clone(), None);
        let geometry = layout.region().geometry();
        log::info!(
            "Synthetic capture initialized: {} ({} monitor(s))",
            geometry,
            self.monitors.len()
        );
        self.layout = Some(layout);
        Ok(geometry)
    }

    fn capture_frame(&mut self, frame: &mut CaptureFrame) -> Result<(), CaptureError> {
        let region = self.layout()?.region();
        if self.failing.load(Ordering::Relaxed) {
            return Err(CaptureError::AcquireFailed(
                "synthetic failure requested".to_string(),
            ));
        }

        self.tick = self.tick.wrapping_add(1);
        let t = self.tick;
        frame.ensure_geometry(region.width, region.height);
        let stride = frame.stride();
        let data = frame.data_mut();
        for y in 0..region.height {
            let dy = (region.origin_y + y as i32) as u32;
            let row = &mut data[y as usize * stride..(y as usize + 1) * stride];
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                let dx = (region.origin_x + x as i32) as u32;
                px[0] = dx.wrapping_add(t) as u8;
                px[1] = dy.wrapping_add(t) as u8;
                px[2] = t as u8;
            }
        }
        Ok(())
    }

    fn enumerate_monitors(&self) -> Vec<MonitorDescriptor> {
        self.layout
            .as_ref()
            .map(MonitorLayout::monitors)
            .unwrap_or_default()
    }

    fn select_monitor(&mut self, selector: MonitorSelector) -> Result<(), CaptureError> {
        let layout = self.layout.as_mut().ok_or(CaptureError::NotInitialized)?;
        layout.select(selector).map(|_| ())
    }

    fn current_monitor(&self) -> MonitorSelector {
        self.layout
            .as_ref()
            .map(MonitorLayout::selected)
            .unwrap_or_default()
    }

    fn region(&self) -> CaptureRegion {
        self.layout
            .as_ref()
            .map(MonitorLayout::region)
            .unwrap_or_default()
    }

    fn shutdown(&mut self) {
        if self.layout.take().is_some() {
            log::info!("Shutting down synthetic capture");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::monitors::dual_monitors;

    #[test]
    fn test_capture_before_initialize_fails() {
        let mut capture = SyntheticCapture::default();
        let mut frame = CaptureFrame::default();
        assert!(matches!(
            capture.capture_frame(&mut frame),
            Err(CaptureError::NotInitialized)
        ));
    }

    #[test]
    fn test_capture_fills_geometry() {
        let mut capture = SyntheticCapture::new(64, 48);
        assert_eq!(capture.initialize().unwrap(), Geometry::new(64, 48));
        let mut frame = CaptureFrame::default();
        capture.capture_frame(&mut frame).unwrap();
        assert_eq!(frame.geometry(), Geometry::new(64, 48));
        assert_eq!(frame.data().len(), frame.stride() * 48);
        assert_eq!(frame.stride(), 64 * 3);
    }

    #[test]
    fn test_consecutive_frames_differ() {
        let mut capture = SyntheticCapture::new(8, 8);
        capture.initialize().unwrap();
        let mut a = CaptureFrame::default();
        let mut b = CaptureFrame::default();
        capture.capture_frame(&mut a).unwrap();
        capture.capture_frame(&mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_failure_switch_keeps_previous_contents() {
        let mut capture = SyntheticCapture::new(4, 4);
        capture.initialize().unwrap();
        let mut frame = CaptureFrame::default();
        capture.capture_frame(&mut frame).unwrap();
        let before = frame.clone();

        capture.failure_switch().store(true, Ordering::Relaxed);
        assert!(matches!(
            capture.capture_frame(&mut frame),
            Err(CaptureError::AcquireFailed(_))
        ));
        assert_eq!(frame, before);
    }

    #[test]
    fn test_select_monitor_changes_geometry() {
        let mut capture = SyntheticCapture::with_monitors(dual_monitors());
        assert_eq!(capture.initialize().unwrap(), Geometry::new(3200, 1280));
        capture.select_monitor(MonitorSelector::Monitor(1)).unwrap();
        assert_eq!(capture.geometry(), Geometry::new(1280, 1024));
        assert!(capture.select_monitor(MonitorSelector::Monitor(99)).is_err());
        assert_eq!(capture.current_monitor(), MonitorSelector::Monitor(1));
    }
}
