//! Capture session facade.
//!
//! A [`CaptureSession`] wires one provider, one [`FrameExchange`] and one
//! [`CaptureLoop`] together and is what a front end talks to. Switching
//! monitors tears all three down and builds them again for the new region.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::capture::{
    create_provider, CaptureBackend, CaptureError, MonitorDescriptor, MonitorSelector,
    ScreenCapture,
};
use crate::exchange::FrameExchange;
use crate::frame::{CaptureFrame, Geometry};
use crate::recorder::{
    ffmpeg_writer_factory, CaptureLoop, LoopError, LoopSettings, LoopStats, RecordingTarget,
    WriterFactory,
};

/// Creates an uninitialized provider.
pub type ProviderFactory =
    Arc<dyn Fn() -> Result<Box<dyn ScreenCapture>, CaptureError> + Send + Sync>;

const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Errors from opening or reconfiguring a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Loop(#[from] LoopError),
}

/// A running capture with preview and recording controls.
pub struct CaptureSession {
    provider_factory: ProviderFactory,
    writer_factory: WriterFactory,
    settings: LoopSettings,
    monitors: Vec<MonitorDescriptor>,
    selected: MonitorSelector,
    exchange: Arc<FrameExchange>,
    capture_loop: CaptureLoop,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("selected", &self.selected)
            .field("geometry", &self.geometry())
            .field("capture_loop", &self.capture_loop)
            .finish_non_exhaustive()
    }
}

/// An initialized provider with `selector` applied.
fn open_provider(
    factory: &ProviderFactory,
    selector: MonitorSelector,
) -> Result<Box<dyn ScreenCapture>, CaptureError> {
    let mut provider = factory()?;
    provider.initialize()?;
    if let Err(e) = provider.select_monitor(selector) {
        provider.shutdown();
        return Err(e);
    }
    Ok(provider)
}

impl CaptureSession {
    /// Open `backend`, select `monitor`, and start capturing.
    pub fn open(
        backend: CaptureBackend,
        monitor: MonitorSelector,
        settings: LoopSettings,
    ) -> Result<Self, SessionError> {
        Self::open_with(
            Arc::new(move || create_provider(backend)),
            ffmpeg_writer_factory(),
            monitor,
            settings,
        )
    }

    /// Like [`open`](Self::open) with explicit provider and writer factories.
    pub fn open_with(
        provider_factory: ProviderFactory,
        writer_factory: WriterFactory,
        monitor: MonitorSelector,
        settings: LoopSettings,
    ) -> Result<Self, SessionError> {
        let provider = open_provider(&provider_factory, monitor)?;
        let monitors = provider.enumerate_monitors();
        let (exchange, capture_loop) = start_loop(provider, &writer_factory, &settings)?;

        Ok(Self {
            provider_factory,
            writer_factory,
            settings,
            monitors,
            selected: monitor,
            exchange,
            capture_loop,
        })
    }

    /// Size of captured frames.
    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.exchange.width(), self.exchange.height())
    }

    pub fn fps(&self) -> f64 {
        self.capture_loop.fps()
    }

    pub fn stats(&self) -> LoopStats {
        self.capture_loop.stats()
    }

    /// Copy the latest frame into `out` if a new one is available.
    pub fn try_take_latest(&self, out: &mut CaptureFrame) -> bool {
        self.exchange.try_take_latest(out)
    }

    /// Poll for a new frame for at most `timeout`.
    pub fn wait_for_frame(&self, out: &mut CaptureFrame, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.exchange.try_take_latest(out) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(FRAME_POLL_INTERVAL);
        }
    }

    /// Monitors found when the session was opened.
    pub fn monitors(&self) -> Vec<MonitorDescriptor> {
        self.monitors.clone()
    }

    pub fn current_monitor(&self) -> MonitorSelector {
        self.selected
    }

    /// Capture a different monitor (or the whole desktop).
    ///
    /// Any active recording is stopped. The new provider and loop are running
    /// before the old loop is stopped, so any setup failure leaves the
    /// session untouched.
    pub fn switch_monitor(&mut self, selector: MonitorSelector) -> Result<(), SessionError> {
        if let MonitorSelector::Monitor(id) = selector {
            if !self.monitors.iter().any(|m| m.id == id) {
                return Err(CaptureError::InvalidMonitor {
                    requested: selector.id(),
                    available: self.monitors.len(),
                }
                .into());
            }
        }
        if selector == self.selected && self.capture_loop.is_running() {
            return Ok(());
        }

        let provider = open_provider(&self.provider_factory, selector)?;
        let monitors = provider.enumerate_monitors();
        let (exchange, capture_loop) = start_loop(provider, &self.writer_factory, &self.settings)?;
        log::info!("Switching capture to {}", selector);

        self.capture_loop.stop_recording();
        self.capture_loop.stop();

        self.monitors = monitors;
        self.exchange = exchange;
        self.capture_loop = capture_loop;
        self.selected = selector;
        Ok(())
    }

    /// Record to `path`. Target dimensions of 0 keep the capture size.
    pub fn start_recording(
        &self,
        path: impl Into<PathBuf>,
        fps: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<RecordingTarget, LoopError> {
        self.capture_loop
            .start_recording(path, fps, target_width, target_height)
    }

    pub fn stop_recording(&self) {
        self.capture_loop.stop_recording();
    }

    pub fn is_recording(&self) -> bool {
        self.capture_loop.is_recording()
    }

    pub fn is_running(&self) -> bool {
        self.capture_loop.is_running()
    }

    /// Error that ended the last recording, reported once.
    pub fn take_recording_error(&self) -> Option<String> {
        self.capture_loop.take_recording_error()
    }

    /// Stop capturing. Finalizes any active recording.
    pub fn close(&self) {
        self.capture_loop.stop();
    }
}

fn start_loop(
    provider: Box<dyn ScreenCapture>,
    writer_factory: &WriterFactory,
    settings: &LoopSettings,
) -> Result<(Arc<FrameExchange>, CaptureLoop), LoopError> {
    let geometry = provider.geometry();
    let exchange = Arc::new(FrameExchange::new(geometry.width, geometry.height));
    let capture_loop = CaptureLoop::with_writer_factory(settings.clone(), Arc::clone(writer_factory));
    capture_loop.start(provider, Arc::clone(&exchange))?;
    Ok((exchange, capture_loop))
}
