//! Screen capture providers.
//!
//! Every platform backend implements [`ScreenCapture`]; [`create_provider`]
//! picks one at runtime so the rest of the pipeline is written once against
//! the trait.
//!
//! - X11 (`XGetImage` on the root window, RandR for outputs) on Linux
//! - GDI (`BitBlt` + `GetDIBits`) on Windows
//! - [`SyntheticCapture`] everywhere, for tests and headless runs

mod convert;
mod errors;
mod monitors;
mod synthetic;

#[cfg(windows)]
mod gdi;
#[cfg(target_os = "linux")]
mod x11;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use convert::{normalize_into, ByteOrder, SourceLayout};
pub use errors::CaptureError;
pub use monitors::{
    virtual_desktop, CaptureRegion, MonitorDescriptor, MonitorLayout, MonitorSelector,
};
pub use synthetic::SyntheticCapture;

#[cfg(windows)]
pub use gdi::GdiCapture;
#[cfg(target_os = "linux")]
pub use x11::X11Capture;

use crate::frame::{CaptureFrame, Geometry};

/// Per-frame budget at 60 FPS. Slower captures are logged, not rejected.
pub const FRAME_BUDGET: Duration = Duration::from_millis(16);

/// Acquire frames from a rectangular region of the screen.
///
/// Implementations are moved onto the capture thread after `initialize`,
/// hence the `Send` bound.
pub trait ScreenCapture: Send {
    /// Short backend name for logs ("x11", "gdi", "synthetic").
    fn name(&self) -> &'static str;

    /// Open the display, enumerate outputs, and select the whole desktop.
    fn initialize(&mut self) -> Result<Geometry, CaptureError>;

    /// Capture the current region into `frame` as RGB24.
    ///
    /// On failure `frame` keeps its previous contents.
    fn capture_frame(&mut self, frame: &mut CaptureFrame) -> Result<(), CaptureError>;

    /// Monitors found during `initialize`.
    fn enumerate_monitors(&self) -> Vec<MonitorDescriptor>;

    /// Change the capture region. An unknown id leaves the region unchanged.
    fn select_monitor(&mut self, selector: MonitorSelector) -> Result<(), CaptureError>;

    fn current_monitor(&self) -> MonitorSelector;

    /// Region currently captured; zero-sized before `initialize`.
    fn region(&self) -> CaptureRegion;

    /// Size of the frames `capture_frame` produces.
    fn geometry(&self) -> Geometry {
        self.region().geometry()
    }

    /// Release OS resources. Safe to call more than once.
    fn shutdown(&mut self);
}

/// Which capture implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    /// Pick the native backend for the running platform
    #[default]
    Auto,
    X11,
    Gdi,
    Synthetic,
}

impl fmt::Display for CaptureBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureBackend::Auto => "auto",
            CaptureBackend::X11 => "x11",
            CaptureBackend::Gdi => "gdi",
            CaptureBackend::Synthetic => "synthetic",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for CaptureBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(CaptureBackend::Auto),
            "x11" => Ok(CaptureBackend::X11),
            "gdi" => Ok(CaptureBackend::Gdi),
            "synthetic" => Ok(CaptureBackend::Synthetic),
            other => Err(format!(
                "Unknown capture backend '{}'. Valid options: auto, x11, gdi, synthetic",
                other
            )),
        }
    }
}

/// Resolve `Auto` against the running platform.
pub fn detect_backend() -> Option<CaptureBackend> {
    if cfg!(windows) {
        return Some(CaptureBackend::Gdi);
    }
    if cfg!(target_os = "linux") && std::env::var_os("DISPLAY").is_some_and(|d| !d.is_empty()) {
        return Some(CaptureBackend::X11);
    }
    None
}

/// Create an uninitialized provider for `backend`.
pub fn create_provider(backend: CaptureBackend) -> Result<Box<dyn ScreenCapture>, CaptureError> {
    let resolved = match backend {
        CaptureBackend::Auto => detect_backend().ok_or_else(|| {
            CaptureError::PlatformUnavailable(
                "no supported display server found (X11 needs DISPLAY to be set)".to_string(),
            )
        })?,
        other => other,
    };

    log::info!("Creating {} screen capture provider", resolved);

    match resolved {
        CaptureBackend::Synthetic => Ok(Box::new(SyntheticCapture::default())),
        #[cfg(target_os = "linux")]
        CaptureBackend::X11 => Ok(Box::new(X11Capture::new())),
        #[cfg(windows)]
        CaptureBackend::Gdi => Ok(Box::new(GdiCapture::new())),
        other => Err(CaptureError::PlatformUnavailable(format!(
            "{} capture is not available on this platform",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("X11".parse::<CaptureBackend>(), Ok(CaptureBackend::X11));
        assert_eq!(
            "synthetic".parse::<CaptureBackend>(),
            Ok(CaptureBackend::Synthetic)
        );
        assert!("wayland".parse::<CaptureBackend>().is_err());
    }

    #[test]
    fn test_create_synthetic_provider() {
        let mut provider = create_provider(CaptureBackend::Synthetic).unwrap();
        assert_eq!(provider.name(), "synthetic");
        let geometry = provider.initialize().unwrap();
        assert!(!geometry.is_empty());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_gdi_unavailable_off_windows() {
        match create_provider(CaptureBackend::Gdi) {
            Err(CaptureError::PlatformUnavailable(msg)) => assert!(msg.contains("gdi")),
            Err(other) => panic!("Expected PlatformUnavailable, got {:?}", other),
            Ok(_) => panic!("Expected PlatformUnavailable"),
        }
    }
}
