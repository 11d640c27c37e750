//! Error types for screen capture operations.

use thiserror::Error;

/// Errors that can occur while opening the display or acquiring frames.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The OS display subsystem could not be opened
    #[error("Display subsystem unavailable: {0}")]
    PlatformUnavailable(String),
    /// Frame acquisition failed (the destination buffer is left untouched)
    #[error("Frame acquisition failed: {0}")]
    AcquireFailed(String),
    /// Requested monitor index does not exist
    #[error(
        "Monitor {requested} not found. {available} monitor(s) available (use -1 for the whole desktop)"
    )]
    InvalidMonitor { requested: i32, available: usize },
    /// Negative monitor id other than -1
    #[error("Invalid monitor id {0}: use -1 for the whole desktop or an id from `screenrec monitors`")]
    InvalidMonitorId(i32),
    /// `capture_frame` or `select_monitor` called before `initialize`
    #[error("Screen capture not initialized")]
    NotInitialized,
}
