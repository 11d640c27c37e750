//! Capture loop types and data structures.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::encoder::{CodecSettings, EncoderError};
use crate::frame::Geometry;

/// Lifecycle of a [`CaptureLoop`](super::CaptureLoop).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Idle = 0,
    Running = 1,
    /// Running with an encoder attached
    Recording = 2,
    Stopping = 3,
}

impl LoopState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => LoopState::Running,
            2 => LoopState::Recording,
            3 => LoopState::Stopping,
            _ => LoopState::Idle,
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Idle => "idle",
            LoopState::Running => "running",
            LoopState::Recording => "recording",
            LoopState::Stopping => "stopping",
        };
        write!(f, "{}", name)
    }
}

/// Settings for the capture loop and the encoders it starts.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Capture rate while not recording
    pub target_fps: u32,
    pub codec: CodecSettings,
    pub encoder_program: String,
    pub finalize_timeout: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            target_fps: 60,
            codec: CodecSettings::default(),
            encoder_program: "ffmpeg".to_string(),
            finalize_timeout: Duration::from_secs(10),
        }
    }
}

/// Geometry a recording is encoded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingTarget {
    pub geometry: Geometry,
    pub fps: u32,
    /// Frames are resampled from the capture geometry
    pub scaled: bool,
}

/// Snapshot of capture loop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopStats {
    pub frames_captured: u64,
    pub capture_failures: u64,
    pub frames_encoded: u64,
    /// Captures that took longer than the per-frame budget
    pub slow_frames: u64,
    /// Captures per second over the last measurement window
    pub fps: f64,
}

/// Counters shared between the capture thread and its handle.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub frames_captured: AtomicU64,
    pub capture_failures: AtomicU64,
    pub frames_encoded: AtomicU64,
    pub slow_frames: AtomicU64,
    /// `f64` bits
    fps: AtomicU64,
}

impl Counters {
    pub fn reset(&self) {
        self.frames_captured.store(0, Ordering::Relaxed);
        self.capture_failures.store(0, Ordering::Relaxed);
        self.frames_encoded.store(0, Ordering::Relaxed);
        self.slow_frames.store(0, Ordering::Relaxed);
        self.set_fps(0.0);
    }

    pub fn set_fps(&self, fps: f64) {
        self.fps.store(fps.to_bits(), Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        f64::from_bits(self.fps.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> LoopStats {
        LoopStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            slow_frames: self.slow_frames.load(Ordering::Relaxed),
            fps: self.fps(),
        }
    }
}

/// Errors returned by capture loop control methods.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("Capture loop is not running")]
    NotRunning,
    #[error("Capture loop is already running")]
    AlreadyRunning,
    #[error("Already recording")]
    AlreadyRecording,
    /// The provider is missing or was never initialized
    #[error("Screen capture provider is not initialized")]
    ProviderMissing,
    #[error("Frame exchange is {exchange} but the provider captures {provider}")]
    GeometryMismatch { provider: Geometry, exchange: Geometry },
    #[error("Failed to spawn capture thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [
            LoopState::Idle,
            LoopState::Running,
            LoopState::Recording,
            LoopState::Stopping,
        ] {
            assert_eq!(LoopState::from_u8(state as u8), state);
        }
        assert_eq!(LoopState::from_u8(200), LoopState::Idle);
    }

    #[test]
    fn test_counters_snapshot_and_reset() {
        let counters = Counters::default();
        counters.frames_captured.fetch_add(5, Ordering::Relaxed);
        counters.set_fps(59.5);
        let stats = counters.snapshot();
        assert_eq!(stats.frames_captured, 5);
        assert_eq!(stats.fps, 59.5);

        counters.reset();
        assert_eq!(counters.snapshot(), LoopStats::default());
    }

    #[test]
    fn test_encoder_error_is_transparent() {
        let err: LoopError = EncoderError::ToolNotFound("ffmpeg".to_string()).into();
        assert!(err.to_string().starts_with("Encoder 'ffmpeg' not found"));
    }
}
