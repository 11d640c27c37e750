//! Capture loop orchestration.
//!
//! - [`CaptureLoop`] owns the capture thread and the recording state
//! - [`LoopSettings`] carries pacing and encoder options
//! - [`LoopStats`] reports throughput counters

mod capture_loop;
mod handle;
mod types;

pub use handle::{ffmpeg_writer_factory, resolve_target, CaptureLoop, WriterFactory};
pub use types::{LoopError, LoopSettings, LoopState, LoopStats, RecordingTarget};
