//! Error types for the encoder pipe.

use thiserror::Error;

/// Errors raised while starting, feeding or finalizing an encoder process.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// The encoder binary could not be run (version probe failed)
    #[error(
        "Encoder '{0}' not found. Install FFmpeg and make sure it is on your PATH:\n\n    apt install ffmpeg    (Debian/Ubuntu)\n    winget install ffmpeg (Windows)\n"
    )]
    ToolNotFound(String),
    /// The probe succeeded but spawning the encoding process failed
    #[error("Failed to spawn encoder: {0}")]
    SpawnFailed(#[source] std::io::Error),
    /// The pipe accepted fewer bytes than the frame holds
    #[error("Partial write to encoder pipe: {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },
    /// The encoder process exited or closed its input
    #[error("Encoder process terminated unexpectedly")]
    EncoderTerminated,
    /// `start` called on a writer that is already encoding
    #[error("Encoder session already active")]
    AlreadyActive,
    /// Rejected `EncoderConfig`
    #[error("Invalid encoder configuration: {0}")]
    InvalidConfig(String),
    /// `write_frame` called without an active session
    #[error("No active encoder session")]
    NotActive,
    #[error("Encoder I/O error: {0}")]
    Io(#[from] std::io::Error),
}
