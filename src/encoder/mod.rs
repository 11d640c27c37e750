//! Streaming raw frames to an external encoder process.
//!
//! Frames travel as a headerless sequence of `width * height * 3` byte RGB24
//! images over the child's stdin. Framing is implied by the geometry fixed in
//! [`EncoderConfig`] when the session starts.

mod errors;
mod process;
mod session;

pub use errors::EncoderError;
pub use process::{runs_successfully, PipedChild};
pub use session::{ffmpeg_args, CodecSettings, EncoderConfig, EncoderSession};

/// A sink for recorded frames.
///
/// The capture loop records through this trait so the encoder can be
/// replaced (in tests, by an in-memory writer).
pub trait VideoWriter: Send {
    /// Begin a session. Fails with [`EncoderError::AlreadyActive`] if one is
    /// running.
    fn start(&mut self, config: EncoderConfig) -> Result<(), EncoderError>;

    fn write_frame(&mut self, bytes: &[u8]) -> Result<(), EncoderError>;

    /// End the session. No-op when nothing is active.
    fn finalize(&mut self) -> Result<(), EncoderError>;

    fn is_active(&self) -> bool;
}

/// [`VideoWriter`] backed by an ffmpeg [`EncoderSession`].
#[derive(Debug, Default)]
pub struct FfmpegWriter {
    session: Option<EncoderSession>,
}

impl FfmpegWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames accepted by the current session.
    pub fn frames_written(&self) -> u64 {
        self.session
            .as_ref()
            .map(EncoderSession::frames_written)
            .unwrap_or(0)
    }
}

impl VideoWriter for FfmpegWriter {
    fn start(&mut self, config: EncoderConfig) -> Result<(), EncoderError> {
        if self.is_active() {
            return Err(EncoderError::AlreadyActive);
        }
        self.session = Some(EncoderSession::start(config)?);
        Ok(())
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<(), EncoderError> {
        self.session
            .as_mut()
            .ok_or(EncoderError::NotActive)?
            .write_frame(bytes)
    }

    fn finalize(&mut self) -> Result<(), EncoderError> {
        match self.session.take() {
            Some(mut session) => session.finalize(),
            None => Ok(()),
        }
    }

    fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(EncoderSession::is_active)
    }
}
