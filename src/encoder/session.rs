//! One live encoder process fed raw RGB24 frames over its stdin.

use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::EncoderError;
use super::process::{runs_successfully, PipedChild};
use crate::frame::BYTES_PER_PIXEL;

/// Time the encoder gets to exit after SIGINT before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Codec options passed through to the encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecSettings {
    pub codec: String,
    /// Omitted from the command line when `None`
    pub preset: Option<String>,
    /// Omitted from the command line when `None`
    pub crf: Option<u8>,
    pub pixel_format: String,
}

impl Default for CodecSettings {
    /// H.264 in yuv420p, playable almost everywhere.
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: Some("medium".to_string()),
            crf: Some(23),
            pixel_format: "yuv420p".to_string(),
        }
    }
}

/// Parameters of one encoding session. Fixed once the session starts.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub output_path: PathBuf,
    pub codec: CodecSettings,
    /// Encoder executable, resolved through `PATH`
    pub program: String,
    /// How long `finalize` waits for the encoder to exit on its own
    pub finalize_timeout: Duration,
}

impl EncoderConfig {
    /// Config with default codec settings and the `ffmpeg` binary.
    pub fn new(width: u32, height: u32, fps: u32, output_path: impl Into<PathBuf>) -> Self {
        Self {
            width,
            height,
            fps,
            output_path: output_path.into(),
            codec: CodecSettings::default(),
            program: "ffmpeg".to_string(),
            finalize_timeout: Duration::from_secs(10),
        }
    }

    /// Bytes in one frame of this geometry.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    pub fn validate(&self) -> Result<(), EncoderError> {
        if self.width == 0 || self.height == 0 {
            return Err(EncoderError::InvalidConfig(format!(
                "frame size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(EncoderError::InvalidConfig(
                "fps must be greater than 0".to_string(),
            ));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(EncoderError::InvalidConfig(
                "output path is empty".to_string(),
            ));
        }
        if self.program.is_empty() {
            return Err(EncoderError::InvalidConfig(
                "encoder program is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Command-line arguments for ffmpeg, excluding the program name.
///
/// Input is a headerless rgb24 stream on stdin; an existing output file is
/// overwritten.
pub fn ffmpeg_args(config: &EncoderConfig) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pixel_format",
        "rgb24",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.extend([
        "-video_size".to_string(),
        format!("{}x{}", config.width, config.height),
        "-framerate".to_string(),
        config.fps.to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
        "-c:v".to_string(),
        config.codec.codec.clone(),
    ]);
    if let Some(preset) = &config.codec.preset {
        args.push("-preset".to_string());
        args.push(preset.clone());
    }
    if let Some(crf) = config.codec.crf {
        args.push("-crf".to_string());
        args.push(crf.to_string());
    }
    args.push("-pix_fmt".to_string());
    args.push(config.codec.pixel_format.clone());
    args.push(config.output_path.to_string_lossy().into_owned());
    args
}

/// A running encoder process and the write end of its input pipe.
///
/// Dropping an unfinalized session finalizes it.
#[derive(Debug)]
pub struct EncoderSession {
    config: EncoderConfig,
    child: Option<PipedChild>,
    frames_written: u64,
    size_warned: bool,
}

impl EncoderSession {
    /// Probe for the encoder binary, then spawn it reading from a pipe.
    pub fn start(config: EncoderConfig) -> Result<Self, EncoderError> {
        config.validate()?;

        let mut probe = Command::new(&config.program);
        probe.arg("-version");
        if !runs_successfully(probe) {
            return Err(EncoderError::ToolNotFound(config.program.clone()));
        }

        if config.codec.pixel_format == "yuv420p" && (config.width % 2 == 1 || config.height % 2 == 1)
        {
            log::warn!(
                "Odd frame size {}x{} with yuv420p; most encoders require even dimensions",
                config.width,
                config.height
            );
        }

        let mut command = Command::new(&config.program);
        command.args(ffmpeg_args(&config));
        let child = PipedChild::spawn(command).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                EncoderError::ToolNotFound(config.program.clone())
            } else {
                EncoderError::SpawnFailed(e)
            }
        })?;

        log::info!(
            "Encoder started (pid {}): {}x{} @ {} fps, {} -> {}",
            child.id(),
            config.width,
            config.height,
            config.fps,
            config.codec.codec,
            config.output_path.display()
        );

        Ok(Self {
            config,
            child: Some(child),
            frames_written: 0,
            size_warned: false,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// False once finalized.
    pub fn is_active(&self) -> bool {
        self.child.is_some()
    }

    /// Send one frame. A short write is reported, never retried.
    pub fn write_frame(&mut self, bytes: &[u8]) -> Result<(), EncoderError> {
        let expected = self.config.frame_len();
        if bytes.len() != expected && !self.size_warned {
            log::warn!(
                "Frame size mismatch: got {} bytes, encoder expects {} ({}x{})",
                bytes.len(),
                expected,
                self.config.width,
                self.config.height
            );
            self.size_warned = true;
        }

        let child = self.child.as_mut().ok_or(EncoderError::NotActive)?;
        if child.has_exited() {
            return Err(EncoderError::EncoderTerminated);
        }
        let input = child.input().ok_or(EncoderError::EncoderTerminated)?;

        match input.write(bytes) {
            Ok(n) if n == bytes.len() => {
                self.frames_written += 1;
                Ok(())
            }
            Ok(n) => Err(EncoderError::PartialWrite {
                written: n,
                expected: bytes.len(),
            }),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(EncoderError::EncoderTerminated),
            Err(e) => Err(EncoderError::Io(e)),
        }
    }

    /// Close the pipe and wait for the encoder to exit.
    ///
    /// A nonzero exit status is only logged. Calling this again is a no-op.
    pub fn finalize(&mut self) -> Result<(), EncoderError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        child.close_input();
        let status = match wait_or_stop(&mut child, self.config.finalize_timeout) {
            Ok(status) => status,
            Err(e) => {
                let _ = child.kill();
                return Err(EncoderError::Io(e));
            }
        };

        if status.success() {
            log::info!(
                "Encoder finished: {} frames written to {}",
                self.frames_written,
                self.config.output_path.display()
            );
        } else {
            log::warn!(
                "Encoder exited with {} after {} frames; {} may still be usable",
                status,
                self.frames_written,
                self.config.output_path.display()
            );
        }
        Ok(())
    }
}

/// Wait for a voluntary exit, then interrupt, then kill.
fn wait_or_stop(child: &mut PipedChild, timeout: Duration) -> std::io::Result<ExitStatus> {
    if let Some(status) = child.wait_timeout(timeout)? {
        return Ok(status);
    }
    log::warn!(
        "Encoder did not exit within {:.1}s, interrupting",
        timeout.as_secs_f32()
    );
    child.interrupt();
    if let Some(status) = child.wait_timeout(SHUTDOWN_GRACE)? {
        return Ok(status);
    }
    log::warn!("Encoder ignored interrupt, killing it");
    child.kill()
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            log::error!("Failed to finalize encoder: {}", e);
        }
    }
}
