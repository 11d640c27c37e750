//! Background capture thread implementation.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use super::types::{Counters, LoopState};
use crate::capture::{ScreenCapture, FRAME_BUDGET};
use crate::encoder::{EncoderError, VideoWriter};
use crate::exchange::FrameExchange;
use crate::frame::{CaptureFrame, Geometry};
use crate::scaler::scale_into;

const FPS_WINDOW: Duration = Duration::from_secs(1);
const SLOW_WARNING_INTERVAL: Duration = Duration::from_secs(5);
/// Capture failures after the first are logged once per this many
const FAILURE_LOG_EVERY: u64 = 60;

/// State shared between the capture thread and its [`CaptureLoop`](super::CaptureLoop).
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub state: AtomicU8,
    /// Id of the recording the handle considers active, 0 for none
    pub recording_id: AtomicU64,
    pub width: AtomicU32,
    pub height: AtomicU32,
    pub counters: Counters,
    /// Why the last recording ended on its own
    pub last_error: Mutex<Option<String>>,
}

impl Shared {
    pub fn geometry(&self) -> Geometry {
        Geometry::new(
            self.width.load(Ordering::SeqCst),
            self.height.load(Ordering::SeqCst),
        )
    }

    pub fn set_state(&self, state: LoopState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn set_last_error(&self, message: String) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(message);
    }
}

/// An encoder handed to the capture thread.
pub(crate) struct ActiveRecording {
    pub id: u64,
    pub writer: Box<dyn VideoWriter>,
    pub target: Geometry,
    pub scale: bool,
    pub fps: u32,
    pub frames: u64,
}

/// Commands sent to the capture thread.
pub(crate) enum Command {
    StartRecording(ActiveRecording),
}

/// Everything the capture thread owns.
pub(crate) struct CaptureWorker {
    pub provider: Box<dyn ScreenCapture>,
    /// Stop flag of this run only
    pub stop: Arc<AtomicBool>,
    pub exchange: Arc<FrameExchange>,
    pub shared: Arc<Shared>,
    pub commands: Receiver<Command>,
    pub idle_fps: u32,
}

impl CaptureWorker {
    /// Run until the stop flag is set.
    pub fn run(mut self) {
        let geometry = self.shared.geometry();
        log::info!(
            "Capture thread started: {} via {}",
            geometry,
            self.provider.name()
        );

        let mut frame = CaptureFrame::new(geometry.width, geometry.height);
        let mut scaled = CaptureFrame::default();
        let mut recording: Option<ActiveRecording> = None;

        let mut window_start = Instant::now();
        let mut window_frames = 0u32;
        let mut last_slow_warning: Option<Instant> = None;
        let mut mismatch_logged = false;

        while !self.stop.load(Ordering::SeqCst) {
            let started = Instant::now();
            self.apply_commands(&mut recording);

            match self.provider.capture_frame(&mut frame) {
                Ok(()) => {
                    self.shared
                        .counters
                        .frames_captured
                        .fetch_add(1, Ordering::Relaxed);
                    window_frames += 1;

                    let capture_time = started.elapsed();
                    if capture_time > FRAME_BUDGET {
                        let slow = self
                            .shared
                            .counters
                            .slow_frames
                            .fetch_add(1, Ordering::Relaxed)
                            + 1;
                        if last_slow_warning.map_or(true, |t| t.elapsed() >= SLOW_WARNING_INTERVAL)
                        {
                            log::warn!(
                                "Slow capture: {:.1} ms (budget {} ms, {} slow frames so far)",
                                capture_time.as_secs_f64() * 1000.0,
                                FRAME_BUDGET.as_millis(),
                                slow
                            );
                            last_slow_warning = Some(Instant::now());
                        }
                    }

                    if !self.exchange.push(&frame) && !mismatch_logged {
                        log::warn!(
                            "Captured {} frame does not fit the {}x{} exchange; preview not updated",
                            frame.geometry(),
                            self.exchange.width(),
                            self.exchange.height()
                        );
                        mismatch_logged = true;
                    }

                    if let Some(active) = recording.as_mut() {
                        if let Err(e) = encode(active, &frame, &mut scaled) {
                            self.fail_recording(&mut recording, e);
                        } else {
                            self.shared
                                .counters
                                .frames_encoded
                                .fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                Err(e) => {
                    let failures = self
                        .shared
                        .counters
                        .capture_failures
                        .fetch_add(1, Ordering::Relaxed)
                        + 1;
                    if failures == 1 || failures % FAILURE_LOG_EVERY == 0 {
                        log::warn!("Capture failed ({} total): {}", failures, e);
                    }
                }
            }

            let window = window_start.elapsed();
            if window >= FPS_WINDOW {
                self.shared
                    .counters
                    .set_fps(window_frames as f64 / window.as_secs_f64());
                window_start = Instant::now();
                window_frames = 0;
            }

            let fps = recording.as_ref().map_or(self.idle_fps, |r| r.fps).max(1);
            let interval = Duration::from_secs_f64(1.0 / fps as f64);
            let elapsed = started.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }

        // A recording sent just before stop is still queued
        self.apply_commands(&mut recording);
        if let Some(active) = recording.take() {
            finish(active);
        }
        self.provider.shutdown();
        self.shared.counters.set_fps(0.0);
        log::info!("Capture thread stopped");
    }

    /// Install new recordings and drop any the handle no longer wants.
    fn apply_commands(&mut self, recording: &mut Option<ActiveRecording>) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::StartRecording(active) => {
                    if let Some(previous) = recording.take() {
                        finish(previous);
                    }
                    *recording = Some(active);
                }
            }
        }

        let current = self.shared.recording_id.load(Ordering::SeqCst);
        if recording.as_ref().is_some_and(|r| r.id != current) {
            if let Some(active) = recording.take() {
                finish(active);
            }
        }
    }

    /// A write failed: end this recording only, report it once.
    fn fail_recording(&self, recording: &mut Option<ActiveRecording>, error: EncoderError) {
        let Some(mut active) = recording.take() else {
            return;
        };
        log::error!(
            "Recording stopped after {} frames: {}",
            active.frames,
            error
        );
        if let Err(e) = active.writer.finalize() {
            log::warn!("Failed to finalize encoder: {}", e);
        }
        let _ = self.shared.recording_id.compare_exchange(
            active.id,
            0,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.shared.set_last_error(error.to_string());
    }
}

/// Scale if needed and hand the frame to the writer.
fn encode(
    active: &mut ActiveRecording,
    frame: &CaptureFrame,
    scaled: &mut CaptureFrame,
) -> Result<(), EncoderError> {
    let bytes = if active.scale {
        scale_into(frame, scaled, active.target.width, active.target.height);
        scaled.data()
    } else {
        frame.data()
    };
    active.writer.write_frame(bytes)?;
    active.frames += 1;
    Ok(())
}

fn finish(mut active: ActiveRecording) {
    match active.writer.finalize() {
        Ok(()) => log::info!("Recording stopped: {} frames", active.frames),
        Err(e) => log::warn!(
            "Recording stopped after {} frames, finalize failed: {}",
            active.frames,
            e
        ),
    }
}
