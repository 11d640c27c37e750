//! Capture loop handle and public API.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use super::capture_loop::{ActiveRecording, CaptureWorker, Command, Shared};
use super::types::{LoopError, LoopSettings, LoopState, LoopStats, RecordingTarget};
use crate::capture::ScreenCapture;
use crate::encoder::{EncoderConfig, FfmpegWriter, VideoWriter};
use crate::exchange::FrameExchange;
use crate::frame::Geometry;

/// Creates the writer for each new recording.
pub type WriterFactory = Arc<dyn Fn() -> Box<dyn VideoWriter> + Send + Sync>;

/// Factory producing [`FfmpegWriter`]s.
pub fn ffmpeg_writer_factory() -> WriterFactory {
    Arc::new(|| Box::new(FfmpegWriter::new()) as Box<dyn VideoWriter>)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A spawned capture thread and the flag that stops it.
struct RunningThread {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

/// Owner of the capture thread.
///
/// The thread drives the provider, publishes every frame to the
/// [`FrameExchange`] and, while recording, feeds the encoder. All methods
/// take `&self` and may be called from any thread. None of them wait on a
/// capture iteration except [`stop`](Self::stop), which joins the thread.
pub struct CaptureLoop {
    settings: LoopSettings,
    writer_factory: WriterFactory,
    shared: Arc<Shared>,
    /// Held by `stop` until the join completes
    thread: Mutex<Option<RunningThread>>,
    command_tx: Mutex<Option<Sender<Command>>>,
    next_recording_id: AtomicU64,
}

impl std::fmt::Debug for CaptureLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureLoop")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CaptureLoop {
    /// A loop that records with ffmpeg.
    pub fn new(settings: LoopSettings) -> Self {
        Self::with_writer_factory(settings, ffmpeg_writer_factory())
    }

    pub fn with_writer_factory(settings: LoopSettings, writer_factory: WriterFactory) -> Self {
        Self {
            settings,
            writer_factory,
            shared: Arc::new(Shared::default()),
            thread: Mutex::new(None),
            command_tx: Mutex::new(None),
            next_recording_id: AtomicU64::new(1),
        }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Spawn the capture thread.
    ///
    /// `provider` must already be initialized and `exchange` sized to its
    /// geometry. Both move to the capture thread, which shuts the provider
    /// down when it exits.
    ///
    /// # Errors
    /// * `LoopError::AlreadyRunning` - If the thread is already running
    /// * `LoopError::ProviderMissing` - If the provider has no capture region
    /// * `LoopError::GeometryMismatch` - If the exchange does not match the provider
    pub fn start(
        &self,
        provider: Box<dyn ScreenCapture>,
        exchange: Arc<FrameExchange>,
    ) -> Result<(), LoopError> {
        let mut thread_slot = lock(&self.thread);
        if thread_slot.is_some() {
            return Err(LoopError::AlreadyRunning);
        }

        let geometry = provider.geometry();
        if geometry.is_empty() {
            return Err(LoopError::ProviderMissing);
        }
        let exchange_geometry = Geometry::new(exchange.width(), exchange.height());
        if exchange_geometry != geometry {
            return Err(LoopError::GeometryMismatch {
                provider: geometry,
                exchange: exchange_geometry,
            });
        }

        self.shared.recording_id.store(0, Ordering::SeqCst);
        self.shared.width.store(geometry.width, Ordering::SeqCst);
        self.shared.height.store(geometry.height, Ordering::SeqCst);
        self.shared.counters.reset();
        lock(&self.shared.last_error).take();

        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let worker = CaptureWorker {
            provider,
            stop: Arc::clone(&stop),
            exchange,
            shared: Arc::clone(&self.shared),
            commands: rx,
            idle_fps: self.settings.target_fps,
        };

        let handle = thread::Builder::new()
            .name("screen-capture".to_string())
            .spawn(move || worker.run())
            .map_err(LoopError::ThreadSpawn)?;

        *thread_slot = Some(RunningThread { handle, stop });
        *lock(&self.command_tx) = Some(tx);
        self.shared.set_state(LoopState::Running);
        Ok(())
    }

    /// Stop capturing and join the capture thread.
    ///
    /// Any active recording is finalized by the thread before it exits.
    /// Safe to call repeatedly and from any thread. A concurrent
    /// [`start`](Self::start) waits until the old thread has been joined.
    pub fn stop(&self) {
        let mut thread_slot = lock(&self.thread);
        let Some(running) = thread_slot.take() else {
            return;
        };

        self.shared.set_state(LoopState::Stopping);
        // Channel closes before the stop flag is raised
        lock(&self.command_tx).take();
        self.shared.recording_id.store(0, Ordering::SeqCst);
        running.stop.store(true, Ordering::SeqCst);

        if running.handle.join().is_err() {
            log::error!("Capture thread panicked");
        }
        self.shared.recording_id.store(0, Ordering::SeqCst);
        self.shared.counters.set_fps(0.0);
        self.shared.set_state(LoopState::Idle);
    }

    /// Start encoding captured frames to `path`.
    ///
    /// A target dimension of 0 records at the capture size. The encoder is
    /// started on the calling thread, so a missing encoder binary or bad
    /// parameters fail here and leave the loop not recording.
    pub fn start_recording(
        &self,
        path: impl Into<PathBuf>,
        fps: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<RecordingTarget, LoopError> {
        if !self.is_running() {
            return Err(LoopError::NotRunning);
        }
        let capture = self.shared.geometry();
        if capture.is_empty() {
            return Err(LoopError::ProviderMissing);
        }

        let id = self.next_recording_id.fetch_add(1, Ordering::SeqCst);
        if self
            .shared
            .recording_id
            .compare_exchange(0, id, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LoopError::AlreadyRecording);
        }

        let target = resolve_target(capture, fps, target_width, target_height);
        match self.attach_writer(id, path.into(), target) {
            Ok(()) => {
                log::info!(
                    "Recording started: {} @ {} fps{}",
                    target.geometry,
                    target.fps,
                    if target.scaled {
                        format!(" (scaled from {})", capture)
                    } else {
                        String::new()
                    }
                );
                lock(&self.shared.last_error).take();
                Ok(target)
            }
            Err(e) => {
                let _ = self.shared.recording_id.compare_exchange(
                    id,
                    0,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                Err(e)
            }
        }
    }

    fn attach_writer(
        &self,
        id: u64,
        path: PathBuf,
        target: RecordingTarget,
    ) -> Result<(), LoopError> {
        let config = EncoderConfig {
            width: target.geometry.width,
            height: target.geometry.height,
            fps: target.fps,
            output_path: path,
            codec: self.settings.codec.clone(),
            program: self.settings.encoder_program.clone(),
            finalize_timeout: self.settings.finalize_timeout,
        };

        let mut writer = (self.writer_factory)();
        writer.start(config)?;

        let command = Command::StartRecording(ActiveRecording {
            id,
            writer,
            target: target.geometry,
            scale: target.scaled,
            fps: target.fps,
            frames: 0,
        });
        let sent = match lock(&self.command_tx).as_ref() {
            Some(tx) => tx.send(command).map_err(|e| e.0),
            None => Err(command),
        };
        if let Err(Command::StartRecording(mut active)) = sent {
            let _ = active.writer.finalize();
            return Err(LoopError::NotRunning);
        }
        Ok(())
    }

    /// Stop the active recording, if any.
    ///
    /// The capture thread finalizes the encoder on its next iteration.
    pub fn stop_recording(&self) {
        let id = self.shared.recording_id.swap(0, Ordering::SeqCst);
        if id != 0 {
            log::info!("Stopping recording");
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), LoopState::Running | LoopState::Recording)
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording_id.load(Ordering::SeqCst) != 0
    }

    pub fn state(&self) -> LoopState {
        match LoopState::from_u8(self.shared.state.load(Ordering::SeqCst)) {
            LoopState::Running if self.is_recording() => LoopState::Recording,
            state => state,
        }
    }

    /// Capture geometry of the running (or last run) session.
    pub fn geometry(&self) -> Geometry {
        self.shared.geometry()
    }

    /// Captures per second over the last second.
    pub fn fps(&self) -> f64 {
        self.shared.counters.fps()
    }

    pub fn stats(&self) -> LoopStats {
        self.shared.counters.snapshot()
    }

    /// Why the last recording stopped by itself, if it did.
    ///
    /// Each failure is returned once.
    pub fn take_recording_error(&self) -> Option<String> {
        lock(&self.shared.last_error).take()
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Recording geometry for a capture of size `capture`.
///
/// Either target dimension being 0 means record at the capture size.
pub fn resolve_target(
    capture: Geometry,
    fps: u32,
    target_width: u32,
    target_height: u32,
) -> RecordingTarget {
    let geometry = if target_width == 0 || target_height == 0 {
        capture
    } else {
        Geometry::new(target_width, target_height)
    };
    RecordingTarget {
        geometry,
        fps,
        scaled: geometry != capture,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticCapture;

    #[test]
    fn test_resolve_native_target() {
        let target = resolve_target(Geometry::new(640, 480), 30, 0, 0);
        assert_eq!(target.geometry, Geometry::new(640, 480));
        assert!(!target.scaled);

        let target = resolve_target(Geometry::new(640, 480), 30, 320, 0);
        assert!(!target.scaled);
    }

    #[test]
    fn test_resolve_scaled_target() {
        let target = resolve_target(Geometry::new(1920, 1080), 30, 1280, 720);
        assert_eq!(target.geometry, Geometry::new(1280, 720));
        assert!(target.scaled);

        let same = resolve_target(Geometry::new(1280, 720), 30, 1280, 720);
        assert!(!same.scaled);
    }

    #[test]
    fn test_start_recording_requires_running_loop() {
        let capture_loop = CaptureLoop::new(LoopSettings::default());
        assert!(matches!(
            capture_loop.start_recording("out.mp4", 30, 0, 0),
            Err(LoopError::NotRunning)
        ));
        assert_eq!(capture_loop.state(), LoopState::Idle);
    }

    #[test]
    fn test_uninitialized_provider_rejected() {
        let capture_loop = CaptureLoop::new(LoopSettings::default());
        let provider = Box::new(SyntheticCapture::default());
        let exchange = Arc::new(FrameExchange::new(640, 480));
        assert!(matches!(
            capture_loop.start(provider, exchange),
            Err(LoopError::ProviderMissing)
        ));
        assert!(!capture_loop.is_running());
    }

    #[test]
    fn test_exchange_geometry_must_match() {
        let capture_loop = CaptureLoop::new(LoopSettings::default());
        let mut provider = SyntheticCapture::new(64, 48);
        provider.initialize().unwrap();
        let exchange = Arc::new(FrameExchange::new(32, 24));
        match capture_loop.start(Box::new(provider), exchange) {
            Err(LoopError::GeometryMismatch { provider, exchange }) => {
                assert_eq!(provider, Geometry::new(64, 48));
                assert_eq!(exchange, Geometry::new(32, 24));
            }
            other => panic!("Expected GeometryMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let capture_loop = CaptureLoop::new(LoopSettings::default());
        capture_loop.stop();
        capture_loop.stop();
        capture_loop.stop_recording();
        assert_eq!(capture_loop.state(), LoopState::Idle);
    }
}
