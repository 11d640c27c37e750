//! Encoder pipe tests against a real ffmpeg.
//!
//! Every test probes for ffmpeg first and is skipped when it is missing.

use screenrec::capture::{MonitorSelector, ScreenCapture, SyntheticCapture};
use screenrec::encoder::{
    runs_successfully, EncoderConfig, EncoderError, EncoderSession, FfmpegWriter, VideoWriter,
};
use screenrec::recorder::{ffmpeg_writer_factory, LoopSettings};
use screenrec::session::{CaptureSession, ProviderFactory};
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn ffmpeg_available() -> bool {
    let mut probe = Command::new("ffmpeg");
    probe.arg("-version");
    runs_successfully(probe)
}

#[test]
fn test_encode_black_frames() {
    if !ffmpeg_available() {
        println!("SKIP: ffmpeg not installed");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("black.mp4");
    let mut session = EncoderSession::start(EncoderConfig::new(640, 480, 30, &path)).unwrap();
    assert!(session.is_active());

    let frame = vec![0u8; 640 * 480 * 3];
    for _ in 0..30 {
        session.write_frame(&frame).unwrap();
    }
    assert_eq!(session.frames_written(), 30);

    session.finalize().unwrap();
    assert!(!session.is_active());
    // Finalizing again is a no-op
    session.finalize().unwrap();

    let size = std::fs::metadata(&path).unwrap().len();
    assert!(size > 0, "output file should not be empty");
}

#[test]
fn test_write_after_finalize_rejected() {
    if !ffmpeg_available() {
        println!("SKIP: ffmpeg not installed");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let mut writer = FfmpegWriter::new();
    writer
        .start(EncoderConfig::new(64, 64, 30, dir.path().join("small.mp4")))
        .unwrap();
    assert!(matches!(
        writer.start(EncoderConfig::new(64, 64, 30, dir.path().join("other.mp4"))),
        Err(EncoderError::AlreadyActive)
    ));
    writer.write_frame(&vec![128u8; 64 * 64 * 3]).unwrap();
    writer.finalize().unwrap();
    assert!(!writer.is_active());
    assert!(matches!(
        writer.write_frame(&vec![0u8; 64 * 64 * 3]),
        Err(EncoderError::NotActive)
    ));
}

#[test]
fn test_missing_encoder_binary() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EncoderConfig::new(64, 64, 30, dir.path().join("never.mp4"));
    config.program = "screenrec-no-such-encoder".to_string();
    match EncoderSession::start(config) {
        Err(EncoderError::ToolNotFound(program)) => {
            assert_eq!(program, "screenrec-no-such-encoder")
        }
        other => panic!("Expected ToolNotFound, got {:?}", other),
    }
}

#[test]
fn test_session_records_synthetic_screen() {
    if !ffmpeg_available() {
        println!("SKIP: ffmpeg not installed");
        return;
    }

    let factory: ProviderFactory =
        Arc::new(|| -> Result<Box<dyn ScreenCapture>, screenrec::capture::CaptureError> {
            Ok(Box::new(SyntheticCapture::new(320, 240)))
        });
    let session = CaptureSession::open_with(
        factory,
        ffmpeg_writer_factory(),
        MonitorSelector::VirtualDesktop,
        LoopSettings::default(),
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.mp4");
    let target = session.start_recording(&path, 30, 0, 0).unwrap();
    assert_eq!((target.geometry.width, target.geometry.height), (320, 240));
    assert!(session.is_recording());

    let deadline = Instant::now() + Duration::from_secs(5);
    while session.stats().frames_encoded < 15 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(session.stats().frames_encoded >= 15);

    session.stop_recording();
    assert!(!session.is_recording());
    session.close();

    assert!(session.take_recording_error().is_none());
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
}
