//! Subcommand handlers for monitors, record, screenshot and config actions.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::args::{ConfigAction, RecordArgs};
use crate::capture::{create_provider, CaptureBackend, CaptureError, MonitorSelector};
use crate::config::{default_path, Config, ConfigError};
use crate::frame::{CaptureFrame, Geometry};
use crate::recorder::LoopError;
use crate::scaler::fit_dimensions;
use crate::screenshot::{save_png, timestamped_filename, ScreenshotError};
use crate::session::{CaptureSession, SessionError};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const REPORT_INTERVAL: Duration = Duration::from_secs(1);
const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors surfaced by subcommands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Loop(#[from] LoopError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Screenshot(#[from] ScreenshotError),
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize monitor list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Recording failed: {0}")]
    RecordingFailed(String),
    #[error("No frame captured within {0:?}")]
    NoFrame(Duration),
    #[error("Config file already exists: {}", .0.display())]
    ConfigExists(PathBuf),
}

/// Global flag for handling Ctrl+C across the application
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Check if Ctrl+C has been received.
pub fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

/// Set up the Ctrl+C handler.
///
/// This should be called once at program startup.
pub fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, stopping...");
    })
}

/// List monitors of `backend` and print them to stdout.
pub fn list_monitors(backend: CaptureBackend, json: bool) -> Result<(), CliError> {
    let mut provider = create_provider(backend)?;
    provider.initialize()?;
    let monitors = provider.enumerate_monitors();
    let desktop = provider.geometry();
    provider.shutdown();

    if json {
        println!("{}", serde_json::to_string_pretty(&monitors)?);
        return Ok(());
    }

    if monitors.is_empty() {
        println!("No monitors found.");
        return Ok(());
    }

    println!("Available monitors ({} backend):", provider.name());
    for monitor in &monitors {
        println!("  {}", monitor);
    }
    println!("  [-1] whole desktop ({})", desktop);
    println!();
    println!("Use --monitor <id> to select a monitor.");
    Ok(())
}

/// Target size for a recording of `capture`. (0, 0) records at capture size.
pub fn recording_size(config: &Config, args: &RecordArgs, capture: Geometry) -> (u32, u32) {
    if let (Some(width), Some(height)) = (args.width, args.height) {
        return (width, height);
    }
    if let (Some(max_width), Some(max_height)) = (args.max_width, args.max_height) {
        if capture.width <= max_width && capture.height <= max_height {
            return (0, 0);
        }
        return fit_dimensions(capture.width, capture.height, max_width, max_height);
    }
    (config.recording.width, config.recording.height)
}

fn create_parent_dir(path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| CliError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// The `--monitor` flag if given, else the configured monitor.
fn selected_monitor(config: &Config, flag: Option<i32>) -> Result<MonitorSelector, CaptureError> {
    match flag {
        Some(id) => MonitorSelector::try_from(id),
        None => config.monitor(),
    }
}

/// Record until Ctrl+C, `--duration`, or an encoder failure.
///
/// Returns the path of the finished recording.
pub fn record(config: &Config, args: RecordArgs) -> Result<PathBuf, CliError> {
    let monitor = selected_monitor(config, args.monitor)?;
    let fps = args.fps.unwrap_or(config.recording.fps);
    let path = args
        .output
        .clone()
        .unwrap_or_else(|| config.next_recording_path());
    create_parent_dir(&path)?;

    let session = CaptureSession::open(config.capture.backend, monitor, config.loop_settings())?;
    let (width, height) = recording_size(config, &args, session.geometry());
    let target = session.start_recording(&path, fps, width, height)?;

    println!(
        "Recording {} at {} fps from {} to {}",
        target.geometry,
        target.fps,
        monitor,
        path.display()
    );
    match args.duration {
        Some(secs) => println!("Stopping after {:.1}s (or Ctrl+C).", secs),
        None => println!("Press Ctrl+C to stop."),
    }

    let started = Instant::now();
    let deadline = args
        .duration
        .map(|secs| started + Duration::from_secs_f64(secs));
    let mut latest = CaptureFrame::default();
    let mut frames_seen: u64 = 0;
    let mut last_report = Instant::now();
    let mut failure = None;

    loop {
        if ctrlc_received() {
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        if let Some(err) = session.take_recording_error() {
            failure = Some(err);
            break;
        }
        if !session.is_recording() {
            break;
        }

        if session.try_take_latest(&mut latest) {
            frames_seen += 1;
        }

        if last_report.elapsed() >= REPORT_INTERVAL {
            let stats = session.stats();
            eprint!(
                "\r[{:>6.1}s] capture {:>5.1} fps, {} frames encoded, {} dropped by preview",
                started.elapsed().as_secs_f64(),
                stats.fps,
                stats.frames_encoded,
                stats.frames_captured.saturating_sub(frames_seen)
            );
            last_report = Instant::now();
        }

        thread::sleep(POLL_INTERVAL);
    }
    eprintln!();

    session.stop_recording();
    session.close();

    if let Some(err) = failure.or_else(|| session.take_recording_error()) {
        return Err(CliError::RecordingFailed(err));
    }

    let stats = session.stats();
    println!(
        "Saved recording: {} ({} frames, {} capture failures)",
        path.display(),
        stats.frames_encoded,
        stats.capture_failures
    );
    Ok(path)
}

/// Capture one frame of `monitor` and write it as PNG.
pub fn screenshot(
    config: &Config,
    output: Option<PathBuf>,
    monitor: Option<i32>,
) -> Result<PathBuf, CliError> {
    let monitor = selected_monitor(config, monitor)?;
    let path = output.unwrap_or_else(|| PathBuf::from(timestamped_filename("screenshot", "png")));

    let session = CaptureSession::open(config.capture.backend, monitor, config.loop_settings())?;
    let mut frame = CaptureFrame::default();
    let captured = session.wait_for_frame(&mut frame, SCREENSHOT_TIMEOUT);
    session.close();
    if !captured {
        return Err(CliError::NoFrame(SCREENSHOT_TIMEOUT));
    }

    save_png(&frame, &path)?;
    println!("Saved screenshot: {} ({})", path.display(), frame.geometry());
    Ok(path)
}

/// Handle config subcommand actions.
pub fn handle_config_action(
    action: ConfigAction,
    config: &Config,
    path: Option<&Path>,
) -> Result<(), CliError> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_path);

    match action {
        ConfigAction::Show => {
            println!("# Current configuration");
            println!("{}", config.to_toml()?);
            if config_path.exists() {
                println!("# Config file: {} (exists)", config_path.display());
            } else {
                println!("# Config file: {} (not found)", config_path.display());
            }
        }
        ConfigAction::Init => {
            if config_path.exists() {
                return Err(CliError::ConfigExists(config_path));
            }
            Config::default().save(&config_path)?;
            println!("Created config file: {}", config_path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_args() -> RecordArgs {
        RecordArgs::default()
    }

    #[test]
    fn test_recording_size_explicit() {
        let args = RecordArgs {
            width: Some(1280),
            height: Some(720),
            ..record_args()
        };
        let size = recording_size(&Config::default(), &args, Geometry::new(1920, 1080));
        assert_eq!(size, (1280, 720));
    }

    #[test]
    fn test_recording_size_fit() {
        let args = RecordArgs {
            max_width: Some(1280),
            max_height: Some(1280),
            ..record_args()
        };
        let size = recording_size(&Config::default(), &args, Geometry::new(1920, 1080));
        assert_eq!(size, (1280, 720));
    }

    #[test]
    fn test_recording_size_fit_never_upscales() {
        let args = RecordArgs {
            max_width: Some(1280),
            max_height: Some(1280),
            ..record_args()
        };
        let size = recording_size(&Config::default(), &args, Geometry::new(640, 480));
        assert_eq!(size, (0, 0));
    }

    #[test]
    fn test_recording_size_from_config() {
        let mut config = Config::default();
        assert_eq!(
            recording_size(&config, &record_args(), Geometry::new(1920, 1080)),
            (0, 0)
        );
        config.recording.width = 800;
        config.recording.height = 600;
        assert_eq!(
            recording_size(&config, &record_args(), Geometry::new(1920, 1080)),
            (800, 600)
        );
    }

    #[test]
    fn test_config_init_then_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screenrec").join("config.toml");
        let config = Config::default();

        handle_config_action(ConfigAction::Init, &config, Some(&path)).unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap(), config);

        let again = handle_config_action(ConfigAction::Init, &config, Some(&path));
        assert!(matches!(again, Err(CliError::ConfigExists(_))));
    }

    #[test]
    fn test_synthetic_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let mut config = Config::default();
        config.capture.backend = CaptureBackend::Synthetic;

        let saved = screenshot(&config, Some(path.clone()), None).unwrap();
        assert_eq!(saved, path);
        let image = image::open(&path).unwrap();
        assert_eq!((image.width(), image.height()), (640, 480));
    }

    #[test]
    fn test_screenshot_missing_monitor() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.capture.backend = CaptureBackend::Synthetic;

        let result = screenshot(&config, Some(dir.path().join("x.png")), Some(3));
        assert!(matches!(
            result,
            Err(CliError::Session(SessionError::Capture(
                CaptureError::InvalidMonitor { .. }
            )))
        ));
    }

    #[test]
    fn test_screenshot_rejects_negative_monitor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.png");
        let mut config = Config::default();
        config.capture.backend = CaptureBackend::Synthetic;

        let result = screenshot(&config, Some(path.clone()), Some(-7));
        assert!(matches!(
            result,
            Err(CliError::Capture(CaptureError::InvalidMonitorId(-7)))
        ));
        assert!(!path.exists());
    }
}
