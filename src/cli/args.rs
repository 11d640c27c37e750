//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::capture::CaptureBackend;

/// Parse and validate framerate (1-120 fps)
fn parse_framerate(s: &str) -> Result<u32, String> {
    let fps: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid framerate", s))?;
    if !(1..=120).contains(&fps) {
        return Err(format!(
            "Framerate must be between 1 and 120 fps, got {}",
            fps
        ));
    }
    Ok(fps)
}

/// Parse and validate a frame dimension (2-7680 pixels)
fn parse_dimension(s: &str) -> Result<u32, String> {
    let value: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid size", s))?;
    if !(2..=7680).contains(&value) {
        return Err(format!(
            "Size must be between 2 and 7680 pixels, got {}",
            value
        ));
    }
    Ok(value)
}

/// Parse a monitor id (-1 for the whole desktop)
fn parse_monitor(s: &str) -> Result<i32, String> {
    let id: i32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid monitor id", s))?;
    if id < -1 {
        return Err(format!(
            "Monitor id must be -1 (whole desktop) or 0 and up, got {}",
            id
        ));
    }
    Ok(id)
}

/// Parse a duration in seconds (fractions allowed)
fn parse_seconds(s: &str) -> Result<f64, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number of seconds", s))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("Duration must be positive, got {}", s));
    }
    Ok(secs)
}

/// screenrec: screen capture and recording through ffmpeg
#[derive(Parser, Debug)]
#[command(name = "screenrec")]
#[command(version, about = "Capture the screen and record it with ffmpeg", long_about = None)]
#[command(after_help = "EXAMPLES:
    # List monitors
    screenrec monitors

    # Record the whole desktop until Ctrl+C
    screenrec record

    # Record monitor 1 for 10 seconds, scaled to fit 1280x1280
    screenrec record --monitor 1 --duration 10 --max-width 1280 --max-height 1280

    # Save a PNG of the primary monitor
    screenrec screenshot --monitor 0 -o shot.png")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Capture backend: auto, x11, gdi, synthetic
    #[arg(long, global = true)]
    pub backend: Option<CaptureBackend>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List monitors available for capture
    Monitors {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record the screen to a video file
    Record(RecordArgs),
    /// Save a single frame as PNG
    Screenshot {
        /// Output file (default: screenshot_<timestamp>.png)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Monitor id, -1 for the whole desktop
        #[arg(long, short, allow_negative_numbers = true, value_parser = parse_monitor)]
        monitor: Option<i32>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct RecordArgs {
    /// Output file (default: <output_dir>/recording_<timestamp>.<container>)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Monitor id, -1 for the whole desktop
    #[arg(long, short, allow_negative_numbers = true, value_parser = parse_monitor)]
    pub monitor: Option<i32>,

    /// Recording framerate (1-120)
    #[arg(long, value_parser = parse_framerate)]
    pub fps: Option<u32>,

    /// Output width (requires --height)
    #[arg(long, requires = "height", value_parser = parse_dimension,
          conflicts_with_all = ["max_width", "max_height"])]
    pub width: Option<u32>,

    /// Output height (requires --width)
    #[arg(long, requires = "width", value_parser = parse_dimension)]
    pub height: Option<u32>,

    /// Scale down to fit this width, keeping the aspect ratio
    #[arg(long, requires = "max_height", value_parser = parse_dimension)]
    pub max_width: Option<u32>,

    /// Scale down to fit this height, keeping the aspect ratio
    #[arg(long, requires = "max_width", value_parser = parse_dimension)]
    pub max_height: Option<u32>,

    /// Stop after this many seconds
    #[arg(long, short, value_parser = parse_seconds)]
    pub duration: Option<f64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
