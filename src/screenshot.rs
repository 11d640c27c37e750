//! Still image export of captured frames.

use std::path::{Path, PathBuf};

use chrono::Local;
use image::{ImageFormat, RgbImage};
use thiserror::Error;

use crate::frame::CaptureFrame;

/// Errors that can occur while writing a screenshot.
#[derive(Debug, Error)]
pub enum ScreenshotError {
    #[error("Cannot save an empty frame")]
    EmptyFrame,
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
}

/// `<prefix>_<YYYY-mm-dd_HHMMSS>.<extension>` in local time.
pub fn timestamped_filename(prefix: &str, extension: &str) -> String {
    format!(
        "{}_{}.{}",
        prefix,
        Local::now().format("%Y-%m-%d_%H%M%S"),
        extension
    )
}

/// Write `frame` as a PNG, creating parent directories as needed.
pub fn save_png(frame: &CaptureFrame, path: &Path) -> Result<(), ScreenshotError> {
    if frame.is_empty() || frame.geometry().is_empty() {
        return Err(ScreenshotError::EmptyFrame);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ScreenshotError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let image = RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or(ScreenshotError::EmptyFrame)?;
    image.save_with_format(path, ImageFormat::Png)?;

    log::info!("Screenshot saved: {} ({})", path.display(), frame.geometry());
    Ok(())
}
