//! Configuration file handling for screenrec.
//!
//! Loads configuration from `<config dir>/screenrec/config.toml` or a custom path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::capture::{CaptureBackend, CaptureError, MonitorSelector};
use crate::encoder::CodecSettings;
use crate::recorder::LoopSettings;
use crate::screenshot::timestamped_filename;

/// Configuration file structure for screenrec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureSection,
    pub recording: RecordingSection,
    pub encoder: EncoderSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub backend: CaptureBackend,
    /// Monitor id, -1 for the whole desktop
    pub monitor: i32,
    /// Capture rate while not recording
    pub target_fps: u32,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            backend: CaptureBackend::Auto,
            monitor: -1,
            target_fps: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSection {
    pub fps: u32,
    /// 0 records at the capture size
    pub width: u32,
    pub height: u32,
    pub output_dir: PathBuf,
    /// Output file extension, which also selects the container
    pub container: String,
}

impl Default for RecordingSection {
    fn default() -> Self {
        Self {
            fps: 30,
            width: 0,
            height: 0,
            output_dir: PathBuf::from("./recordings"),
            container: "mp4".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSection {
    pub program: String,
    pub codec: String,
    /// An empty string leaves the preset out
    pub preset: Option<String>,
    pub crf: Option<u8>,
    pub pixel_format: String,
    pub finalize_timeout_secs: u64,
}

impl Default for EncoderSection {
    fn default() -> Self {
        let codec = CodecSettings::default();
        Self {
            program: "ffmpeg".to_string(),
            codec: codec.codec,
            preset: codec.preset,
            crf: codec.crf,
            pixel_format: codec.pixel_format,
            finalize_timeout_secs: 10,
        }
    }
}

impl EncoderSection {
    pub fn codec_settings(&self) -> CodecSettings {
        CodecSettings {
            codec: self.codec.clone(),
            preset: self.preset.clone().filter(|p| !p.is_empty()),
            crf: self.crf,
            pixel_format: self.pixel_format.clone(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// With no explicit path, a missing default file yields the defaults.
    /// An explicit path must exist. A file that exists but cannot be parsed
    /// is always an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigError::NotFound(path));
            }
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            path: path.clone(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        config.validate()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.target_fps == 0 {
            return Err(ConfigError::Invalid(
                "capture.target_fps must be greater than 0".to_string(),
            ));
        }
        if self.capture.monitor < -1 {
            return Err(ConfigError::Invalid(format!(
                "capture.monitor must be -1 or a monitor id, got {}",
                self.capture.monitor
            )));
        }
        if self.recording.fps == 0 {
            return Err(ConfigError::Invalid(
                "recording.fps must be greater than 0".to_string(),
            ));
        }
        if (self.recording.width == 0) != (self.recording.height == 0) {
            return Err(ConfigError::Invalid(
                "recording.width and recording.height must both be 0 or both be set".to_string(),
            ));
        }
        if self.recording.container.is_empty() {
            return Err(ConfigError::Invalid(
                "recording.container must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn monitor(&self) -> Result<MonitorSelector, CaptureError> {
        MonitorSelector::try_from(self.capture.monitor)
    }

    /// Capture loop settings derived from this configuration.
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            target_fps: self.capture.target_fps,
            codec: self.encoder.codec_settings(),
            encoder_program: self.encoder.program.clone(),
            finalize_timeout: Duration::from_secs(self.encoder.finalize_timeout_secs),
        }
    }

    /// A fresh timestamped recording path inside `output_dir`.
    pub fn next_recording_path(&self) -> PathBuf {
        self.recording
            .output_dir
            .join(timestamped_filename("recording", &self.recording.container))
    }
}

/// Errors that can occur when loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file '{}' not found", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to access config file '{}': {source}", .path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[source] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("screenrec")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.capture.backend, CaptureBackend::Auto);
        assert_eq!(config.monitor().unwrap(), MonitorSelector::VirtualDesktop);
        assert_eq!(config.recording.fps, 30);
        assert_eq!(config.encoder.codec, "libx264");
        assert_eq!(config.encoder.preset.as_deref(), Some("medium"));
        assert_eq!(config.encoder.crf, Some(23));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[capture]\nbackend = \"synthetic\"\nmonitor = 1\n\n[recording]\nfps = 24"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.capture.backend, CaptureBackend::Synthetic);
        assert_eq!(config.monitor().unwrap(), MonitorSelector::Monitor(1));
        assert_eq!(config.capture.target_fps, 60);
        assert_eq!(config.recording.fps, 24);
        assert_eq!(config.recording.container, "mp4");
        assert_eq!(config.encoder.program, "ffmpeg");
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("nope.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[capture\nbackend = ").unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[capture]\nbackend = \"wayland\"").unwrap();
        assert!(Config::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_half_specified_size_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[recording]\nwidth = 1280").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_monitor_below_sentinel_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[capture]\nmonitor = -3").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));

        let mut config = Config::default();
        config.capture.monitor = -3;
        assert!(matches!(
            config.monitor(),
            Err(CaptureError::InvalidMonitorId(-3))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");
        let mut config = Config::default();
        config.capture.monitor = 2;
        config.encoder.crf = Some(18);
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_loop_settings_from_config() {
        let mut config = Config::default();
        config.capture.target_fps = 30;
        config.encoder.finalize_timeout_secs = 3;
        let settings = config.loop_settings();
        assert_eq!(settings.target_fps, 30);
        assert_eq!(settings.finalize_timeout, Duration::from_secs(3));
        assert_eq!(settings.codec, CodecSettings::default());

        config.encoder.preset = Some(String::new());
        assert_eq!(config.loop_settings().codec.preset, None);
    }

    #[test]
    fn test_next_recording_path() {
        let config = Config::default();
        let path = config.next_recording_path();
        assert!(path.starts_with("./recordings"));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp4"));
    }
}
