//! Configuration management for the face watch pipeline

use crate::constants::{
    DEFAULT_ANALYSIS_TIMEOUT_MS, DEFAULT_STROKE_THICKNESS, DEFAULT_THUMBNAIL_MAX_SIDE, DEFAULT_TICK_INTERVAL_MS,
    MAX_TICK_INTERVAL_MS, MIN_TICK_INTERVAL_MS,
};
use crate::overlay::{Color, OverlayStyle};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture scheduling and device selection
    pub capture: CaptureConfig,

    /// Heavy analysis settings
    pub analysis: AnalysisConfig,

    /// Highlight styling
    pub overlay: OverlayConfig,

    /// Where analysis results go
    pub sink: SinkConfig,
}

/// Capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Period between capture ticks in milliseconds (66-200)
    pub tick_interval_ms: u64,

    /// Index of the device to open in the enumerated list
    pub device_index: usize,

    /// Stream width used when the device does not report one
    pub stream_width: u32,

    /// Stream height used when the device does not report one
    pub stream_height: u32,
}

/// How long a capture cycle holds the gate when it requests analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Gate released once the analysis is submitted
    #[default]
    Detached,
    /// Gate held until the analysis finishes or times out
    Inline,
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detached => write!(f, "detached"),
            Self::Inline => write!(f, "inline"),
        }
    }
}

/// Heavy analysis configuration
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Subscription key of the face service
    pub face_key: String,

    /// Subscription key of the emotion service
    pub emotion_key: String,

    /// Gate scope while analysing
    pub mode: AnalysisMode,

    /// Upper bound on one analysis round trip in milliseconds
    pub timeout_ms: u64,

    /// Longest side of the thumbnail attached to results
    pub thumbnail_max_side: u32,
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("face_key", &"<redacted>")
            .field("emotion_key", &"<redacted>")
            .field("mode", &self.mode)
            .field("timeout_ms", &self.timeout_ms)
            .field("thumbnail_max_side", &self.thumbnail_max_side)
            .finish()
    }
}

/// Overlay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Stroke width of highlight rectangles
    pub stroke_thickness: f64,

    /// Stroke of the first face
    pub primary_color: Color,

    /// Stroke of every other face
    pub secondary_color: Color,
}

/// Destination of analysis results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// JSON lines on standard output
    #[default]
    Stdout,
    /// One summary log line per result set
    Log,
    /// Results are discarded
    None,
}

/// Sink configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Sink to dispatch results to
    pub kind: SinkKind,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            device_index: 0,
            stream_width: 1280,
            stream_height: 720,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            face_key: "demo-face-key".to_string(),
            emotion_key: "demo-emotion-key".to_string(),
            mode: AnalysisMode::Detached,
            timeout_ms: DEFAULT_ANALYSIS_TIMEOUT_MS,
            thumbnail_max_side: DEFAULT_THUMBNAIL_MAX_SIDE,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            stroke_thickness: DEFAULT_STROKE_THICKNESS,
            primary_color: Color::BLUE,
            secondary_color: Color::DEEP_SKY_BLUE,
        }
    }
}

impl OverlayConfig {
    /// Renderer style described by this section
    #[must_use]
    pub fn style(&self) -> OverlayStyle {
        OverlayStyle {
            primary: self.primary_color,
            secondary: self.secondary_color,
            thickness: self.stroke_thickness,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read or `ConfigError` if it does not parse
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the text does not parse
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Period between capture ticks
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.capture.tick_interval_ms)
    }

    /// Upper bound on one analysis round trip
    #[must_use]
    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis.timeout_ms)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for out-of-range values and
    /// `MissingCredentials` for empty analyzer keys
    pub fn validate(&self) -> Result<()> {
        if !(MIN_TICK_INTERVAL_MS..=MAX_TICK_INTERVAL_MS).contains(&self.capture.tick_interval_ms) {
            return Err(Error::ConfigError(format!(
                "Tick interval must be between {MIN_TICK_INTERVAL_MS} and {MAX_TICK_INTERVAL_MS} ms, got {}",
                self.capture.tick_interval_ms
            )));
        }
        if self.capture.stream_width == 0 || self.capture.stream_height == 0 {
            return Err(Error::ConfigError("Stream size must be non-zero".to_string()));
        }

        // Validate analysis settings
        if self.analysis.face_key.trim().is_empty() {
            return Err(Error::MissingCredentials("face key is empty".to_string()));
        }
        if self.analysis.emotion_key.trim().is_empty() {
            return Err(Error::MissingCredentials("emotion key is empty".to_string()));
        }
        if self.analysis.timeout_ms == 0 {
            return Err(Error::ConfigError("Analysis timeout must be greater than 0".to_string()));
        }
        if self.analysis.thumbnail_max_side == 0 {
            return Err(Error::ConfigError(
                "Thumbnail size must be greater than 0".to_string(),
            ));
        }

        if !self.overlay.stroke_thickness.is_finite() || self.overlay.stroke_thickness <= 0.0 {
            return Err(Error::ConfigError(
                "Stroke thickness must be a positive number".to_string(),
            ));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Face Watch Configuration

# Capture scheduling
capture:
  tick_interval_ms: 200
  device_index: 0
  stream_width: 1280
  stream_height: 720

# Heavy analysis
analysis:
  face_key: "demo-face-key"
  emotion_key: "demo-emotion-key"
  mode: "detached"
  timeout_ms: 10000
  thumbnail_max_side: 160

# Highlight styling
overlay:
  stroke_thickness: 2.0
  primary_color: { r: 0, g: 0, b: 255 }
  secondary_color: { r: 0, g: 191, b: 255 }

# Result sink: stdout, log or none
sink:
  kind: "stdout"
"#;
