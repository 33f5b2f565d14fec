//! Heavy analyzer collaborator and the per-face results it produces.

use crate::frame::Frame;
use crate::geometry::DetectionBox;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Keys for the two analysis capabilities
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerCredentials {
    /// Key for face attribute detection
    pub face_key: String,
    /// Key for emotion scoring
    pub emotion_key: String,
}

impl AnalyzerCredentials {
    /// Create credentials from the two keys
    #[must_use]
    pub fn new(face_key: impl Into<String>, emotion_key: impl Into<String>) -> Self {
        Self {
            face_key: face_key.into(),
            emotion_key: emotion_key.into(),
        }
    }

    /// Check that both keys are present
    ///
    /// # Errors
    ///
    /// Returns `MissingCredentials` naming the first blank key
    pub fn validate(&self) -> Result<()> {
        if self.face_key.trim().is_empty() {
            return Err(Error::MissingCredentials("face key is empty".to_string()));
        }
        if self.emotion_key.trim().is_empty() {
            return Err(Error::MissingCredentials("emotion key is empty".to_string()));
        }
        Ok(())
    }
}

// Keys never show up in logs
impl fmt::Debug for AnalyzerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerCredentials")
            .field("face_key", &"<redacted>")
            .field("emotion_key", &"<redacted>")
            .finish()
    }
}

/// Attributes estimated for one face
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceAttributes {
    /// Estimated age in years
    pub age: f64,
    /// Estimated gender label
    pub gender: String,
    /// Smile intensity in `[0, 1]`
    pub smile: f64,
    /// Glasses label, e.g. `NoGlasses` or `ReadingGlasses`
    pub glasses: String,
}

/// Emotion confidence scores for one face
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EmotionScores {
    pub anger: f32,
    pub contempt: f32,
    pub disgust: f32,
    pub fear: f32,
    pub happiness: f32,
    pub neutral: f32,
    pub sadness: f32,
    pub surprise: f32,
}

impl EmotionScores {
    /// Scores paired with their names, in a fixed order
    #[must_use]
    pub fn ranked(&self) -> [(&'static str, f32); 8] {
        [
            ("anger", self.anger),
            ("contempt", self.contempt),
            ("disgust", self.disgust),
            ("fear", self.fear),
            ("happiness", self.happiness),
            ("neutral", self.neutral),
            ("sadness", self.sadness),
            ("surprise", self.surprise),
        ]
    }

    /// Highest scoring emotion; ties resolve to the earliest name
    #[must_use]
    pub fn dominant(&self) -> (&'static str, f32) {
        self.ranked()
            .into_iter()
            .fold(("neutral", f32::NEG_INFINITY), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            })
    }
}

/// Downscaled PNG of the frame that was submitted for analysis
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// PNG bytes; not part of the serialized form
    #[serde(skip)]
    pub png: Vec<u8>,
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thumbnail")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("png_bytes", &self.png.len())
            .finish()
    }
}

/// Rich analysis of one face.
///
/// Results carry no identity across cycles; each result set replaces the
/// previous one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceResult {
    /// Analyzer-assigned identifier, unique within one result set
    pub face_id: String,
    /// Face rectangle as located by the analyzer
    pub face_rect: DetectionBox,
    /// Estimated attributes, if requested and available
    pub attributes: Option<FaceAttributes>,
    /// Emotion scores, if available
    pub emotion: Option<EmotionScores>,
    /// Image submitted for this analysis
    pub thumbnail: Option<Thumbnail>,
}

/// Slow, rich per-face analysis
#[async_trait]
pub trait HeavyAnalyzer: Send + Sync {
    /// Analyse a frame. Results are matched by the analyzer's own geometry
    /// and need not correspond to the local detector's boxes.
    async fn analyze(&self, frame: &Frame, credentials: &AnalyzerCredentials) -> Result<Vec<FaceResult>>;

    /// Release analyzer resources
    async fn close(&self) {}
}
