//! Error types for the face watch pipeline.

use crate::frame::PixelFormat;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// The capture device reported a failure
    #[error("Capture device failure (0x{code:X}): {message}")]
    DeviceFault {
        /// Device-specific error code
        code: u32,
        /// Human readable description from the device
        message: String,
    },

    /// No capture device could be enumerated
    #[error("No capture device available")]
    NoCamera,

    /// Analyzer credentials are absent or empty
    #[error("Missing analyzer credentials: {0}")]
    MissingCredentials(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pulling a frame from the source failed
    #[error("Frame pull failed: {0}")]
    FramePull(String),

    /// A frame arrived in an encoding the consumer cannot process
    #[error("Unsupported pixel format: {0}")]
    UnsupportedPixelFormat(PixelFormat),

    /// Local face detection failed
    #[error("Local detection failed: {0}")]
    Detection(String),

    /// Heavy analysis failed
    #[error("Analysis failed: {0}")]
    Analysis(String),

    /// Heavy analysis did not answer in time
    #[error("Analysis timed out after {0:?}")]
    AnalysisTimeout(Duration),

    /// Handing results to the sink failed
    #[error("Result dispatch failed: {0}")]
    Dispatch(String),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not allowed in the current pipeline state
    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),

    /// An internal channel was closed while still in use
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image processing operation failed
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON serialization failed
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a failure affects the running pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Device failure: the pipeline is torn down and reinitialized
    Device,
    /// Failure inside one cycle: logged, the cycle yields no result
    TransientCycle,
    /// Setup failure: surfaced to the caller, the pipeline does not start
    Config,
}

impl Error {
    /// Classify the error by its effect on the pipeline
    #[must_use]
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::DeviceFault { .. } => FaultKind::Device,
            Self::NoCamera | Self::MissingCredentials(_) | Self::ConfigError(_) | Self::InvalidState(_) => {
                FaultKind::Config
            }
            _ => FaultKind::TransientCycle,
        }
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_classification() {
        let device = Error::DeviceFault {
            code: 0xC00D_3704,
            message: "hardware lost".to_string(),
        };
        assert_eq!(device.kind(), FaultKind::Device);
        assert_eq!(Error::NoCamera.kind(), FaultKind::Config);
        assert_eq!(Error::MissingCredentials("face".into()).kind(), FaultKind::Config);
        assert_eq!(Error::FramePull("busy".into()).kind(), FaultKind::TransientCycle);
        assert_eq!(
            Error::AnalysisTimeout(Duration::from_secs(1)).kind(),
            FaultKind::TransientCycle
        );
    }

    #[test]
    fn test_device_fault_message_uses_hex_code() {
        let err = Error::DeviceFault {
            code: 0xFF,
            message: "gone".to_string(),
        };
        assert_eq!(err.to_string(), "Capture device failure (0xFF): gone");
    }
}
