//! Local face detector collaborator and its invocation on the preview stream.

use crate::frame::{Frame, PixelFormat};
use crate::geometry::DetectionBox;
use crate::source::{FrameSource, StreamProperties};
use crate::{Error, Result};
use async_trait::async_trait;

/// Fast on-device face geometry detector
#[async_trait]
pub trait LocalDetector: Send {
    /// Encodings the detector can process, preferred first
    fn supported_formats(&self) -> &[PixelFormat];

    /// Whether frames in `format` can be submitted
    fn is_format_supported(&self, format: PixelFormat) -> bool {
        self.supported_formats().contains(&format)
    }

    /// Detect faces, returning boxes in source-frame pixels
    async fn process_frame(&mut self, frame: &Frame) -> Result<Vec<DetectionBox>>;
}

/// Pull one preview frame in the detector's encoding and run detection on it.
///
/// The frame is dropped, and its buffer returned, before this function
/// returns.
///
/// # Errors
///
/// Returns the pull or detection error, or `UnsupportedPixelFormat` if the
/// detector declares no encoding or the source answers with a different one.
pub async fn detect_on_preview(
    source: &mut dyn FrameSource,
    detector: &mut dyn LocalDetector,
    stream: StreamProperties,
) -> Result<Vec<DetectionBox>> {
    let format = detector
        .supported_formats()
        .first()
        .copied()
        .ok_or(Error::UnsupportedPixelFormat(stream.format))?;

    let frame = source.pull_frame(format, stream.width, stream.height).await?;

    // Sources may silently convert; only submit what the detector accepts
    if !detector.is_format_supported(frame.format()) {
        return Err(Error::UnsupportedPixelFormat(frame.format()));
    }

    detector.process_frame(&frame).await
}
