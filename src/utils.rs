//! Utility functions for detection boxes and frame conversion.

pub mod image_conversion;
pub mod safe_cast;

use crate::geometry::{DetectionBox, Dimensions};

/// Clip boxes to the frame and drop those left without area.
///
/// Detectors may report faces partially outside the frame; clipping keeps the
/// overlay inside the presentation area. Order is preserved.
#[must_use]
pub fn clamp_boxes(boxes: Vec<DetectionBox>, frame: Dimensions) -> Vec<DetectionBox> {
    boxes
        .into_iter()
        .filter_map(|bbox| {
            if bbox.x >= frame.width || bbox.y >= frame.height {
                return None;
            }
            let width = bbox.width.min(frame.width - bbox.x);
            let height = bbox.height.min(frame.height - bbox.y);
            (width > 0 && height > 0).then(|| DetectionBox::new(bbox.x, bbox.y, width, height))
        })
        .collect()
}
