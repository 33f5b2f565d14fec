//! Coordinate mapping between source-frame pixels and the presentation surface.
//!
//! Source frames always report the sensor's native dimensions. Under a
//! portrait display orientation the image appears rotated a quarter turn, so
//! every function here swaps the stream width and height before scaling.
//!
//! Mirroring is never applied per rectangle. The overlay as a whole is flipped
//! through its [`FlowDirection`], which keeps boxes from being flipped twice.

use crate::constants::GEOMETRY_EPSILON;
use crate::orientation::{rotation_degrees, DisplayOrientation};
use serde::{Deserialize, Serialize};

/// Pixel dimensions of a video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Either side is zero
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Dimensions as the display sees them under `orientation`
    #[must_use]
    pub const fn oriented(self, orientation: DisplayOrientation) -> Self {
        if orientation.is_portrait() {
            Self::new(self.height, self.width)
        } else {
            self
        }
    }
}

/// Size of a surface in device-independent units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Size {
    /// Create a new size
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Usable as a layout target: both sides finite and at least one unit
    #[must_use]
    pub fn is_renderable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width >= 1.0 && self.height >= 1.0
    }
}

/// Axis-aligned rectangle in surface coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// No area to draw
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Right edge
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Center point
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether `other` lies inside this rectangle, allowing rounding slack
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        other.x >= self.x - GEOMETRY_EPSILON
            && other.y >= self.y - GEOMETRY_EPSILON
            && other.right() <= self.right() + GEOMETRY_EPSILON
            && other.bottom() <= self.bottom() + GEOMETRY_EPSILON
    }
}

/// Face bounding box in source-frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DetectionBox {
    /// Left edge in pixels
    pub x: u32,
    /// Top edge in pixels
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl DetectionBox {
    /// Create a new detection box
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Horizontal flow of the overlay layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlowDirection {
    /// Unmirrored
    #[default]
    LeftToRight,
    /// Mirrored around the vertical axis
    RightToLeft,
}

impl FlowDirection {
    /// Flow direction for a mirrored or unmirrored preview
    #[must_use]
    pub const fn for_mirroring(mirrored: bool) -> Self {
        if mirrored {
            Self::RightToLeft
        } else {
            Self::LeftToRight
        }
    }
}

/// Placement of the overlay layer on the surface
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OverlayTransform {
    /// Clockwise rotation about the center of `bounds`
    pub angle_degrees: u32,
    /// Overlay bounds before rotation; `x`/`y` is the origin
    pub bounds: Rect,
    /// Global mirror applied to the whole overlay
    pub flow: FlowDirection,
}

/// Rectangle of the surface actually covered by the video after uniform fit.
///
/// The stream keeps its aspect ratio and is centered, leaving equal margins on
/// the letterboxed axis. A surface narrower than one unit on either side, or
/// an empty stream, yields an empty rectangle.
#[must_use]
pub fn compute_presentation_area(stream: Dimensions, surface: Size, orientation: DisplayOrientation) -> Rect {
    if stream.is_empty() || !surface.is_renderable() {
        return Rect::default();
    }

    let oriented = stream.oriented(orientation);
    let stream_width = f64::from(oriented.width);
    let stream_height = f64::from(oriented.height);

    // Surface "wider" than the stream: bars left and right
    if surface.width / surface.height > stream_width / stream_height {
        let scaled_width = stream_width * (surface.height / stream_height);
        Rect::new((surface.width - scaled_width) / 2.0, 0.0, scaled_width, surface.height)
    } else {
        let scaled_height = stream_height * (surface.width / stream_width);
        Rect::new(0.0, (surface.height - scaled_height) / 2.0, surface.width, scaled_height)
    }
}

/// Map a detection box from stream pixels into surface coordinates
#[must_use]
pub fn map_box(
    bbox: &DetectionBox,
    stream: Dimensions,
    presentation: &Rect,
    orientation: DisplayOrientation,
) -> Rect {
    if stream.is_empty() || presentation.is_empty() {
        return Rect::default();
    }

    let oriented = stream.oriented(orientation);
    let scale_x = presentation.width / f64::from(oriented.width);
    let scale_y = presentation.height / f64::from(oriented.height);

    Rect::new(
        presentation.x + f64::from(bbox.x) * scale_x,
        presentation.y + f64::from(bbox.y) * scale_y,
        f64::from(bbox.width) * scale_x,
        f64::from(bbox.height) * scale_y,
    )
}

/// Rotation, bounds and mirroring for the overlay layer.
///
/// For portrait orientations the overlay is laid out with width and height
/// swapped and its origin shifted by half the difference on each axis, so
/// after the quarter-turn rotation it still covers the presentation area.
#[must_use]
pub fn compute_overlay_rotation_and_bounds(
    orientation: DisplayOrientation,
    mirrored: bool,
    presentation: &Rect,
) -> OverlayTransform {
    let bounds = if orientation.is_portrait() {
        Rect::new(
            presentation.x - (presentation.height - presentation.width) / 2.0,
            presentation.y - (presentation.width - presentation.height) / 2.0,
            presentation.height,
            presentation.width,
        )
    } else {
        *presentation
    };

    OverlayTransform {
        angle_degrees: rotation_degrees(orientation, mirrored),
        bounds,
        flow: FlowDirection::for_mirroring(mirrored),
    }
}
