//! Constants used throughout the pipeline

use crate::frame::PixelFormat;

/// Default period between capture ticks (5 fps)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 200;

/// Fastest supported tick period (~15 fps)
pub const MIN_TICK_INTERVAL_MS: u64 = 66;

/// Slowest supported tick period
pub const MAX_TICK_INTERVAL_MS: u64 = 200;

/// Encoding requested for the local detection pull
pub const FAST_PIXEL_FORMAT: PixelFormat = PixelFormat::Nv12;

/// Encoding requested for the heavy analysis pull
pub const ANALYSIS_PIXEL_FORMAT: PixelFormat = PixelFormat::Bgra8;

/// Upper bound on one heavy analysis round trip
pub const DEFAULT_ANALYSIS_TIMEOUT_MS: u64 = 10_000;

/// Longest side of the thumbnail attached to analysis results
pub const DEFAULT_THUMBNAIL_MAX_SIDE: u32 = 160;

/// Stroke width of face highlight rectangles
pub const DEFAULT_STROKE_THICKNESS: f64 = 2.0;

/// Degrees in a full rotation
pub const FULL_TURN_DEGREES: u32 = 360;

/// Tolerance for floating point geometry comparisons
pub const GEOMETRY_EPSILON: f64 = 1e-6;
