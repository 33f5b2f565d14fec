//! Display and device orientation tracking.
//!
//! Orientation is written from sensor and display callbacks and read by every
//! capture cycle. The whole state is packed into one atomic word so a reader
//! always gets a consistent snapshot without taking a lock.

use crate::constants::FULL_TURN_DEGREES;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Orientation of the application on the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayOrientation {
    /// Native landscape
    #[default]
    Landscape,
    /// Rotated a quarter turn into portrait
    Portrait,
    /// Upside-down landscape
    LandscapeFlipped,
    /// Upside-down portrait
    PortraitFlipped,
}

impl DisplayOrientation {
    /// Rotation of the display in degrees
    #[must_use]
    pub const fn degrees(self) -> u32 {
        match self {
            Self::Landscape => 0,
            Self::Portrait => 90,
            Self::LandscapeFlipped => 180,
            Self::PortraitFlipped => 270,
        }
    }

    /// Whether stream width and height appear swapped on screen
    #[must_use]
    pub const fn is_portrait(self) -> bool {
        matches!(self, Self::Portrait | Self::PortraitFlipped)
    }

    const fn to_bits(self) -> u32 {
        match self {
            Self::Landscape => 0,
            Self::Portrait => 1,
            Self::LandscapeFlipped => 2,
            Self::PortraitFlipped => 3,
        }
    }

    const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            1 => Self::Portrait,
            2 => Self::LandscapeFlipped,
            3 => Self::PortraitFlipped,
            _ => Self::Landscape,
        }
    }
}

/// Physical orientation reported by the device sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOrientation {
    /// Upright
    #[default]
    NotRotated,
    /// Rotated 90 degrees counter-clockwise
    Rotated90CounterClockwise,
    /// Rotated 180 degrees
    Rotated180,
    /// Rotated 270 degrees counter-clockwise
    Rotated270CounterClockwise,
    /// Lying flat, screen up
    FaceUp,
    /// Lying flat, screen down
    FaceDown,
}

impl DeviceOrientation {
    /// Flat orientations say nothing about how the user holds the device
    #[must_use]
    pub const fn is_flat(self) -> bool {
        matches!(self, Self::FaceUp | Self::FaceDown)
    }

    const fn to_bits(self) -> u32 {
        match self {
            Self::NotRotated => 0,
            Self::Rotated90CounterClockwise => 1,
            Self::Rotated180 => 2,
            Self::Rotated270CounterClockwise => 3,
            Self::FaceUp => 4,
            Self::FaceDown => 5,
        }
    }

    const fn from_bits(bits: u32) -> Self {
        match bits & 0b111 {
            1 => Self::Rotated90CounterClockwise,
            2 => Self::Rotated180,
            3 => Self::Rotated270CounterClockwise,
            4 => Self::FaceUp,
            5 => Self::FaceDown,
            _ => Self::NotRotated,
        }
    }
}

/// Rotation to apply for a display orientation, inverted when mirrored
#[must_use]
pub const fn rotation_degrees(orientation: DisplayOrientation, mirrored: bool) -> u32 {
    let degrees = orientation.degrees();
    if mirrored {
        (FULL_TURN_DEGREES - degrees) % FULL_TURN_DEGREES
    } else {
        degrees
    }
}

/// One consistent view of the orientation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrientationState {
    /// Current display orientation
    pub display: DisplayOrientation,
    /// Last non-flat device orientation
    pub device: DeviceOrientation,
    /// Active camera faces the viewer
    pub mirrored: bool,
    /// Active camera is not mounted on the device
    pub external_camera: bool,
}

impl OrientationState {
    /// Rotation for the overlay and preview stream
    #[must_use]
    pub const fn rotation_degrees(&self) -> u32 {
        rotation_degrees(self.display, self.mirrored)
    }

    fn pack(self) -> u32 {
        self.display.to_bits()
            | (self.device.to_bits() << 2)
            | (u32::from(self.mirrored) << 5)
            | (u32::from(self.external_camera) << 6)
    }

    fn unpack(bits: u32) -> Self {
        Self {
            display: DisplayOrientation::from_bits(bits),
            device: DeviceOrientation::from_bits(bits >> 2),
            mirrored: bits & (1 << 5) != 0,
            external_camera: bits & (1 << 6) != 0,
        }
    }
}

/// Lock-free holder of the current orientation state
#[derive(Debug)]
pub struct OrientationTracker {
    packed: AtomicU32,
}

impl Default for OrientationTracker {
    fn default() -> Self {
        Self::new(OrientationState::default())
    }
}

impl OrientationTracker {
    /// Create a tracker seeded with an initial state
    #[must_use]
    pub fn new(initial: OrientationState) -> Self {
        Self {
            packed: AtomicU32::new(initial.pack()),
        }
    }

    /// Read the current state
    #[must_use]
    pub fn snapshot(&self) -> OrientationState {
        OrientationState::unpack(self.packed.load(Ordering::Acquire))
    }

    /// Record a new display orientation
    pub fn set_display(&self, display: DisplayOrientation) {
        self.update(|state| state.display = display);
    }

    /// Record a device orientation reading.
    ///
    /// Flat readings are ignored so the last upright orientation is kept.
    /// Returns whether the reading was stored.
    pub fn observe_device(&self, device: DeviceOrientation) -> bool {
        if device.is_flat() {
            return false;
        }
        self.update(|state| state.device = device);
        true
    }

    /// Record the placement of the active camera
    pub fn set_camera(&self, mirrored: bool, external_camera: bool) {
        self.update(|state| {
            state.mirrored = mirrored;
            state.external_camera = external_camera;
        });
    }

    /// Rotation to tag the preview stream with, `None` for external cameras
    #[must_use]
    pub fn preview_rotation(&self) -> Option<u32> {
        let state = self.snapshot();
        if state.external_camera {
            None
        } else {
            Some(state.rotation_degrees())
        }
    }

    fn update(&self, apply: impl Fn(&mut OrientationState)) {
        // The closure never returns None, so fetch_update cannot fail
        let _ = self
            .packed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let mut state = OrientationState::unpack(bits);
                apply(&mut state);
                Some(state.pack())
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_degrees() {
        assert_eq!(DisplayOrientation::Landscape.degrees(), 0);
        assert_eq!(DisplayOrientation::Portrait.degrees(), 90);
        assert_eq!(DisplayOrientation::LandscapeFlipped.degrees(), 180);
        assert_eq!(DisplayOrientation::PortraitFlipped.degrees(), 270);
    }

    #[test]
    fn test_mirrored_rotation_is_inverted() {
        assert_eq!(rotation_degrees(DisplayOrientation::Landscape, true), 0);
        assert_eq!(rotation_degrees(DisplayOrientation::Portrait, true), 270);
        assert_eq!(rotation_degrees(DisplayOrientation::LandscapeFlipped, true), 180);
        assert_eq!(rotation_degrees(DisplayOrientation::PortraitFlipped, true), 90);
    }

    #[test]
    fn test_pack_roundtrip_all_states() {
        let displays = [
            DisplayOrientation::Landscape,
            DisplayOrientation::Portrait,
            DisplayOrientation::LandscapeFlipped,
            DisplayOrientation::PortraitFlipped,
        ];
        for display in displays {
            for mirrored in [false, true] {
                let state = OrientationState {
                    display,
                    device: DeviceOrientation::Rotated180,
                    mirrored,
                    external_camera: !mirrored,
                };
                assert_eq!(OrientationState::unpack(state.pack()), state);
            }
        }
    }

    #[test]
    fn test_flat_device_readings_ignored() {
        let tracker = OrientationTracker::default();
        assert!(tracker.observe_device(DeviceOrientation::Rotated90CounterClockwise));
        assert!(!tracker.observe_device(DeviceOrientation::FaceUp));
        assert!(!tracker.observe_device(DeviceOrientation::FaceDown));
        assert_eq!(
            tracker.snapshot().device,
            DeviceOrientation::Rotated90CounterClockwise
        );
    }

    #[test]
    fn test_preview_rotation_skipped_for_external_camera() {
        let tracker = OrientationTracker::default();
        tracker.set_display(DisplayOrientation::Portrait);
        tracker.set_camera(true, false);
        assert_eq!(tracker.preview_rotation(), Some(270));

        tracker.set_camera(false, true);
        assert_eq!(tracker.preview_rotation(), None);
    }
}
