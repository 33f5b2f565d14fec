//! Video frames pulled from the capture source.

use crate::geometry::Dimensions;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Pixel encoding of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 4:2:0 luma plane followed by interleaved chroma; native to the local detector
    Nv12,
    /// 8-bit blue, green, red, alpha; required by the heavy analyzer
    Bgra8,
}

impl PixelFormat {
    /// Buffer length in bytes for a frame of the given size
    #[must_use]
    pub fn buffer_len(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::Nv12 => w * h + 2 * w.div_ceil(2) * h.div_ceil(2),
            Self::Bgra8 => w * h * 4,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nv12 => write!(f, "NV12"),
            Self::Bgra8 => write!(f, "BGRA8"),
        }
    }
}

/// Accounting handle for a source buffer.
///
/// Sources backed by hardware buffers hand one out with each frame; the count
/// drops again when the frame is dropped.
#[derive(Debug)]
pub struct FrameLease {
    outstanding: Arc<AtomicUsize>,
}

impl FrameLease {
    /// Register one more outstanding buffer on `outstanding`
    #[must_use]
    pub fn track(outstanding: &Arc<AtomicUsize>) -> Self {
        outstanding.fetch_add(1, Ordering::AcqRel);
        Self {
            outstanding: Arc::clone(outstanding),
        }
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Immutable pixel snapshot owned by the cycle that pulled it
#[derive(Debug)]
pub struct Frame {
    format: PixelFormat,
    width: u32,
    height: u32,
    data: Vec<u8>,
    captured_at: Instant,
    _lease: Option<FrameLease>,
}

impl Frame {
    /// Wrap a pixel buffer, checking that its length matches the encoding
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for zero dimensions or a mismatched buffer length
    pub fn new(format: PixelFormat, width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidInput(format!("Frame dimensions must be non-zero, got {width}x{height}")));
        }
        let expected = format.buffer_len(width, height);
        if data.len() != expected {
            return Err(Error::InvalidInput(format!(
                "{format} frame {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            data,
            captured_at: Instant::now(),
            _lease: None,
        })
    }

    /// Frame filled with a single byte value
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for zero dimensions
    pub fn filled(format: PixelFormat, width: u32, height: u32, value: u8) -> Result<Self> {
        Self::new(format, width, height, vec![value; format.buffer_len(width, height)])
    }

    /// Attach a source buffer lease released together with the frame
    #[must_use]
    pub fn with_lease(mut self, lease: FrameLease) -> Self {
        self._lease = Some(lease);
        self
    }

    /// Pixel encoding
    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Width in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Width and height
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Raw pixel bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Time the frame was captured
    #[must_use]
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_lengths() {
        assert_eq!(PixelFormat::Bgra8.buffer_len(4, 2), 32);
        assert_eq!(PixelFormat::Nv12.buffer_len(4, 2), 8 + 4);
        // Odd sizes round the chroma plane up
        assert_eq!(PixelFormat::Nv12.buffer_len(3, 3), 9 + 8);
    }

    #[test]
    fn test_rejects_mismatched_buffer() {
        assert!(Frame::new(PixelFormat::Bgra8, 2, 2, vec![0; 15]).is_err());
        assert!(Frame::new(PixelFormat::Bgra8, 0, 2, Vec::new()).is_err());
        assert!(Frame::new(PixelFormat::Bgra8, 2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_lease_released_on_drop() {
        let outstanding = Arc::new(AtomicUsize::new(0));
        let frame = Frame::filled(PixelFormat::Nv12, 8, 8, 0)
            .unwrap()
            .with_lease(FrameLease::track(&outstanding));
        assert_eq!(outstanding.load(Ordering::Acquire), 1);
        drop(frame);
        assert_eq!(outstanding.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_captured_at_is_creation_time() {
        let before = Instant::now();
        let frame = Frame::filled(PixelFormat::Bgra8, 2, 2, 0).unwrap();
        assert!(frame.captured_at() >= before);
        assert!(frame.captured_at() <= Instant::now());
    }
}
