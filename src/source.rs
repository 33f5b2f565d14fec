//! Frame source collaborator: the capture device behind the pipeline.

use crate::frame::{Frame, PixelFormat};
use crate::geometry::Dimensions;
use crate::orientation::{DeviceOrientation, DisplayOrientation};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Where a camera is mounted on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Panel {
    /// Facing the viewer
    Front,
    /// Facing away from the viewer
    Back,
    /// No enclosure information, treated as an external camera
    #[default]
    Unknown,
}

impl Panel {
    /// Front cameras show a mirrored preview
    #[must_use]
    pub const fn is_mirrored(self) -> bool {
        matches!(self, Self::Front)
    }

    /// Cameras without a known panel are not fixed to the device
    #[must_use]
    pub const fn is_external(self) -> bool {
        matches!(self, Self::Unknown)
    }
}

/// Enumerated capture device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Stable device identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Mounting panel
    pub panel: Panel,
}

/// Streaming state of an opened device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Opened but not streaming
    NotStreaming,
    /// Preview running
    Streaming,
    /// The device shut the stream down underneath us
    Shutdown,
}

/// Properties of the running preview stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamProperties {
    /// Native sensor width
    pub width: u32,
    /// Native sensor height
    pub height: u32,
    /// Native encoding of the stream
    pub format: PixelFormat,
}

impl StreamProperties {
    /// Stream dimensions
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// Notifications delivered to the pipeline's event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// The capture device failed
    Failed {
        /// Device error code
        code: u32,
        /// Device error message
        message: String,
    },
    /// A cycle found the stream shut down
    StreamShutdown,
    /// The device sensor reported a new physical orientation
    DeviceOrientationChanged(DeviceOrientation),
    /// The display changed orientation
    DisplayOrientationChanged(DisplayOrientation),
}

/// Sender half used by sources and displays to raise [`SourceEvent`]s
pub type EventSender = mpsc::UnboundedSender<SourceEvent>;

/// Capture device abstraction
#[async_trait]
pub trait FrameSource: Send {
    /// List the capture devices available
    async fn devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Open a device; failures and orientation changes are reported on `events`
    async fn open(&mut self, device: &DeviceInfo, events: EventSender) -> Result<()>;

    /// Start the preview stream and report its properties
    async fn start_preview(&mut self) -> Result<StreamProperties>;

    /// Tag the preview stream with a rotation in degrees
    async fn set_preview_rotation(&mut self, degrees: u32) -> Result<()>;

    /// Copy the current preview frame in the requested encoding and size
    async fn pull_frame(&mut self, format: PixelFormat, width: u32, height: u32) -> Result<Frame>;

    /// Current streaming state
    fn stream_state(&self) -> StreamState;

    /// Stop the preview stream
    async fn stop_preview(&mut self) -> Result<()>;

    /// Release the device
    async fn close(&mut self);
}
