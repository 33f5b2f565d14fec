//! Scripted collaborators for running the pipeline without camera hardware
//! or analysis services.
//!
//! The source produces flat gray frames, the detector replays a
//! [`FaceScript`] and the analyzer answers with deterministic attributes.
//! Each exposes a cloneable handle for steering it and counting calls after it
//! has been moved into a pipeline.

use crate::analyzer::{AnalyzerCredentials, EmotionScores, FaceAttributes, FaceResult, HeavyAnalyzer};
use crate::detector::LocalDetector;
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameLease, PixelFormat};
use crate::geometry::{DetectionBox, Dimensions};
use crate::orientation::{DeviceOrientation, DisplayOrientation};
use crate::source::{DeviceInfo, EventSender, FrameSource, Panel, SourceEvent, StreamProperties, StreamState};
use async_trait::async_trait;
use log::debug;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const FRAME_FILL: u8 = 0x80;

#[derive(Debug, Default)]
struct ProbeState {
    nv12_pulls: AtomicU64,
    bgra_pulls: AtomicU64,
    fail_nv12: AtomicBool,
    fail_bgra: AtomicBool,
    fail_start: AtomicBool,
    stream_shutdown: AtomicBool,
    outstanding: Arc<AtomicUsize>,
    opens: AtomicU64,
    closes: AtomicU64,
    preview_stops: AtomicU64,
    preview_rotation: Mutex<Option<u32>>,
    events: Mutex<Option<EventSender>>,
}

/// Handle for steering and observing a [`SyntheticSource`]
#[derive(Debug, Clone, Default)]
pub struct SourceProbe {
    state: Arc<ProbeState>,
}

impl SourceProbe {
    /// Frames pulled in `format`
    #[must_use]
    pub fn pulls(&self, format: PixelFormat) -> u64 {
        match format {
            PixelFormat::Nv12 => self.state.nv12_pulls.load(Ordering::SeqCst),
            PixelFormat::Bgra8 => self.state.bgra_pulls.load(Ordering::SeqCst),
        }
    }

    /// Make pulls in `format` fail
    pub fn fail_pulls(&self, format: PixelFormat, fail: bool) {
        match format {
            PixelFormat::Nv12 => self.state.fail_nv12.store(fail, Ordering::SeqCst),
            PixelFormat::Bgra8 => self.state.fail_bgra.store(fail, Ordering::SeqCst),
        }
    }

    /// Make the next preview start fail
    pub fn fail_start(&self, fail: bool) {
        self.state.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Report the stream as shut down by the device
    pub fn set_stream_shutdown(&self, shutdown: bool) {
        self.state.stream_shutdown.store(shutdown, Ordering::SeqCst);
    }

    /// Frames pulled but not yet dropped
    #[must_use]
    pub fn outstanding_frames(&self) -> usize {
        self.state.outstanding.load(Ordering::SeqCst)
    }

    /// Times a device was opened
    #[must_use]
    pub fn opens(&self) -> u64 {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Times the device was released
    #[must_use]
    pub fn closes(&self) -> u64 {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Times the preview was stopped
    #[must_use]
    pub fn preview_stops(&self) -> u64 {
        self.state.preview_stops.load(Ordering::SeqCst)
    }

    /// Rotation last applied to the preview stream
    #[must_use]
    pub fn preview_rotation(&self) -> Option<u32> {
        *self.state.preview_rotation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise a device failure; false if no device is open
    pub fn inject_failure(&self, code: u32, message: &str) -> bool {
        self.emit(SourceEvent::Failed {
            code,
            message: message.to_string(),
        })
    }

    /// Raise a display orientation change; false if no device is open
    pub fn rotate_display(&self, display: DisplayOrientation) -> bool {
        self.emit(SourceEvent::DisplayOrientationChanged(display))
    }

    /// Raise a device orientation reading; false if no device is open
    pub fn tilt_device(&self, device: DeviceOrientation) -> bool {
        self.emit(SourceEvent::DeviceOrientationChanged(device))
    }

    fn emit(&self, event: SourceEvent) -> bool {
        let events = self.state.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.as_ref().is_some_and(|tx| tx.send(event).is_ok())
    }

    fn set_events(&self, events: Option<EventSender>) {
        *self.state.events.lock().unwrap_or_else(PoisonError::into_inner) = events;
    }

    fn set_rotation(&self, degrees: Option<u32>) {
        *self.state.preview_rotation.lock().unwrap_or_else(PoisonError::into_inner) = degrees;
    }
}

/// Frame source producing flat frames of a fixed size
#[derive(Debug)]
pub struct SyntheticSource {
    devices: Vec<DeviceInfo>,
    stream: StreamProperties,
    probe: SourceProbe,
    opened: Option<DeviceInfo>,
    streaming: bool,
}

impl SyntheticSource {
    /// Source offering `devices`, each streaming at `size`
    #[must_use]
    pub fn new(devices: Vec<DeviceInfo>, size: Dimensions) -> Self {
        Self {
            devices,
            stream: StreamProperties {
                width: size.width,
                height: size.height,
                format: PixelFormat::Nv12,
            },
            probe: SourceProbe::default(),
            opened: None,
            streaming: false,
        }
    }

    /// Source with one front-facing camera
    #[must_use]
    pub fn front_camera(size: Dimensions) -> Self {
        Self::new(
            vec![DeviceInfo {
                id: "synthetic-front".to_string(),
                name: "Synthetic Front Camera".to_string(),
                panel: Panel::Front,
            }],
            size,
        )
    }

    /// Handle for steering this source
    #[must_use]
    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    async fn open(&mut self, device: &DeviceInfo, events: EventSender) -> Result<()> {
        if !self.devices.iter().any(|candidate| candidate.id == device.id) {
            return Err(Error::InvalidInput(format!("Unknown device {}", device.id)));
        }
        self.opened = Some(device.clone());
        self.probe.set_events(Some(events));
        self.probe.state.opens.fetch_add(1, Ordering::SeqCst);
        debug!("Opened synthetic device {}", device.name);
        Ok(())
    }

    async fn start_preview(&mut self) -> Result<StreamProperties> {
        if self.opened.is_none() {
            return Err(Error::InvalidState("preview started before open".to_string()));
        }
        if self.probe.state.fail_start.load(Ordering::SeqCst) {
            return Err(Error::DeviceFault {
                code: 0xC00D_3704,
                message: "preview could not start".to_string(),
            });
        }
        self.streaming = true;
        Ok(self.stream)
    }

    async fn set_preview_rotation(&mut self, degrees: u32) -> Result<()> {
        self.probe.set_rotation(Some(degrees));
        Ok(())
    }

    async fn pull_frame(&mut self, format: PixelFormat, width: u32, height: u32) -> Result<Frame> {
        if !self.streaming {
            return Err(Error::FramePull("preview not running".to_string()));
        }
        let (pulls, fail) = match format {
            PixelFormat::Nv12 => (&self.probe.state.nv12_pulls, &self.probe.state.fail_nv12),
            PixelFormat::Bgra8 => (&self.probe.state.bgra_pulls, &self.probe.state.fail_bgra),
        };
        pulls.fetch_add(1, Ordering::SeqCst);
        if fail.load(Ordering::SeqCst) {
            return Err(Error::FramePull(format!("{format} frame unavailable")));
        }

        Ok(Frame::filled(format, width, height, FRAME_FILL)?.with_lease(FrameLease::track(&self.probe.state.outstanding)))
    }

    fn stream_state(&self) -> StreamState {
        if self.probe.state.stream_shutdown.load(Ordering::SeqCst) {
            StreamState::Shutdown
        } else if self.streaming {
            StreamState::Streaming
        } else {
            StreamState::NotStreaming
        }
    }

    async fn stop_preview(&mut self) -> Result<()> {
        self.streaming = false;
        self.probe.state.preview_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        self.streaming = false;
        if self.opened.take().is_some() {
            self.probe.set_events(None);
            self.probe.set_rotation(None);
            self.probe.state.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    frames: Vec<Vec<DetectionBox>>,
    next: usize,
    calls: u64,
}

/// Face boxes the synthetic detector reports, one entry per processed frame.
///
/// Entries repeat from the start once exhausted; an empty script reports no
/// faces.
#[derive(Debug, Clone, Default)]
pub struct FaceScript {
    state: Arc<Mutex<ScriptState>>,
}

impl FaceScript {
    /// Script cycling through `frames`
    #[must_use]
    pub fn repeating(frames: Vec<Vec<DetectionBox>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                frames,
                ..ScriptState::default()
            })),
        }
    }

    /// Script reporting the same boxes on every frame
    #[must_use]
    pub fn constant(boxes: Vec<DetectionBox>) -> Self {
        Self::repeating(vec![boxes])
    }

    /// Replace the script and start over
    pub fn set(&self, frames: Vec<Vec<DetectionBox>>) {
        let mut state = self.lock();
        state.frames = frames;
        state.next = 0;
    }

    /// Frames processed so far
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.lock().calls
    }

    fn next_boxes(&self) -> Vec<DetectionBox> {
        let mut state = self.lock();
        state.calls += 1;
        if state.frames.is_empty() {
            return Vec::new();
        }
        let index = state.next % state.frames.len();
        state.next = index + 1;
        state.frames[index].clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Detector replaying a [`FaceScript`] on NV12 frames
#[derive(Debug, Clone)]
pub struct SyntheticDetector {
    script: FaceScript,
    fail: Arc<AtomicBool>,
}

impl SyntheticDetector {
    /// Detector reporting `script`
    #[must_use]
    pub fn new(script: FaceScript) -> Self {
        Self {
            script,
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make detection fail; shared by all clones
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalDetector for SyntheticDetector {
    fn supported_formats(&self) -> &[PixelFormat] {
        &[PixelFormat::Nv12]
    }

    async fn process_frame(&mut self, frame: &Frame) -> Result<Vec<DetectionBox>> {
        if !self.is_format_supported(frame.format()) {
            return Err(Error::UnsupportedPixelFormat(frame.format()));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Detection("synthetic detector failure".to_string()));
        }
        Ok(self.script.next_boxes())
    }
}

const GENDERS: [&str; 2] = ["female", "male"];

/// Analyzer answering with deterministic per-face results
#[derive(Debug)]
pub struct SyntheticAnalyzer {
    faces: AtomicUsize,
    fail: AtomicBool,
    delay_ms: AtomicU64,
    calls: AtomicU64,
    closes: AtomicU64,
    last_frame: Mutex<Option<(PixelFormat, Dimensions)>>,
}

impl SyntheticAnalyzer {
    /// Analyzer finding `faces` faces in every frame
    #[must_use]
    pub fn new(faces: usize) -> Self {
        Self {
            faces: AtomicUsize::new(faces),
            fail: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            last_frame: Mutex::new(None),
        }
    }

    /// Change how many faces each analysis finds
    pub fn set_faces(&self, faces: usize) {
        self.faces.store(faces, Ordering::SeqCst);
    }

    /// Make analysis fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Simulated service latency
    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Analyses requested so far
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Times the analyzer was closed
    #[must_use]
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Encoding and size of the last analysed frame
    #[must_use]
    pub fn last_frame(&self) -> Option<(PixelFormat, Dimensions)> {
        *self.last_frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn face(call: u64, index: usize, count: usize, frame: Dimensions) -> FaceResult {
        let slots = u32::try_from(count + 1).unwrap_or(u32::MAX);
        let position = u32::try_from(index + 1).unwrap_or(u32::MAX);
        let side = (frame.height / 4).max(1);
        let x = (frame.width / slots).saturating_mul(position).saturating_sub(side / 2);
        let seed = call.wrapping_mul(7).wrapping_add(index as u64 * 13);

        let mut emotion = EmotionScores {
            neutral: 0.2,
            ..EmotionScores::default()
        };
        match seed % 4 {
            0 => emotion.happiness = 0.7,
            1 => emotion.surprise = 0.6,
            2 => emotion.sadness = 0.5,
            _ => emotion.neutral = 0.8,
        }

        FaceResult {
            face_id: format!("synthetic-{call}-{index}"),
            face_rect: DetectionBox::new(x, frame.height / 3, side, side),
            attributes: Some(FaceAttributes {
                age: 18.0 + (seed % 50) as f64,
                gender: GENDERS[(seed % 2) as usize].to_string(),
                smile: emotion.happiness.into(),
                glasses: "NoGlasses".to_string(),
            }),
            emotion: Some(emotion),
            thumbnail: None,
        }
    }
}

impl Default for SyntheticAnalyzer {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl HeavyAnalyzer for SyntheticAnalyzer {
    async fn analyze(&self, frame: &Frame, credentials: &AnalyzerCredentials) -> Result<Vec<FaceResult>> {
        credentials.validate()?;
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_frame.lock().unwrap_or_else(PoisonError::into_inner) = Some((frame.format(), frame.dimensions()));

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Analysis("synthetic analysis service unavailable".to_string()));
        }

        let count = self.faces.load(Ordering::SeqCst);
        Ok((0..count)
            .map(|index| Self::face(call, index, count, frame.dimensions()))
            .collect())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
