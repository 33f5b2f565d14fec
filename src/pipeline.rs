//! The capture pipeline: lifecycle owner of the device, gate and orientation
//! state, and the capture cycle run on every accepted tick.

use crate::analyzer::{AnalyzerCredentials, HeavyAnalyzer};
use crate::config::{AnalysisMode, Config};
use crate::constants::ANALYSIS_PIXEL_FORMAT;
use crate::detector::{detect_on_preview, LocalDetector};
use crate::dispatcher::{ResultDispatcher, ResultSink};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::gate::{CaptureGate, GatePermit};
use crate::orientation::OrientationTracker;
use crate::overlay::{OverlayRenderer, PresentationSurface};
use crate::presentation::{PresentationHandle, PresentationQueue};
use crate::scheduler::{AnalysisOutcome, CaptureCycle, CycleReport, PeriodicCaptureScheduler, SchedulerStats};
use crate::source::{DeviceInfo, EventSender, FrameSource, SourceEvent, StreamProperties, StreamState};
use crate::utils::clamp_boxes;
use crate::utils::image_conversion::make_thumbnail;
use async_trait::async_trait;
use log::{debug, error, info, trace, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

/// External collaborators the pipeline drives
pub struct Collaborators {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn LocalDetector>,
    pub analyzer: Arc<dyn HeavyAnalyzer>,
    pub sink: Arc<dyn ResultSink>,
}

/// Lifecycle state of a [`Pipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Created, devices not yet enumerated
    Idle,
    /// Devices enumerated, waiting for one to be started
    Selecting,
    /// Preview running and timer ticking
    Running,
    /// Torn down after running
    Stopped,
}

/// Why the pipeline restarted itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartReason {
    /// The device reported a failure
    DeviceFault { code: u32, message: String },
    /// A cycle found the preview stream shut down
    StreamShutdown,
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceFault { code, message } => write!(f, "device fault 0x{code:X}: {message}"),
            Self::StreamShutdown => write!(f, "preview stream shut down"),
        }
    }
}

/// Effect of handling one [`SourceEvent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// State updated
    Applied,
    /// Nothing to do for this event in the current state
    Ignored,
    /// Pipeline was torn down and is back to device selection
    Restarted(RestartReason),
}

#[derive(Debug, Clone, Copy)]
struct AnalysisSettings {
    mode: AnalysisMode,
    timeout: Duration,
    thumbnail_max_side: u32,
}

/// State shared by every capture cycle of one pipeline
struct CycleContext {
    source: tokio::sync::Mutex<Box<dyn FrameSource>>,
    detector: tokio::sync::Mutex<Box<dyn LocalDetector>>,
    analyzer: Arc<dyn HeavyAnalyzer>,
    dispatcher: ResultDispatcher,
    presentation: PresentationHandle,
    orientation: Arc<OrientationTracker>,
    analysis_slot: CaptureGate,
    credentials: AnalyzerCredentials,
    stream: Mutex<Option<StreamProperties>>,
    active: AtomicBool,
    /// Bumped on every teardown; analyses from an older session are stale
    session: Arc<AtomicU64>,
    detached: Mutex<Option<JoinHandle<()>>>,
    events: EventSender,
    settings: AnalysisSettings,
}

impl CycleContext {
    fn stream(&self) -> Option<StreamProperties> {
        *self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_stream(&self, stream: Option<StreamProperties>) {
        *self.stream.lock().unwrap_or_else(PoisonError::into_inner) = stream;
    }

    fn current_session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    /// Invalidate every analysis started so far
    fn end_session(&self) {
        self.session.fetch_add(1, Ordering::AcqRel);
    }

    fn track_detached(&self, session: u64, handle: JoinHandle<()>) {
        let mut detached = self.detached.lock().unwrap_or_else(PoisonError::into_inner);
        if self.current_session() == session {
            *detached = Some(handle);
        } else {
            handle.abort();
        }
    }

    fn take_detached(&self) -> Option<JoinHandle<()>> {
        self.detached.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn analysis_job(&self, session: u64, frame: Frame, slot: GatePermit) -> AnalysisJob {
        AnalysisJob {
            frame,
            _slot: slot,
            analyzer: Arc::clone(&self.analyzer),
            credentials: self.credentials.clone(),
            dispatcher: self.dispatcher.clone(),
            presentation: self.presentation.clone(),
            session,
            current_session: Arc::clone(&self.session),
            timeout: self.settings.timeout,
            thumbnail_max_side: self.settings.thumbnail_max_side,
        }
    }
}

#[async_trait]
impl CaptureCycle for CycleContext {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    async fn run_cycle(&self) -> Result<CycleReport> {
        let session = self.current_session();
        let Some(stream) = self.stream() else {
            return Ok(CycleReport::default());
        };

        let mut source = self.source.lock().await;
        // Teardown may have run while this cycle waited for the device
        if !self.is_active() {
            return Ok(CycleReport::default());
        }

        match source.stream_state() {
            StreamState::Streaming => {}
            StreamState::Shutdown => {
                warn!("Preview stream shut down, requesting restart");
                if self.events.send(SourceEvent::StreamShutdown).is_err() {
                    debug!("Event channel closed, restart request dropped");
                }
                return Ok(CycleReport::default());
            }
            StreamState::NotStreaming => {
                trace!("Preview not streaming yet, skipping cycle");
                return Ok(CycleReport::default());
            }
        }

        let faces = {
            let mut detector = self.detector.lock().await;
            match detect_on_preview(&mut **source, &mut **detector, stream).await {
                Ok(boxes) => clamp_boxes(boxes, stream.dimensions()),
                Err(e) => {
                    warn!("Local detection skipped: {e}");
                    Vec::new()
                }
            }
        };
        let faces_detected = faces.len();
        let has_faces = !faces.is_empty();
        self.presentation
            .highlight(faces, stream.dimensions(), self.orientation.snapshot());

        if !has_faces {
            return Ok(CycleReport {
                faces_detected,
                analysis: AnalysisOutcome::NotRequested,
            });
        }

        let Some(slot) = self.analysis_slot.try_acquire() else {
            debug!("Previous analysis still running, frame not analysed");
            return Ok(CycleReport {
                faces_detected,
                analysis: AnalysisOutcome::Busy,
            });
        };

        let frame = match source
            .pull_frame(ANALYSIS_PIXEL_FORMAT, stream.width, stream.height)
            .await
        {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Analysis frame pull failed: {e}");
                return Ok(CycleReport {
                    faces_detected,
                    analysis: AnalysisOutcome::Failed,
                });
            }
        };
        drop(source);

        let job = self.analysis_job(session, frame, slot);
        let analysis = match self.settings.mode {
            AnalysisMode::Detached => {
                let handle = tokio::spawn(async move {
                    match job.run().await {
                        Ok(count) => debug!("Analysis finished with {count} result(s)"),
                        Err(e) => warn!("Analysis failed: {e}"),
                    }
                });
                self.track_detached(session, handle);
                AnalysisOutcome::Submitted
            }
            AnalysisMode::Inline => match job.run().await {
                Ok(count) => AnalysisOutcome::Completed(count),
                Err(e) => {
                    warn!("Analysis failed: {e}");
                    AnalysisOutcome::Failed
                }
            },
        };

        Ok(CycleReport {
            faces_detected,
            analysis,
        })
    }
}

/// One heavy analysis round trip; holds the analysis slot until dropped
struct AnalysisJob {
    frame: Frame,
    _slot: GatePermit,
    analyzer: Arc<dyn HeavyAnalyzer>,
    credentials: AnalyzerCredentials,
    dispatcher: ResultDispatcher,
    presentation: PresentationHandle,
    session: u64,
    current_session: Arc<AtomicU64>,
    timeout: Duration,
    thumbnail_max_side: u32,
}

impl AnalysisJob {
    async fn run(self) -> Result<usize> {
        let thumbnail = match make_thumbnail(&self.frame, self.thumbnail_max_side) {
            Ok(thumbnail) => Some(thumbnail),
            Err(e) => {
                debug!("No thumbnail for analysed frame: {e}");
                None
            }
        };

        let mut results = time::timeout(self.timeout, self.analyzer.analyze(&self.frame, &self.credentials))
            .await
            .map_err(|_| Error::AnalysisTimeout(self.timeout))??;
        trace!("Analysed frame captured {:?} ago", self.frame.captured_at().elapsed());
        drop(self.frame);

        if self.current_session.load(Ordering::Acquire) != self.session {
            debug!("Pipeline torn down, discarding {} analysis result(s)", results.len());
            return Ok(0);
        }

        if let Some(thumbnail) = thumbnail {
            for result in &mut results {
                result.thumbnail = Some(thumbnail.clone());
            }
        }

        let count = results.len();
        self.presentation.show_results(results.clone());
        self.dispatcher.dispatch(results);
        Ok(count)
    }
}

/// Gated two-tier face detection pipeline.
///
/// Owns the capture device, the capture gate and the orientation state for
/// its whole lifetime. Device events arrive on the receiver returned by
/// [`Pipeline::take_events`] and are applied with [`Pipeline::handle_event`].
pub struct Pipeline {
    config: Config,
    context: Arc<CycleContext>,
    gate: Arc<CaptureGate>,
    orientation: Arc<OrientationTracker>,
    presentation: PresentationQueue,
    scheduler: Option<PeriodicCaptureScheduler>,
    events_tx: EventSender,
    events_rx: Option<mpsc::UnboundedReceiver<SourceEvent>>,
    state: PipelineState,
    device: Option<DeviceInfo>,
}

impl Pipeline {
    /// Create a pipeline drawing on `surface`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` or `MissingCredentials` for an invalid configuration
    pub fn new<S: PresentationSurface>(config: Config, collaborators: Collaborators, surface: S) -> Result<Self> {
        config.validate()?;
        let credentials = AnalyzerCredentials::new(&config.analysis.face_key, &config.analysis.emotion_key);
        credentials.validate()?;

        let presentation = PresentationQueue::spawn(surface, OverlayRenderer::new(config.overlay.style()));
        let orientation = Arc::new(OrientationTracker::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let context = Arc::new(CycleContext {
            source: tokio::sync::Mutex::new(collaborators.source),
            detector: tokio::sync::Mutex::new(collaborators.detector),
            analyzer: collaborators.analyzer,
            dispatcher: ResultDispatcher::new(collaborators.sink),
            presentation: presentation.handle(),
            orientation: Arc::clone(&orientation),
            analysis_slot: CaptureGate::new(),
            credentials,
            stream: Mutex::new(None),
            active: AtomicBool::new(false),
            session: Arc::new(AtomicU64::new(0)),
            detached: Mutex::new(None),
            events: events_tx.clone(),
            settings: AnalysisSettings {
                mode: config.analysis.mode,
                timeout: config.analysis_timeout(),
                thumbnail_max_side: config.analysis.thumbnail_max_side,
            },
        });

        Ok(Self {
            config,
            context,
            gate: Arc::new(CaptureGate::new()),
            orientation,
            presentation,
            scheduler: None,
            events_tx,
            events_rx: Some(events_rx),
            state: PipelineState::Idle,
            device: None,
        })
    }

    /// Enumerate capture devices and enter device selection
    ///
    /// # Errors
    ///
    /// Returns `NoCamera` if no device is available, or the enumeration error
    pub async fn initialize(&mut self) -> Result<Vec<DeviceInfo>> {
        if self.state == PipelineState::Running {
            return Err(Error::InvalidState("initialize while running".to_string()));
        }

        let devices = self.context.source.lock().await.devices().await?;
        if devices.is_empty() {
            return Err(Error::NoCamera);
        }

        info!("Found {} capture device(s)", devices.len());
        for device in &devices {
            debug!("  {} ({}, {:?} panel)", device.name, device.id, device.panel);
        }
        self.state = PipelineState::Selecting;
        Ok(devices)
    }

    /// Open `device`, start its preview and start the capture timer.
    ///
    /// Starting an already running pipeline does nothing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` before [`Pipeline::initialize`], or the device
    /// error if opening or starting the preview fails
    pub async fn start(&mut self, device: &DeviceInfo) -> Result<()> {
        match self.state {
            PipelineState::Running => {
                debug!("Pipeline already running on {}", self.device_name());
                return Ok(());
            }
            PipelineState::Selecting => {}
            PipelineState::Idle | PipelineState::Stopped => {
                return Err(Error::InvalidState("start before device enumeration".to_string()));
            }
        }

        let stream = {
            let mut source = self.context.source.lock().await;
            match self.open_device(&mut **source, device).await {
                Ok(stream) => stream,
                Err(e) => {
                    source.close().await;
                    return Err(e);
                }
            }
        };

        self.context.set_stream(Some(stream));
        self.context.active.store(true, Ordering::Release);
        self.scheduler = Some(PeriodicCaptureScheduler::start(
            self.config.tick_interval(),
            Arc::clone(&self.gate),
            Arc::clone(&self.context) as Arc<dyn CaptureCycle>,
        ));
        self.device = Some(device.clone());
        self.state = PipelineState::Running;

        info!(
            "Capturing from {} at {}x{} every {:?} (analysis {})",
            device.name,
            stream.width,
            stream.height,
            self.config.tick_interval(),
            self.config.analysis.mode
        );
        Ok(())
    }

    async fn open_device(&self, source: &mut dyn FrameSource, device: &DeviceInfo) -> Result<StreamProperties> {
        source.open(device, self.events_tx.clone()).await?;
        let mut stream = source.start_preview().await?;
        if stream.dimensions().is_empty() {
            stream.width = self.config.capture.stream_width;
            stream.height = self.config.capture.stream_height;
            debug!("Device reported no stream size, using {}x{}", stream.width, stream.height);
        }

        self.orientation
            .set_camera(device.panel.is_mirrored(), device.panel.is_external());
        if let Some(degrees) = self.orientation.preview_rotation() {
            source.set_preview_rotation(degrees).await?;
        }
        Ok(stream)
    }

    /// Tear the pipeline down.
    ///
    /// Stops the timer, stops the preview, releases the device, abandons the
    /// in-flight analysis and result sends, and closes the analyzer. A cycle already running
    /// finishes but starts no new work on the device.
    pub async fn shutdown(&mut self) {
        if self.state != PipelineState::Running {
            return;
        }

        self.context.active.store(false, Ordering::Release);
        self.context.end_session();
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop().await;
        }
        self.context.set_stream(None);

        {
            let mut source = self.context.source.lock().await;
            if let Err(e) = source.stop_preview().await {
                warn!("Stopping preview failed: {e}");
            }
            source.close().await;
        }
        if let Some(analysis) = self.context.take_detached() {
            analysis.abort();
            // Resolves once the job is dropped and its analysis slot freed
            if analysis.await.is_err() {
                debug!("Abandoned in-flight analysis");
            }
        }
        self.context.dispatcher.abandon_in_flight();
        self.context.analyzer.close().await;

        info!("Stopped capturing from {}", self.device_name());
        self.state = PipelineState::Stopped;
    }

    /// Tear down, clear the presentation and return to device selection
    ///
    /// # Errors
    ///
    /// Returns the enumeration error, e.g. `NoCamera`, if no device can be
    /// selected afterwards
    pub async fn restart(&mut self) -> Result<Vec<DeviceInfo>> {
        self.shutdown().await;
        self.presentation.handle().reset();
        self.device = None;
        self.state = PipelineState::Idle;
        self.initialize().await
    }

    /// Apply one device or display event
    ///
    /// # Errors
    ///
    /// Returns an error only if a restart cannot reach device selection again
    pub async fn handle_event(&mut self, event: SourceEvent) -> Result<EventOutcome> {
        match event {
            SourceEvent::Failed { code, message } => {
                if self.state != PipelineState::Running {
                    return Ok(EventOutcome::Ignored);
                }
                let reason = RestartReason::DeviceFault { code, message };
                error!("Capture device failed, restarting: {reason}");
                self.restart().await?;
                Ok(EventOutcome::Restarted(reason))
            }
            SourceEvent::StreamShutdown => {
                // Several cycles may report the same shutdown
                if self.state != PipelineState::Running {
                    return Ok(EventOutcome::Ignored);
                }
                info!("Preview stream shut down, restarting");
                self.restart().await?;
                Ok(EventOutcome::Restarted(RestartReason::StreamShutdown))
            }
            SourceEvent::DeviceOrientationChanged(device) => {
                if self.orientation.observe_device(device) {
                    debug!("Device orientation now {device:?}");
                    Ok(EventOutcome::Applied)
                } else {
                    Ok(EventOutcome::Ignored)
                }
            }
            SourceEvent::DisplayOrientationChanged(display) => {
                self.orientation.set_display(display);
                debug!("Display orientation now {display:?}");
                if self.state == PipelineState::Running {
                    if let Some(degrees) = self.orientation.preview_rotation() {
                        let mut source = self.context.source.lock().await;
                        if let Err(e) = source.set_preview_rotation(degrees).await {
                            warn!("Updating preview rotation failed: {e}");
                        }
                    }
                }
                Ok(EventOutcome::Applied)
            }
        }
    }

    /// Take the receiving end of the event channel; `None` after the first call
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SourceEvent>> {
        self.events_rx.take()
    }

    /// Sender for raising events, e.g. display orientation changes
    #[must_use]
    pub fn event_sender(&self) -> EventSender {
        self.events_tx.clone()
    }

    /// Run one capture cycle now, outside the timer.
    ///
    /// Returns `None` if a cycle is already holding the gate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` when the pipeline is not running
    pub async fn trigger_cycle(&self) -> Result<Option<CycleReport>> {
        if !self.context.is_active() {
            return Err(Error::InvalidState("pipeline not running".to_string()));
        }
        let Some(_permit) = self.gate.try_acquire() else {
            return Ok(None);
        };
        self.context.run_cycle().await.map(Some)
    }

    /// Wait until every presentation update posted so far has been applied
    ///
    /// # Errors
    ///
    /// Returns `ChannelClosed` after [`Pipeline::close`]
    pub async fn flush_presentation(&self) -> Result<()> {
        self.presentation.handle().flush().await
    }

    /// Release everything; the pipeline cannot be used afterwards
    pub async fn close(mut self) {
        self.shutdown().await;
        let Self { presentation, .. } = self;
        presentation.shutdown().await;
        debug!("Pipeline closed");
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Device currently capturing
    #[must_use]
    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    /// Properties of the running preview stream
    #[must_use]
    pub fn stream(&self) -> Option<StreamProperties> {
        self.context.stream()
    }

    /// The one-slot capture gate
    #[must_use]
    pub fn gate(&self) -> &Arc<CaptureGate> {
        &self.gate
    }

    /// Shared orientation state
    #[must_use]
    pub fn orientation(&self) -> &Arc<OrientationTracker> {
        &self.orientation
    }

    /// Result dispatcher counters
    #[must_use]
    pub fn dispatcher(&self) -> &ResultDispatcher {
        &self.context.dispatcher
    }

    /// An analysis is currently running
    #[must_use]
    pub fn analysis_in_progress(&self) -> bool {
        self.context.analysis_slot.is_held()
    }

    /// Timer counters while running
    #[must_use]
    pub fn scheduler_stats(&self) -> Option<SchedulerStats> {
        self.scheduler.as_ref().map(PeriodicCaptureScheduler::stats)
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn device_name(&self) -> &str {
        self.device.as_ref().map_or("<none>", |device| device.name.as_str())
    }
}
