//! Gated two-tier face detection for live video.
//!
//! A periodic timer samples the preview stream of a capture device. Each
//! sample runs a fast local face detector, and only when faces are present is
//! a second, differently encoded frame handed to a slower analyzer whose
//! results are drawn on a presentation surface and forwarded to a sink.
//!
//! The pipeline is built from:
//! 1. A [`scheduler::PeriodicCaptureScheduler`] ticking every 66-200 ms
//! 2. A one-slot [`gate::CaptureGate`] that drops ticks while a cycle runs
//! 3. A [`detector::LocalDetector`] on NV12 preview frames
//! 4. A [`analyzer::HeavyAnalyzer`] on BGRA8 frames, one analysis at a time
//! 5. A [`dispatcher::ResultDispatcher`] handing results to a sink
//! 6. An [`overlay::OverlayRenderer`] mapping boxes through rotation,
//!    mirroring and letterboxing
//!
//! # Examples
//!
//! ## Mapping a detection onto the display
//!
//! ```
//! use face_watch::geometry::{compute_presentation_area, map_box, DetectionBox, Dimensions, Size};
//! use face_watch::orientation::DisplayOrientation;
//!
//! let stream = Dimensions::new(1920, 1080);
//! let area = compute_presentation_area(stream, Size::new(800.0, 600.0), DisplayOrientation::Landscape);
//! assert_eq!((area.width, area.height, area.y), (800.0, 450.0, 75.0));
//!
//! let face = map_box(&DetectionBox::new(960, 540, 192, 108), stream, &area, DisplayOrientation::Landscape);
//! assert_eq!((face.x, face.y), (400.0, 300.0));
//! ```
//!
//! ## Running the pipeline on synthetic collaborators
//!
//! ```no_run
//! use face_watch::config::Config;
//! use face_watch::geometry::{DetectionBox, Dimensions, Size};
//! use face_watch::overlay::CanvasSurface;
//! use face_watch::pipeline::{Collaborators, Pipeline};
//! use face_watch::sink::LogSink;
//! use face_watch::synthetic::{FaceScript, SyntheticAnalyzer, SyntheticDetector, SyntheticSource};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> face_watch::Result<()> {
//! let collaborators = Collaborators {
//!     source: Box::new(SyntheticSource::front_camera(Dimensions::new(1280, 720))),
//!     detector: Box::new(SyntheticDetector::new(FaceScript::constant(vec![DetectionBox::new(100, 100, 80, 80)]))),
//!     analyzer: Arc::new(SyntheticAnalyzer::new(1)),
//!     sink: Arc::new(LogSink),
//! };
//! let mut pipeline = Pipeline::new(Config::default(), collaborators, CanvasSurface::new(Size::new(800.0, 600.0)))?;
//!
//! let devices = pipeline.initialize().await?;
//! pipeline.start(&devices[0]).await?;
//! tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//! pipeline.close().await;
//! # Ok(())
//! # }
//! ```

/// Error types and result handling
pub mod error;

/// Constants used throughout the pipeline
pub mod constants;

/// Configuration management
pub mod config;

/// Frames, pixel encodings and buffer leases
pub mod frame;

/// Stream, surface and overlay geometry
pub mod geometry;

/// Display and device orientation tracking
pub mod orientation;

/// One-slot capture gate
pub mod gate;

/// Capture device collaborator
pub mod source;

/// Fast local face detector collaborator
pub mod detector;

/// Heavy analyzer collaborator and face results
pub mod analyzer;

/// Fire-and-forget result dispatch
pub mod dispatcher;

/// Result sinks
pub mod sink;

/// Highlight overlay and presentation surface
pub mod overlay;

/// Serialized presentation updates
pub mod presentation;

/// Periodic capture timer
pub mod scheduler;

/// Pipeline lifecycle and capture cycle
pub mod pipeline;

/// Scripted collaborators for hardware-free runs
pub mod synthetic;

/// Utility functions for detection boxes and frame conversion
pub mod utils;

pub use error::{Error, Result};
