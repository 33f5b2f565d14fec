//! Serialized access to the presentation surface.
//!
//! Capture cycles and analysis jobs run on pool threads, but the surface must
//! only be mutated from one place. Every update is posted as a command to a
//! single task that owns the surface and applies commands in order.

use crate::analyzer::FaceResult;
use crate::error::{Error, Result};
use crate::geometry::{DetectionBox, Dimensions};
use crate::orientation::OrientationState;
use crate::overlay::{OverlayRenderer, PresentationSurface};
use log::{debug, trace};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// One update for the presentation task
#[derive(Debug)]
pub enum PresentationCommand {
    /// Replace the highlight set
    Highlight {
        faces: Vec<DetectionBox>,
        stream: Dimensions,
        orientation: OrientationState,
    },
    /// Show an analysis result set
    ShowResults(Vec<FaceResult>),
    /// Clear everything shown
    Reset,
    /// Acknowledge once every earlier command has been applied
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle for posting commands to the presentation task
#[derive(Debug, Clone)]
pub struct PresentationHandle {
    tx: mpsc::UnboundedSender<PresentationCommand>,
}

impl PresentationHandle {
    /// Post a highlight update; dropped silently after shutdown
    pub fn highlight(&self, faces: Vec<DetectionBox>, stream: Dimensions, orientation: OrientationState) {
        self.post(PresentationCommand::Highlight {
            faces,
            stream,
            orientation,
        });
    }

    /// Post an analysis result set
    pub fn show_results(&self, results: Vec<FaceResult>) {
        self.post(PresentationCommand::ShowResults(results));
    }

    /// Post a reset
    pub fn reset(&self) {
        self.post(PresentationCommand::Reset);
    }

    /// Wait until everything posted so far has been applied
    ///
    /// # Errors
    ///
    /// Returns `ChannelClosed` if the presentation task is gone
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(PresentationCommand::Flush(ack))
            .map_err(|_| Error::ChannelClosed("presentation"))?;
        done.await.map_err(|_| Error::ChannelClosed("presentation"))
    }

    fn post(&self, command: PresentationCommand) {
        if self.tx.send(command).is_err() {
            trace!("Presentation task stopped, update dropped");
        }
    }
}

/// Owner of the presentation surface
pub struct PresentationQueue {
    handle: PresentationHandle,
    task: JoinHandle<()>,
}

impl PresentationQueue {
    /// Move `surface` into a new presentation task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: PresentationSurface>(mut surface: S, renderer: OverlayRenderer) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    PresentationCommand::Highlight {
                        faces,
                        stream,
                        orientation,
                    } => renderer.highlight(&mut surface, &faces, stream, orientation),
                    PresentationCommand::ShowResults(results) => renderer.show_results(&mut surface, &results),
                    PresentationCommand::Reset => renderer.reset(&mut surface),
                    PresentationCommand::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!("Presentation task finished");
        });

        Self {
            handle: PresentationHandle { tx },
            task,
        }
    }

    /// Handle for posting commands
    #[must_use]
    pub fn handle(&self) -> PresentationHandle {
        self.handle.clone()
    }

    /// Stop accepting commands and wait for queued ones to drain.
    ///
    /// Handles still held elsewhere keep the task alive, so it is aborted
    /// once everything queued before this call has been applied.
    pub async fn shutdown(self) {
        let Self { handle, task } = self;
        let _ = handle.flush().await;
        drop(handle);
        task.abort();
        let _ = task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::overlay::CanvasSurface;

    #[tokio::test]
    async fn test_commands_applied_in_order() {
        let canvas = CanvasSurface::new(Size::new(640.0, 480.0));
        let queue = PresentationQueue::spawn(canvas.clone(), OverlayRenderer::default());
        let handle = queue.handle();

        handle.highlight(
            vec![DetectionBox::new(0, 0, 64, 48)],
            Dimensions::new(640, 480),
            OrientationState::default(),
        );
        handle.highlight(Vec::new(), Dimensions::new(640, 480), OrientationState::default());
        handle.flush().await.unwrap();

        let state = canvas.snapshot();
        assert!(state.rectangles.is_empty());
        assert_eq!(state.clears, 2);
    }

    #[tokio::test]
    async fn test_posts_after_shutdown_are_dropped() {
        let canvas = CanvasSurface::new(Size::new(640.0, 480.0));
        let queue = PresentationQueue::spawn(canvas.clone(), OverlayRenderer::default());
        let handle = queue.handle();
        queue.shutdown().await;

        handle.reset();
        assert!(matches!(handle.flush().await, Err(Error::ChannelClosed(_))));
    }
}
