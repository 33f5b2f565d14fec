//! Face highlight overlay and the presentation surface it draws on.

use crate::analyzer::{FaceResult, Thumbnail};
use crate::constants::DEFAULT_STROKE_THICKNESS;
use crate::geometry::{
    compute_overlay_rotation_and_bounds, compute_presentation_area, map_box, DetectionBox, Dimensions,
    FlowDirection, OverlayTransform, Rect, Size,
};
use crate::orientation::OrientationState;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// RGB stroke color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Pure blue
    pub const BLUE: Self = Self::rgb(0, 0, 255);
    /// Deep sky blue
    pub const DEEP_SKY_BLUE: Self = Self::rgb(0, 191, 255);

    /// Create a color from components
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Stroke styling for face highlights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayStyle {
    /// Stroke of the first face
    pub primary: Color,
    /// Stroke of every other face
    pub secondary: Color,
    /// Stroke width
    pub thickness: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            primary: Color::BLUE,
            secondary: Color::DEEP_SKY_BLUE,
            thickness: DEFAULT_STROKE_THICKNESS,
        }
    }
}

/// One rectangle on the overlay, in surface coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayRect {
    /// Position and size
    pub rect: Rect,
    /// Stroke color
    pub stroke: Color,
    /// Stroke width
    pub thickness: f64,
}

/// Entry of the on-screen face list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceDetails {
    /// Analyzer face identifier
    pub face_id: String,
    /// Estimated age
    pub age: f64,
    /// Estimated gender
    pub gender: String,
    /// Name and score of the strongest emotion, if scored
    pub dominant_emotion: Option<(String, f32)>,
}

impl FaceDetails {
    /// Summarise a result; faces without attributes are not listed
    #[must_use]
    pub fn from_result(result: &FaceResult) -> Option<Self> {
        let attributes = result.attributes.as_ref()?;
        Some(Self {
            face_id: result.face_id.clone(),
            age: attributes.age,
            gender: attributes.gender.clone(),
            dominant_emotion: result
                .emotion
                .map(|emotion| {
                    let (name, score) = emotion.dominant();
                    (name.to_string(), score)
                }),
        })
    }
}

/// Display surface collaborator.
///
/// Only ever touched from the presentation queue, one command at a time.
pub trait PresentationSurface: Send + 'static {
    /// Current size of the surface
    fn actual_size(&self) -> Size;

    /// Remove every highlight rectangle
    fn clear_overlay(&mut self);

    /// Add a highlight rectangle
    fn add_rectangle(&mut self, rect: OverlayRect);

    /// Place, rotate and mirror the overlay layer
    fn set_overlay_transform(&mut self, transform: OverlayTransform);

    /// Replace the face list
    fn set_face_list(&mut self, faces: Vec<FaceDetails>);

    /// Show the image last sent for analysis
    fn set_thumbnail(&mut self, thumbnail: Option<Thumbnail>);
}

/// Draws face highlights and analysis results onto a surface
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayRenderer {
    style: OverlayStyle,
}

impl OverlayRenderer {
    /// Create a renderer with the given style
    #[must_use]
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    /// Highlight rectangles for `faces`, in surface coordinates
    #[must_use]
    pub fn layout(
        &self,
        faces: &[DetectionBox],
        stream: Dimensions,
        surface: Size,
        orientation: OrientationState,
    ) -> Vec<OverlayRect> {
        let area = compute_presentation_area(stream, surface, orientation.display);
        faces
            .iter()
            .enumerate()
            .map(|(index, face)| OverlayRect {
                rect: map_box(face, stream, &area, orientation.display),
                stroke: if index == 0 { self.style.primary } else { self.style.secondary },
                thickness: self.style.thickness,
            })
            .collect()
    }

    /// Replace the highlight set with `faces`.
    ///
    /// The previous set is always cleared; the overlay transform is only
    /// refreshed when there is something to show.
    pub fn highlight(
        &self,
        surface: &mut dyn PresentationSurface,
        faces: &[DetectionBox],
        stream: Dimensions,
        orientation: OrientationState,
    ) {
        surface.clear_overlay();
        if faces.is_empty() {
            return;
        }

        let size = surface.actual_size();
        for rect in self.layout(faces, stream, size, orientation) {
            surface.add_rectangle(rect);
        }

        let area = compute_presentation_area(stream, size, orientation.display);
        surface.set_overlay_transform(compute_overlay_rotation_and_bounds(
            orientation.display,
            orientation.mirrored,
            &area,
        ));
    }

    /// Replace the face list with an analysis result set, newest entry first
    pub fn show_results(&self, surface: &mut dyn PresentationSurface, results: &[FaceResult]) {
        let mut details = Vec::with_capacity(results.len());
        for result in results {
            if let Some(entry) = FaceDetails::from_result(result) {
                details.insert(0, entry);
            }
        }
        surface.set_face_list(details);

        if let Some(thumbnail) = results.iter().rev().find_map(|result| result.thumbnail.clone()) {
            surface.set_thumbnail(Some(thumbnail));
        }
    }

    /// Clear highlights, face list and thumbnail
    pub fn reset(&self, surface: &mut dyn PresentationSurface) {
        surface.clear_overlay();
        surface.set_face_list(Vec::new());
        surface.set_thumbnail(None);
    }
}

/// Everything a [`CanvasSurface`] currently shows
#[derive(Debug, Clone, Default)]
pub struct CanvasState {
    /// Surface size
    pub size: Size,
    /// Highlight rectangles
    pub rectangles: Vec<OverlayRect>,
    /// Overlay placement
    pub transform: OverlayTransform,
    /// Face list
    pub faces: Vec<FaceDetails>,
    /// Last analysed image
    pub thumbnail: Option<Thumbnail>,
    /// Number of times the overlay was cleared
    pub clears: u64,
}

impl CanvasState {
    /// Overlay is mirrored
    #[must_use]
    pub fn is_mirrored(&self) -> bool {
        self.transform.flow == FlowDirection::RightToLeft
    }
}

/// In-memory surface for headless runs; clones share the same state
#[derive(Debug, Clone)]
pub struct CanvasSurface {
    state: Arc<Mutex<CanvasState>>,
}

impl CanvasSurface {
    /// Create a surface of the given size
    #[must_use]
    pub fn new(size: Size) -> Self {
        Self {
            state: Arc::new(Mutex::new(CanvasState {
                size,
                ..CanvasState::default()
            })),
        }
    }

    /// Copy of the current state
    #[must_use]
    pub fn snapshot(&self) -> CanvasState {
        self.with_state(|state| state.clone())
    }

    /// Change the surface size, e.g. after a window resize
    pub fn resize(&self, size: Size) {
        self.with_state(|state| state.size = size);
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut CanvasState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

impl PresentationSurface for CanvasSurface {
    fn actual_size(&self) -> Size {
        self.with_state(|state| state.size)
    }

    fn clear_overlay(&mut self) {
        self.with_state(|state| {
            state.rectangles.clear();
            state.clears += 1;
        });
    }

    fn add_rectangle(&mut self, rect: OverlayRect) {
        self.with_state(|state| state.rectangles.push(rect));
    }

    fn set_overlay_transform(&mut self, transform: OverlayTransform) {
        self.with_state(|state| state.transform = transform);
    }

    fn set_face_list(&mut self, faces: Vec<FaceDetails>) {
        self.with_state(|state| state.faces = faces);
    }

    fn set_thumbnail(&mut self, thumbnail: Option<Thumbnail>) {
        self.with_state(|state| state.thumbnail = thumbnail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{EmotionScores, FaceAttributes};
    use crate::orientation::DisplayOrientation;

    fn landscape() -> OrientationState {
        OrientationState::default()
    }

    #[test]
    fn test_first_face_is_primary() {
        let mut surface = CanvasSurface::new(Size::new(800.0, 600.0));
        let faces = [DetectionBox::new(0, 0, 100, 100), DetectionBox::new(200, 200, 50, 50)];
        OverlayRenderer::default().highlight(&mut surface, &faces, Dimensions::new(1920, 1080), landscape());

        let state = surface.snapshot();
        assert_eq!(state.rectangles.len(), 2);
        assert_eq!(state.rectangles[0].stroke, Color::BLUE);
        assert_eq!(state.rectangles[1].stroke, Color::DEEP_SKY_BLUE);
        assert_eq!(state.rectangles[0].thickness, 2.0);
        assert_eq!(state.transform.bounds, Rect::new(0.0, 75.0, 800.0, 450.0));
    }

    #[test]
    fn test_empty_detection_clears_overlay() {
        let mut surface = CanvasSurface::new(Size::new(800.0, 600.0));
        let renderer = OverlayRenderer::default();
        renderer.highlight(&mut surface, &[DetectionBox::new(0, 0, 10, 10)], Dimensions::new(640, 480), landscape());
        renderer.highlight(&mut surface, &[], Dimensions::new(640, 480), landscape());

        let state = surface.snapshot();
        assert!(state.rectangles.is_empty());
        assert_eq!(state.clears, 2);
    }

    #[test]
    fn test_mirrored_portrait_transform() {
        let mut surface = CanvasSurface::new(Size::new(600.0, 800.0));
        let orientation = OrientationState {
            display: DisplayOrientation::Portrait,
            mirrored: true,
            ..OrientationState::default()
        };
        OverlayRenderer::default().highlight(
            &mut surface,
            &[DetectionBox::new(0, 0, 10, 10)],
            Dimensions::new(1920, 1080),
            orientation,
        );
        let state = surface.snapshot();
        assert_eq!(state.transform.angle_degrees, 270);
        assert!(state.is_mirrored());
    }

    #[test]
    fn test_show_results_lists_attributed_faces_newest_first() {
        let mut surface = CanvasSurface::new(Size::new(800.0, 600.0));
        let results = vec![
            FaceResult {
                face_id: "a".to_string(),
                attributes: Some(FaceAttributes {
                    age: 20.0,
                    ..FaceAttributes::default()
                }),
                ..FaceResult::default()
            },
            FaceResult {
                face_id: "no-attributes".to_string(),
                emotion: Some(EmotionScores::default()),
                ..FaceResult::default()
            },
            FaceResult {
                face_id: "b".to_string(),
                attributes: Some(FaceAttributes::default()),
                thumbnail: Some(Thumbnail {
                    width: 4,
                    height: 3,
                    png: Vec::new(),
                }),
                ..FaceResult::default()
            },
        ];
        let renderer = OverlayRenderer::default();
        renderer.show_results(&mut surface, &results);

        let state = surface.snapshot();
        let ids: Vec<&str> = state.faces.iter().map(|face| face.face_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(state.thumbnail.as_ref().map(|t| t.width), Some(4));

        renderer.reset(&mut surface);
        let state = surface.snapshot();
        assert!(state.faces.is_empty());
        assert!(state.thumbnail.is_none());
    }
}
