//! Performance benchmarks for the coordinate mapper and overlay layout

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use face_watch::geometry::{
    compute_overlay_rotation_and_bounds, compute_presentation_area, map_box, DetectionBox, Dimensions, Size,
};
use face_watch::orientation::{DisplayOrientation, OrientationState, OrientationTracker};
use face_watch::overlay::OverlayRenderer;
use face_watch::utils::clamp_boxes;

const ORIENTATIONS: [DisplayOrientation; 4] = [
    DisplayOrientation::Landscape,
    DisplayOrientation::Portrait,
    DisplayOrientation::LandscapeFlipped,
    DisplayOrientation::PortraitFlipped,
];

fn test_boxes(count: u32) -> Vec<DetectionBox> {
    (0..count)
        .map(|i| DetectionBox::new((i * 97) % 1800, (i * 53) % 1000, 80 + i % 40, 80 + i % 40))
        .collect()
}

/// Benchmark the per-cycle geometry path for each display orientation
fn bench_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("mapping");
    let stream = Dimensions::new(1920, 1080);
    let surface = Size::new(1366.0, 768.0);
    let boxes = test_boxes(8);

    for orientation in ORIENTATIONS {
        group.bench_with_input(
            BenchmarkId::new("map_boxes", format!("{orientation:?}")),
            &orientation,
            |b, &orientation| {
                b.iter(|| {
                    let area = compute_presentation_area(black_box(stream), black_box(surface), orientation);
                    let mapped: Vec<_> = boxes
                        .iter()
                        .map(|bbox| map_box(bbox, stream, &area, orientation))
                        .collect();
                    let transform = compute_overlay_rotation_and_bounds(orientation, true, &area);
                    black_box((mapped, transform))
                });
            },
        );
    }

    group.finish();
}

/// Benchmark full overlay layout with varying face counts
fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    let renderer = OverlayRenderer::default();
    let stream = Dimensions::new(1920, 1080);
    let orientation = OrientationState::default();

    for count in [1u32, 4, 16, 64] {
        let boxes = test_boxes(count);
        group.bench_with_input(BenchmarkId::new("faces", count), &boxes, |b, boxes| {
            b.iter(|| {
                let clamped = clamp_boxes(black_box(boxes.clone()), stream);
                black_box(renderer.layout(&clamped, stream, Size::new(800.0, 600.0), orientation))
            });
        });
    }

    group.finish();
}

/// Benchmark lock-free orientation reads and updates
fn bench_orientation(c: &mut Criterion) {
    let tracker = OrientationTracker::default();

    c.bench_function("orientation_snapshot", |b| {
        b.iter(|| black_box(tracker.snapshot()));
    });

    c.bench_function("orientation_set_display", |b| {
        let mut index = 0;
        b.iter(|| {
            tracker.set_display(ORIENTATIONS[index % ORIENTATIONS.len()]);
            index += 1;
        });
    });
}

criterion_group!(benches, bench_mapping, bench_layout, bench_orientation);
criterion_main!(benches);
