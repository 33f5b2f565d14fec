//! Error handling tests for all modules

use face_watch::{
    config::Config,
    error::{Error, FaultKind},
    frame::{Frame, PixelFormat},
    geometry::{DetectionBox, Dimensions},
    utils::{clamp_boxes, image_conversion::make_thumbnail, safe_cast::f64_to_u32_clamp},
};
use std::time::Duration;

#[test]
fn test_fault_taxonomy() {
    let device = Error::DeviceFault {
        code: 0xC00D_36B4,
        message: "removed".to_string(),
    };
    assert_eq!(device.kind(), FaultKind::Device);
    assert!(device.to_string().contains("0xC00D36B4"));

    // Failures of a single cycle
    for error in [
        Error::FramePull("no buffer".to_string()),
        Error::Detection("model".to_string()),
        Error::Analysis("503".to_string()),
        Error::AnalysisTimeout(Duration::from_secs(10)),
        Error::UnsupportedPixelFormat(PixelFormat::Nv12),
        Error::Dispatch("proxy".to_string()),
    ] {
        assert_eq!(error.kind(), FaultKind::TransientCycle, "{error}");
    }

    // Failures surfaced to whoever starts the pipeline
    for error in [
        Error::NoCamera,
        Error::MissingCredentials("face key".to_string()),
        Error::ConfigError("interval".to_string()),
    ] {
        assert_eq!(error.kind(), FaultKind::Config, "{error}");
    }
}

#[test]
fn test_io_error_converts() {
    let result = Config::from_file("/nonexistent/face-watch.yaml");
    match result {
        Err(Error::Io(_)) => {}
        other => panic!("Expected Io error, got {other:?}"),
    }
}

#[test]
fn test_invalid_yaml_is_config_error() {
    let result = Config::from_yaml("capture: [not, a, map]");
    match result {
        Err(Error::ConfigError(msg)) => assert!(msg.contains("Failed to parse config")),
        other => panic!("Expected ConfigError, got {other:?}"),
    }
}

#[test]
fn test_frame_buffer_mismatch() {
    assert!(matches!(
        Frame::new(PixelFormat::Bgra8, 4, 4, vec![0; 10]),
        Err(Error::InvalidInput(_))
    ));
    assert!(Frame::new(PixelFormat::Nv12, 0, 4, Vec::new()).is_err());
    assert!(Frame::filled(PixelFormat::Nv12, 4, 4, 0).is_ok());
}

#[test]
fn test_thumbnail_rejects_detection_frames() {
    let frame = Frame::filled(PixelFormat::Nv12, 8, 8, 0).unwrap();
    assert!(matches!(
        make_thumbnail(&frame, 4),
        Err(Error::UnsupportedPixelFormat(PixelFormat::Nv12))
    ));
}

#[test]
fn test_safe_cast_saturates() {
    assert_eq!(f64_to_u32_clamp(f64::NAN, 1, 10), 1);
    assert_eq!(f64_to_u32_clamp(f64::NEG_INFINITY, 1, 10), 1);
    assert_eq!(f64_to_u32_clamp(1e10, 1, 10), 10);
    assert_eq!(f64_to_u32_clamp(-0.5, 0, 10), 0);
}

#[test]
fn test_clamp_boxes_drops_outside() {
    let frame = Dimensions::new(100, 100);
    let boxes = vec![
        DetectionBox::new(150, 10, 10, 10),
        DetectionBox::new(10, 100, 10, 10),
        DetectionBox::new(10, 10, 0, 10),
        DetectionBox::new(95, 95, 20, 20),
    ];
    assert_eq!(clamp_boxes(boxes, frame), vec![DetectionBox::new(95, 95, 5, 5)]);
    assert!(clamp_boxes(Vec::new(), frame).is_empty());
}
