//! Integration tests against a real libcamera stack.
//!
//! These tests require:
//! - The `integration` feature flag: `cargo test --features integration`
//! - libcamera installed with at least one camera it can drive
//!   (a Raspberry Pi camera module, a UVC webcam, or the `vimc` test driver)
//! - Access to the camera devices (may require video group membership)
//!
//! Tests will fail if no camera is available.

#![cfg(feature = "integration")]

use pi_cam_viewfinder::session;
use pi_cam_viewfinder::traits::{CameraError, CameraManager, ConfigStatus, FrameBuffer};
use pi_cam_viewfinder::validation::analyze_sequences;
use pi_cam_viewfinder::{run_capture, CaptureOptions, LibcameraManager, Size};
use serial_test::serial;
use std::time::Duration;

/// Macro to fail test if no camera is available.
///
/// Returns the started manager and the first camera id.
/// Integration tests MUST have a camera - they should fail, not silently skip.
macro_rules! require_camera {
    () => {{
        let manager = LibcameraManager::new().expect("Failed to start libcamera camera manager");
        let Some(id) = manager.cameras().first().cloned() else {
            panic!(
                "No libcamera camera available.\n\
                 Load the virtual driver with: sudo modprobe vimc\n\
                 Or run unit tests only: cargo test --lib"
            );
        };
        (manager, id)
    }};
}

#[test]
#[serial]
fn test_libcamera_enumerates_cameras() {
    let (manager, id) = require_camera!();

    let ids = session::enumerate(&manager).expect("Failed to enumerate cameras");
    assert!(ids.contains(&id));

    println!("Found {} camera(s):", ids.len());
    for id in &ids {
        println!("  {id}");
    }
}

#[test]
#[serial]
fn test_libcamera_acquire_is_exclusive() {
    let (manager, id) = require_camera!();

    let first = session::acquire(&manager, &id).expect("Failed to acquire camera");
    let second = session::acquire(&manager, &id);
    assert!(
        matches!(second, Err(CameraError::AcquireFailed { .. })),
        "Second acquisition should fail while the camera is held"
    );

    drop(first);
    session::acquire(&manager, &id).expect("Camera should be free after release");
}

#[test]
#[serial]
fn test_libcamera_configure_viewfinder() {
    let (manager, id) = require_camera!();
    let mut session = session::acquire(&manager, &id).expect("Failed to acquire camera");

    let outcome = session
        .configure(&CaptureOptions::default())
        .expect("Failed to configure camera");

    println!("Default:   {}", outcome.default);
    println!("Validated: {} ({:?})", outcome.validated, outcome.status);
    assert_ne!(outcome.status, ConfigStatus::Invalid);

    let stream = &outcome.validated;
    assert!(stream.size.width > 0 && stream.size.height > 0);
    assert!(stream.buffer_count > 0);
}

#[test]
#[serial]
fn test_libcamera_allocates_one_buffer_per_slot() {
    let (manager, id) = require_camera!();
    let mut session = session::acquire(&manager, &id).expect("Failed to acquire camera");
    let outcome = session
        .configure(&CaptureOptions::default())
        .expect("Failed to configure camera");

    let allocations = session.allocate_buffers().expect("Failed to allocate buffers");
    let (_, buffers) = allocations.first().expect("No stream allocated");
    assert_eq!(
        u32::try_from(buffers.len()).ok(),
        Some(outcome.validated.buffer_count)
    );
    for buffer in buffers {
        assert!(buffer.plane_count() >= 1, "Buffer without planes");
    }

    session.teardown().expect("Teardown failed");
}

#[test]
#[serial]
fn test_libcamera_capture_reports_frames() {
    let (manager, id) = require_camera!();
    let options = CaptureOptions::default()
        .with_camera(id)
        .with_size(Size::new(640, 480))
        .with_window(Duration::from_secs(1));

    let (out, summary) = run_capture(&manager, &options, Vec::new()).expect("Capture failed");
    let text = String::from_utf8(out).expect("Output is not UTF-8");

    let frame_lines = text.lines().filter(|line| line.starts_with("seq: ")).count();
    println!("{text}");
    println!(
        "Completed: {}, cancelled: {}",
        summary.completed, summary.cancelled
    );

    assert!(summary.completed > 0, "No frames completed in one second");
    assert_eq!(frame_lines, summary.completed);

    let analysis = analyze_sequences(&summary.sequences);
    assert_eq!(analysis.frames, summary.completed);
    println!(
        "Dropped: {}, reordered: {}",
        analysis.dropped, analysis.reordered
    );
}
