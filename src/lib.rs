//! Pi-Cam-Viewfinder: request-based viewfinder capture for libcamera cameras
//!
//! This library drives a camera stack through one capture run: enumerate,
//! acquire, configure, allocate buffers, queue one request per buffer, report
//! completed frames and tear everything down. The stack sits behind traits so
//! the same run works against libcamera and against the mock stack.

pub mod capture;
pub mod config;
#[cfg(feature = "libcamera")]
pub mod device;
pub mod mock;
pub mod report;
pub mod session;
pub mod traits;
pub mod validation;

pub use capture::run_capture;
pub use config::CaptureOptions;
#[cfg(feature = "libcamera")]
pub use device::LibcameraManager;
pub use mock::MockManager;
pub use report::{ReportSummary, Reporter};
pub use session::CaptureSession;
pub use traits::{
    Camera, CameraError, CameraManager, CaptureRequest, CompletedRequest, Configuration, FourCC,
    FrameBuffer, FrameMetadata, RequestStatus, Size, StreamConfig, StreamId, StreamRole,
};
