//! Core traits and types for the camera stack abstraction.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Out-of-memory errno, reported negated like the camera stack does.
pub const ENOMEM: i32 = 12;

/// Camera identifier as reported by the camera manager.
pub type CameraId = String;

/// Pixel format representation (e.g., YUYV, MJPG, NV12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// Build a `FourCC` from the little-endian packed form used by libcamera.
    #[must_use]
    pub const fn from_u32(code: u32) -> Self {
        Self(code.to_le_bytes())
    }

    /// Packed little-endian form of this code.
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");
    /// NV12 pixel format (4:2:0 semi-planar).
    pub const NV12: Self = Self::new(b"NV12");
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            let ch = if byte.is_ascii_graphic() || byte == b' ' {
                char::from(byte)
            } else {
                '?'
            };
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}

impl FromStr for FourCC {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes: [u8; 4] = s.as_bytes().try_into().map_err(|_| {
            CameraError::InvalidConfiguration(format!("pixel format must be 4 characters: {s:?}"))
        })?;
        Ok(Self(bytes))
    }
}

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Create a new size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Intended use of a stream, used to pick a default configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamRole {
    /// Low-latency preview.
    #[default]
    Viewfinder,
    /// High-quality still capture.
    StillCapture,
    /// Video recording.
    VideoRecording,
    /// Raw sensor output.
    Raw,
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Viewfinder => "viewfinder",
            Self::StillCapture => "still",
            Self::VideoRecording => "video",
            Self::Raw => "raw",
        };
        f.write_str(name)
    }
}

impl FromStr for StreamRole {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "viewfinder" => Ok(Self::Viewfinder),
            "still" | "stillcapture" => Ok(Self::StillCapture),
            "video" | "videorecording" => Ok(Self::VideoRecording),
            "raw" => Ok(Self::Raw),
            other => Err(CameraError::InvalidConfiguration(format!(
                "unknown stream role: {other}"
            ))),
        }
    }
}

/// Settings for a single stream of a camera configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Frame size.
    pub size: Size,
    /// Pixel format.
    pub pixel_format: FourCC,
    /// Bytes per line, filled in by the stack on validation.
    pub stride: u32,
    /// Total frame size in bytes, filled in by the stack on validation.
    pub frame_size: u32,
    /// Number of buffers the stack wants for this stream.
    pub buffer_count: u32,
}

impl StreamConfig {
    /// Create a stream configuration with derived stride and frame size.
    ///
    /// The derivation assumes a packed 2 bytes per pixel layout and saturates
    /// at `u32::MAX`; real stacks overwrite both values during validation.
    #[must_use]
    pub const fn new(size: Size, pixel_format: FourCC, buffer_count: u32) -> Self {
        let stride = size.width.saturating_mul(2);
        Self {
            size,
            pixel_format,
            stride,
            frame_size: stride.saturating_mul(size.height),
            buffer_count,
        }
    }
}

impl fmt::Display for StreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.size, self.pixel_format)
    }
}

/// An ordered set of stream configurations for one camera.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Configuration {
    streams: Vec<StreamConfig>,
}

impl Configuration {
    /// Create a configuration from per-stream settings.
    #[must_use]
    pub const fn new(streams: Vec<StreamConfig>) -> Self {
        Self { streams }
    }

    /// Stream configuration at `index`.
    pub fn at(&self, index: usize) -> Option<&StreamConfig> {
        self.streams.get(index)
    }

    /// Mutable stream configuration at `index`.
    pub fn at_mut(&mut self, index: usize) -> Option<&mut StreamConfig> {
        self.streams.get_mut(index)
    }

    /// Iterate over streams together with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (StreamId, &StreamConfig)> {
        self.streams
            .iter()
            .enumerate()
            .map(|(index, cfg)| (StreamId(index), cfg))
    }

    /// Number of streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether the configuration holds no streams.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, stream) in self.streams.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{stream}")?;
        }
        Ok(())
    }
}

/// Outcome of validating a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStatus {
    /// Accepted as-is.
    Valid,
    /// Accepted after the stack adjusted some settings.
    Adjusted,
    /// Cannot be made to work.
    Invalid,
}

/// Index of a stream within an applied configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub usize);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream{}", self.0)
    }
}

/// Lifecycle status of a capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Queued and not yet finished.
    Pending,
    /// Finished with frame data.
    Complete,
    /// Cancelled, typically because the camera was stopped.
    Cancelled,
}

/// Metadata for a completed frame buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Frame sequence number assigned by the camera stack.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Bytes actually used, one entry per memory plane.
    pub planes: Vec<u32>,
}

/// Completion event for one request, delivered over the completion channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedRequest {
    /// Cookie given when the request was created.
    pub cookie: u64,
    /// Final status.
    pub status: RequestStatus,
    /// Metadata of every buffer attached to the request.
    pub buffers: Vec<(StreamId, FrameMetadata)>,
}

/// Sending half of the completion channel handed to [`Camera::start`].
pub type CompletionSender = crossbeam_channel::Sender<CompletedRequest>;

/// Error type for camera operations.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// The camera manager could not be started.
    #[error("Failed to start camera manager: {0}")]
    ManagerStart(String),
    /// Enumeration returned no cameras.
    #[error("No cameras were identified on the system")]
    NoCameras,
    /// Camera with given id was not found.
    #[error("Camera {0} not found")]
    CameraNotFound(String),
    /// Camera could not be locked, usually because another session holds it.
    #[error("Failed to acquire camera {id}: {reason}")]
    AcquireFailed {
        /// Camera id.
        id: String,
        /// Reason reported by the stack.
        reason: String,
    },
    /// The stack could not produce a configuration for the role.
    #[error("No configuration available for role {0}")]
    ConfigurationUnavailable(StreamRole),
    /// Configuration failed validation or option checks.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Applying the configuration returned a negative code.
    #[error("Failed to configure camera (error {0})")]
    ConfigureFailed(i32),
    /// Buffer allocation failed for a stream.
    #[error("Can't allocate buffers for {stream} (error {code})")]
    AllocationFailed {
        /// Stream being allocated.
        stream: StreamId,
        /// Negative error code.
        code: i32,
    },
    /// The camera returned no request.
    #[error("Can't create request")]
    RequestCreationFailed,
    /// A buffer could not be attached to a request.
    #[error("Can't set buffer for request (error {0})")]
    AttachBufferFailed(i32),
    /// Camera start failed.
    #[error("Failed to start camera: {0}")]
    StartFailed(String),
    /// Request could not be queued.
    #[error("Failed to queue request: {0}")]
    QueueFailed(String),
    /// Camera stop failed.
    #[error("Failed to stop camera: {0}")]
    StopFailed(String),
    /// Operation called in the wrong session state.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
    /// Frame sequence did not pass validation.
    #[error("Frame sequence error: {0}")]
    Sequence(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CameraError {
    /// Process exit code for this error.
    ///
    /// Missing hardware and generic failures map to `1`; allocation and request
    /// failures carry the negated errno of the failing call.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::AllocationFailed { .. } | Self::RequestCreationFailed => -ENOMEM,
            Self::AttachBufferFailed(code) | Self::ConfigureFailed(code) => negative(*code),
            _ => 1,
        }
    }
}

/// Normalise an error code to its negative form, falling back to `-1`.
pub(crate) const fn negative(code: i32) -> i32 {
    if code < 0 {
        code
    } else if code > 0 {
        -code
    } else {
        -1
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Process-wide handle to the camera stack.
///
/// Construction starts the manager and dropping it stops the manager.
pub trait CameraManager {
    /// The camera handle returned by `acquire`.
    type Camera<'a>: Camera
    where
        Self: 'a;

    /// Ids of all cameras currently known, in stack order.
    fn cameras(&self) -> Vec<CameraId>;

    /// Take the exclusive lock on a camera. Dropping the handle releases it.
    fn acquire(&self, id: &str) -> Result<Self::Camera<'_>>;
}

/// An acquired camera.
pub trait Camera {
    /// Frame buffer type produced by `allocate`.
    type Buffer: FrameBuffer;
    /// Request type produced by `create_request`.
    type Request: CaptureRequest<Buffer = Self::Buffer>;

    /// Camera id.
    fn id(&self) -> &str;

    /// Default configuration for the given roles, one stream per role.
    fn generate_configuration(&mut self, roles: &[StreamRole]) -> Result<Configuration>;

    /// Validate the configuration, adjusting it in place to the nearest
    /// supported settings.
    fn validate(&mut self, config: &mut Configuration) -> ConfigStatus;

    /// Apply the configuration. The stack may fill in derived fields.
    fn configure(&mut self, config: &mut Configuration) -> Result<()>;

    /// Allocate frame buffers for a configured stream.
    fn allocate(&mut self, stream: StreamId) -> Result<Vec<Self::Buffer>>;

    /// Release allocator resources for a stream.
    fn free(&mut self, stream: StreamId) -> Result<()>;

    /// Create an empty request tagged with `cookie`.
    fn create_request(&mut self, cookie: u64) -> Result<Self::Request>;

    /// Register the completion channel and start streaming.
    fn start(&mut self, completions: CompletionSender) -> Result<()>;

    /// Hand a request to the camera.
    fn queue_request(&mut self, request: Self::Request) -> Result<()>;

    /// Stop streaming. Pending requests are cancelled and completion delivery ends.
    fn stop(&mut self) -> Result<()>;
}

/// A capture request under construction.
pub trait CaptureRequest {
    /// Buffer type accepted by this request.
    type Buffer;

    /// Cookie given at creation.
    fn cookie(&self) -> u64;

    /// Attach a buffer for `stream`. The request takes ownership of it.
    fn add_buffer(&mut self, stream: StreamId, buffer: Self::Buffer) -> Result<()>;

    /// Number of attached buffers.
    fn buffer_count(&self) -> usize;
}

/// A hardware-backed frame buffer.
pub trait FrameBuffer {
    /// Position of the buffer within its allocation.
    fn index(&self) -> usize;

    /// Number of memory planes.
    fn plane_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_u32_conversion() {
        let packed = FourCC::YUYV.to_u32();
        assert_eq!(FourCC::from_u32(packed), FourCC::YUYV);
        assert_eq!(FourCC::YUYV.to_string(), "YUYV");
    }

    #[test]
    fn test_fourcc_parse() {
        assert_eq!("NV12".parse::<FourCC>().expect("parse failed"), FourCC::NV12);
        assert!("NV1".parse::<FourCC>().is_err());
    }

    #[test]
    fn test_stream_config_display() {
        let cfg = StreamConfig::new(Size::new(640, 480), FourCC::YUYV, 4);
        assert_eq!(cfg.to_string(), "640x480-YUYV");
        assert_eq!(cfg.frame_size, 614_400);
    }

    #[test]
    fn test_stream_config_saturates_huge_sizes() {
        let cfg = StreamConfig::new(Size::new(70_000, 70_000), FourCC::YUYV, 4);
        assert_eq!(cfg.stride, 140_000);
        assert_eq!(cfg.frame_size, u32::MAX);
    }

    #[test]
    fn test_stream_role_parse() {
        assert_eq!(
            "Viewfinder".parse::<StreamRole>().expect("parse failed"),
            StreamRole::Viewfinder
        );
        assert_eq!(
            "still".parse::<StreamRole>().expect("parse failed"),
            StreamRole::StillCapture
        );
        assert!("preview".parse::<StreamRole>().is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CameraError::NoCameras.exit_code(), 1);
        assert_eq!(CameraError::RequestCreationFailed.exit_code(), -ENOMEM);
        assert_eq!(
            CameraError::AllocationFailed {
                stream: StreamId(0),
                code: -5,
            }
            .exit_code(),
            -ENOMEM
        );
        assert_eq!(CameraError::AttachBufferFailed(-17).exit_code(), -17);
        assert_eq!(CameraError::AttachBufferFailed(22).exit_code(), -22);
    }
}
