//! libcamera implementation using the libcamera crate.

use libcamera::camera::{ActiveCamera, CameraConfiguration, CameraConfigurationStatus};
use libcamera::camera_manager::CameraManager as LcCameraManager;
use libcamera::framebuffer::AsFrameBuffer;
use libcamera::framebuffer_allocator::{FrameBuffer as LcFrameBuffer, FrameBufferAllocator};
use libcamera::geometry::Size as LcSize;
use libcamera::pixel_format::PixelFormat;
use libcamera::request::{Request, RequestStatus as LcRequestStatus};
use libcamera::stream::{Stream, StreamRole as LcStreamRole};

use crate::traits::{
    negative, Camera, CameraError, CameraId, CameraManager, CaptureRequest, CompletedRequest,
    CompletionSender, ConfigStatus, Configuration, FourCC, FrameBuffer, FrameMetadata,
    RequestStatus, Result, Size, StreamConfig, StreamId, StreamRole, ENOMEM,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, trace};

const EINVAL: i32 = 22;

fn errno(err: &std::io::Error, fallback: i32) -> i32 {
    negative(err.raw_os_error().unwrap_or(fallback))
}

const fn lc_role(role: StreamRole) -> LcStreamRole {
    match role {
        StreamRole::Viewfinder => LcStreamRole::ViewFinder,
        StreamRole::StillCapture => LcStreamRole::StillCapture,
        StreamRole::VideoRecording => LcStreamRole::VideoRecording,
        StreamRole::Raw => LcStreamRole::Raw,
    }
}

/// libcamera camera manager. Started on creation; the inner manager stops
/// itself when dropped.
pub struct LibcameraManager {
    manager: LcCameraManager,
}

impl LibcameraManager {
    /// Start the libcamera camera manager.
    pub fn new() -> Result<Self> {
        let manager =
            LcCameraManager::new().map_err(|err| CameraError::ManagerStart(err.to_string()))?;
        info!("libcamera camera manager started");
        Ok(Self { manager })
    }
}

impl CameraManager for LibcameraManager {
    type Camera<'a> = LibcameraCamera<'a>;

    fn cameras(&self) -> Vec<CameraId> {
        let list = self.manager.cameras();
        (0..list.len())
            .filter_map(|index| list.get(index))
            .map(|camera| camera.id().to_owned())
            .collect()
    }

    fn acquire(&self, id: &str) -> Result<Self::Camera<'_>> {
        let list = self.manager.cameras();
        let camera = (0..list.len())
            .filter_map(|index| list.get(index))
            .find(|camera| camera.id() == id)
            .ok_or_else(|| CameraError::CameraNotFound(id.to_owned()))?;

        let active = camera.acquire().map_err(|err| CameraError::AcquireFailed {
            id: id.to_owned(),
            reason: err.to_string(),
        })?;

        Ok(LibcameraCamera {
            id: id.to_owned(),
            camera: active,
            config: None,
            streams: Vec::new(),
            allocator: None,
            allocated: Vec::new(),
            sink: Arc::new(Mutex::new(None)),
            callback_registered: false,
        })
    }
}

/// Frame buffer allocated by libcamera.
pub struct LibcameraBuffer {
    index: usize,
    inner: LcFrameBuffer,
}

impl FrameBuffer for LibcameraBuffer {
    fn index(&self) -> usize {
        self.index
    }

    fn plane_count(&self) -> usize {
        self.inner.planes().len()
    }
}

/// libcamera capture request.
pub struct LibcameraRequest {
    inner: Request,
    streams: Vec<Stream>,
    buffers: usize,
}

impl CaptureRequest for LibcameraRequest {
    type Buffer = LibcameraBuffer;

    fn cookie(&self) -> u64 {
        self.inner.cookie()
    }

    fn add_buffer(&mut self, stream: StreamId, buffer: LibcameraBuffer) -> Result<()> {
        let lc_stream = self
            .streams
            .get(stream.0)
            .ok_or(CameraError::AttachBufferFailed(-EINVAL))?;
        self.inner
            .add_buffer(lc_stream, buffer.inner)
            .map_err(|err| CameraError::AttachBufferFailed(errno(&err, EINVAL)))?;
        self.buffers += 1;
        Ok(())
    }

    fn buffer_count(&self) -> usize {
        self.buffers
    }
}

/// Acquired libcamera camera. Dropping it releases the camera.
pub struct LibcameraCamera<'d> {
    id: CameraId,
    camera: ActiveCamera<'d>,
    config: Option<CameraConfiguration>,
    streams: Vec<Stream>,
    allocator: Option<FrameBufferAllocator>,
    allocated: Vec<StreamId>,
    sink: Arc<Mutex<Option<CompletionSender>>>,
    callback_registered: bool,
}

impl LibcameraCamera<'_> {
    /// Copy our stream settings into the libcamera configuration.
    fn apply_settings(lc: &mut CameraConfiguration, config: &Configuration) {
        for (stream, settings) in config.iter() {
            if let Some(mut cfg) = lc.get_mut(stream.0) {
                cfg.set_size(LcSize {
                    width: settings.size.width,
                    height: settings.size.height,
                });
                cfg.set_pixel_format(PixelFormat::new(settings.pixel_format.to_u32(), 0));
                cfg.set_buffer_count(settings.buffer_count);
            }
        }
    }
}

fn snapshot(lc: &CameraConfiguration) -> Configuration {
    Configuration::new(
        (0..lc.len())
            .filter_map(|index| lc.get(index))
            .map(|cfg| {
                let size = cfg.get_size();
                StreamConfig {
                    size: Size::new(size.width, size.height),
                    pixel_format: FourCC::from_u32(cfg.get_pixel_format().fourcc()),
                    stride: cfg.get_stride(),
                    frame_size: cfg.get_frame_size(),
                    buffer_count: cfg.get_buffer_count(),
                }
            })
            .collect(),
    )
}

fn completed_request(request: &Request, streams: &[(StreamId, Stream)]) -> CompletedRequest {
    let status = match request.status() {
        LcRequestStatus::Pending => RequestStatus::Pending,
        LcRequestStatus::Complete => RequestStatus::Complete,
        LcRequestStatus::Cancelled => RequestStatus::Cancelled,
    };

    let buffers = streams
        .iter()
        .filter_map(|(id, stream)| {
            let buffer: &LcFrameBuffer = request.buffer(stream)?;
            let metadata = buffer.metadata()?;
            let planes = metadata.planes();
            Some((
                *id,
                FrameMetadata {
                    sequence: metadata.sequence(),
                    timestamp: Duration::from_nanos(metadata.timestamp()),
                    planes: (0..planes.len())
                        .filter_map(|index| planes.get(index))
                        .map(|plane| plane.bytes_used)
                        .collect(),
                },
            ))
        })
        .collect();

    CompletedRequest {
        cookie: request.cookie(),
        status,
        buffers,
    }
}

impl Camera for LibcameraCamera<'_> {
    type Buffer = LibcameraBuffer;
    type Request = LibcameraRequest;

    fn id(&self) -> &str {
        &self.id
    }

    fn generate_configuration(&mut self, roles: &[StreamRole]) -> Result<Configuration> {
        let role = roles.first().copied().unwrap_or_default();
        let lc_roles: Vec<LcStreamRole> = roles.iter().copied().map(lc_role).collect();

        let lc = self
            .camera
            .generate_configuration(&lc_roles)
            .ok_or(CameraError::ConfigurationUnavailable(role))?;
        let config = snapshot(&lc);
        self.config = Some(lc);
        Ok(config)
    }

    fn validate(&mut self, config: &mut Configuration) -> ConfigStatus {
        let Some(lc) = self.config.as_mut() else {
            return ConfigStatus::Invalid;
        };

        Self::apply_settings(lc, config);
        let status = match lc.validate() {
            CameraConfigurationStatus::Valid => ConfigStatus::Valid,
            CameraConfigurationStatus::Adjusted => ConfigStatus::Adjusted,
            CameraConfigurationStatus::Invalid => ConfigStatus::Invalid,
        };
        *config = snapshot(lc);
        status
    }

    fn configure(&mut self, config: &mut Configuration) -> Result<()> {
        let lc = self
            .config
            .as_mut()
            .ok_or(CameraError::InvalidState("no configuration generated"))?;

        Self::apply_settings(lc, config);
        self.camera
            .configure(lc)
            .map_err(|err| CameraError::ConfigureFailed(errno(&err, EINVAL)))?;

        self.streams = (0..lc.len())
            .filter_map(|index| lc.get(index))
            .filter_map(|cfg| cfg.stream())
            .collect();
        if self.streams.len() != lc.len() {
            return Err(CameraError::InvalidState(
                "configured stream missing from configuration",
            ));
        }

        *config = snapshot(lc);
        self.allocator = Some(FrameBufferAllocator::new(&self.camera));
        debug!(camera = %self.id, %config, "libcamera configuration applied");
        Ok(())
    }

    fn allocate(&mut self, stream: StreamId) -> Result<Vec<LibcameraBuffer>> {
        let lc_stream = self
            .streams
            .get(stream.0)
            .ok_or(CameraError::InvalidState("stream is not configured"))?;
        let allocator = self
            .allocator
            .as_mut()
            .ok_or(CameraError::InvalidState("camera is not configured"))?;

        let buffers = allocator
            .alloc(lc_stream)
            .map_err(|err| CameraError::AllocationFailed {
                stream,
                code: errno(&err, ENOMEM),
            })?;
        self.allocated.push(stream);

        Ok(buffers
            .into_iter()
            .enumerate()
            .map(|(index, inner)| LibcameraBuffer { index, inner })
            .collect())
    }

    fn free(&mut self, stream: StreamId) -> Result<()> {
        self.allocated.retain(|allocated| *allocated != stream);
        // libcamera frees per allocator; buffers still held by requests keep
        // their memory alive until those requests are dropped.
        if self.allocated.is_empty() {
            self.allocator = None;
        }
        Ok(())
    }

    fn create_request(&mut self, cookie: u64) -> Result<LibcameraRequest> {
        let inner = self
            .camera
            .create_request(Some(cookie))
            .ok_or(CameraError::RequestCreationFailed)?;
        Ok(LibcameraRequest {
            inner,
            streams: self.streams.clone(),
            buffers: 0,
        })
    }

    fn start(&mut self, completions: CompletionSender) -> Result<()> {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(completions);

        if !self.callback_registered {
            let sink = Arc::clone(&self.sink);
            let streams: Vec<(StreamId, Stream)> = self
                .streams
                .iter()
                .copied()
                .enumerate()
                .map(|(index, stream)| (StreamId(index), stream))
                .collect();

            self.camera.on_request_completed(move |request: Request| {
                let completed = completed_request(&request, &streams);
                let guard = sink.lock().unwrap_or_else(PoisonError::into_inner);
                match guard.as_ref() {
                    Some(tx) => {
                        let _ = tx.send(completed);
                    }
                    None => trace!(cookie = completed.cookie, "completion after stop dropped"),
                }
            });
            self.callback_registered = true;
        }

        self.camera
            .start(None)
            .map_err(|err| CameraError::StartFailed(err.to_string()))
    }

    fn queue_request(&mut self, request: LibcameraRequest) -> Result<()> {
        self.camera
            .queue_request(request.inner)
            .map_err(|(_, err)| CameraError::QueueFailed(err.to_string()))
    }

    fn stop(&mut self) -> Result<()> {
        let result = self
            .camera
            .stop()
            .map_err(|err| CameraError::StopFailed(err.to_string()));
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        result
    }
}

impl Drop for LibcameraCamera<'_> {
    fn drop(&mut self) {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!(camera = %self.id, "releasing camera");
    }
}
