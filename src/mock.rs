//! Mock camera stack for running capture sessions without hardware.
//!
//! The mock records every call into a shared [`CallLog`] and completes
//! requests from its own worker thread, either immediately in queue order
//! or following a [`ScriptedFrame`] list.

use crate::traits::{
    Camera, CameraError, CameraId, CameraManager, CaptureRequest, CompletedRequest,
    CompletionSender, ConfigStatus, Configuration, FourCC, FrameBuffer, FrameMetadata,
    RequestStatus, Result, Size, StreamConfig, StreamId, StreamRole, ENOMEM,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const EEXIST: i32 = 17;
const EINVAL: i32 = 22;

/// A call made into the mock stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Camera enumeration.
    Cameras,
    /// Camera acquisition.
    Acquire(CameraId),
    /// Default configuration request.
    GenerateConfiguration(Vec<StreamRole>),
    /// Configuration validation.
    Validate,
    /// Configuration applied, as received.
    Configure(Configuration),
    /// Buffer allocation for a stream.
    Allocate {
        /// Stream being allocated.
        stream: StreamId,
        /// Frame size of the buffers.
        size: Size,
        /// Number of buffers handed out.
        count: usize,
    },
    /// Buffers freed for a stream.
    Free(StreamId),
    /// Request created.
    CreateRequest(u64),
    /// Buffer attached to a request.
    AddBuffer {
        /// Request cookie.
        cookie: u64,
        /// Stream of the buffer.
        stream: StreamId,
        /// Buffer index.
        buffer: usize,
    },
    /// Camera started.
    Start,
    /// Request queued.
    Queue(u64),
    /// Camera stopped.
    Stop,
    /// Camera released.
    Release(CameraId),
    /// Manager stopped.
    ManagerStop,
}

/// Shared, clonable record of calls made into the mock stack.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn record(&self, call: Call) {
        trace!(?call, "mock call");
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Snapshot of all recorded calls in order.
    pub fn calls(&self) -> Vec<Call> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count<F>(&self, pred: F) -> usize
    where
        F: Fn(&Call) -> bool,
    {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| pred(call))
            .count()
    }
}

/// One completion the mock emits when running a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedFrame {
    /// Cookie of the request to complete.
    pub cookie: u64,
    /// Sequence number to report.
    pub sequence: u32,
    /// Report the request as cancelled instead of completed.
    pub cancelled: bool,
}

impl ScriptedFrame {
    /// Complete request `cookie` with `sequence`.
    #[must_use]
    pub const fn complete(cookie: u64, sequence: u32) -> Self {
        Self {
            cookie,
            sequence,
            cancelled: false,
        }
    }

    /// Cancel request `cookie`.
    #[must_use]
    pub const fn cancelled(cookie: u64) -> Self {
        Self {
            cookie,
            sequence: 0,
            cancelled: true,
        }
    }
}

#[derive(Debug, Clone)]
struct MockBehavior {
    default_config: StreamConfig,
    supported_sizes: Vec<Size>,
    planes: usize,
    fail_allocation: bool,
    request_limit: Option<usize>,
    attach_failure: Option<i32>,
    fail_queue: bool,
    script: Option<Vec<ScriptedFrame>>,
    frame_interval: Duration,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            default_config: StreamConfig::new(Size::new(1280, 720), FourCC::YUYV, 4),
            supported_sizes: Vec::new(),
            planes: 1,
            fail_allocation: false,
            request_limit: None,
            attach_failure: None,
            fail_queue: false,
            script: None,
            frame_interval: Duration::ZERO,
        }
    }
}

/// Mock camera manager.
pub struct MockManager {
    cameras: Vec<CameraId>,
    held: Mutex<HashSet<CameraId>>,
    behavior: MockBehavior,
    log: CallLog,
}

impl Default for MockManager {
    fn default() -> Self {
        Self::new(["mock:0"])
    }
}

impl MockManager {
    /// Create a mock manager exposing the given camera ids.
    #[must_use]
    pub fn new<I, S>(cameras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CameraId>,
    {
        Self {
            cameras: cameras.into_iter().map(Into::into).collect(),
            held: Mutex::new(HashSet::new()),
            behavior: MockBehavior::default(),
            log: CallLog::default(),
        }
    }

    /// Mark a camera as already locked by another session.
    #[must_use]
    pub fn with_busy(self, id: &str) -> Self {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_owned());
        self
    }

    /// Set the default stream configuration returned for every role.
    #[must_use]
    pub fn with_default_config(mut self, config: StreamConfig) -> Self {
        self.behavior.default_config = config;
        self
    }

    /// Restrict validation to these sizes. Unsupported sizes are adjusted
    /// to the nearest entry.
    #[must_use]
    pub fn with_supported_sizes(mut self, sizes: Vec<Size>) -> Self {
        self.behavior.supported_sizes = sizes;
        self
    }

    /// Number of memory planes per buffer.
    #[must_use]
    pub fn with_planes(mut self, planes: usize) -> Self {
        self.behavior.planes = planes.max(1);
        self
    }

    /// Make every allocation fail.
    #[must_use]
    pub fn with_allocation_failure(mut self) -> Self {
        self.behavior.fail_allocation = true;
        self
    }

    /// Fail request creation after `limit` requests.
    #[must_use]
    pub fn with_request_limit(mut self, limit: usize) -> Self {
        self.behavior.request_limit = Some(limit);
        self
    }

    /// Make buffer attachment fail with `code`.
    #[must_use]
    pub fn with_attach_failure(mut self, code: i32) -> Self {
        self.behavior.attach_failure = Some(code);
        self
    }

    /// Make every request queueing fail after the camera has started.
    #[must_use]
    pub fn with_queue_failure(mut self) -> Self {
        self.behavior.fail_queue = true;
        self
    }

    /// Complete requests following `script` instead of queue order.
    #[must_use]
    pub fn with_script(mut self, script: Vec<ScriptedFrame>) -> Self {
        self.behavior.script = Some(script);
        self
    }

    /// Delay between consecutive completions.
    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.behavior.frame_interval = interval;
        self
    }

    /// Handle on the call log shared with every camera of this manager.
    #[must_use]
    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }
}

impl CameraManager for MockManager {
    type Camera<'a> = MockCamera<'a>;

    fn cameras(&self) -> Vec<CameraId> {
        self.log.record(Call::Cameras);
        self.cameras.clone()
    }

    fn acquire(&self, id: &str) -> Result<Self::Camera<'_>> {
        self.log.record(Call::Acquire(id.to_owned()));

        if !self.cameras.iter().any(|camera| camera == id) {
            return Err(CameraError::CameraNotFound(id.to_owned()));
        }

        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(id.to_owned()) {
            return Err(CameraError::AcquireFailed {
                id: id.to_owned(),
                reason: "device busy".to_owned(),
            });
        }

        Ok(MockCamera {
            id: id.to_owned(),
            behavior: &self.behavior,
            held: &self.held,
            log: self.log.clone(),
            configured: None,
            allocated: Vec::new(),
            created: 0,
            worker: None,
        })
    }
}

impl Drop for MockManager {
    fn drop(&mut self) {
        self.log.record(Call::ManagerStop);
    }
}

/// Mock frame buffer.
#[derive(Debug)]
pub struct MockBuffer {
    index: usize,
    planes: Vec<u32>,
}

impl FrameBuffer for MockBuffer {
    fn index(&self) -> usize {
        self.index
    }

    fn plane_count(&self) -> usize {
        self.planes.len()
    }
}

/// Mock capture request.
#[derive(Debug)]
pub struct MockRequest {
    cookie: u64,
    buffers: Vec<(StreamId, MockBuffer)>,
    attach_failure: Option<i32>,
    log: CallLog,
}

impl MockRequest {
    fn metadata(&self, sequence: u32, timestamp: Duration) -> Vec<(StreamId, FrameMetadata)> {
        self.buffers
            .iter()
            .map(|(stream, buffer)| {
                (
                    *stream,
                    FrameMetadata {
                        sequence,
                        timestamp,
                        planes: buffer.planes.clone(),
                    },
                )
            })
            .collect()
    }
}

impl CaptureRequest for MockRequest {
    type Buffer = MockBuffer;

    fn cookie(&self) -> u64 {
        self.cookie
    }

    fn add_buffer(&mut self, stream: StreamId, buffer: MockBuffer) -> Result<()> {
        if let Some(code) = self.attach_failure {
            return Err(CameraError::AttachBufferFailed(code));
        }
        if self.buffers.iter().any(|(existing, _)| *existing == stream) {
            return Err(CameraError::AttachBufferFailed(-EEXIST));
        }

        self.log.record(Call::AddBuffer {
            cookie: self.cookie,
            stream,
            buffer: buffer.index,
        });
        self.buffers.push((stream, buffer));
        Ok(())
    }

    fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

/// Mock acquired camera.
pub struct MockCamera<'a> {
    id: CameraId,
    behavior: &'a MockBehavior,
    held: &'a Mutex<HashSet<CameraId>>,
    log: CallLog,
    configured: Option<Configuration>,
    allocated: Vec<StreamId>,
    created: usize,
    worker: Option<Worker>,
}

impl MockCamera<'_> {
    /// Snap `stream` to what the mock supports. `None` when the frame does
    /// not fit in `u32` bytes.
    fn adjust(&self, stream: &mut StreamConfig) -> Option<bool> {
        let mut adjusted = false;

        if !self.behavior.supported_sizes.is_empty()
            && !self.behavior.supported_sizes.contains(&stream.size)
        {
            let requested = stream.size;
            if let Some(nearest) = self
                .behavior
                .supported_sizes
                .iter()
                .min_by_key(|size| {
                    u64::from(size.width.abs_diff(requested.width))
                        + u64::from(size.height.abs_diff(requested.height))
                })
            {
                stream.size = *nearest;
                adjusted = true;
            }
        }

        if stream.buffer_count == 0 {
            stream.buffer_count = self.behavior.default_config.buffer_count.max(1);
            adjusted = true;
        }

        let (stride, frame_size) = layout(stream.size, stream.pixel_format)?;
        stream.stride = stride;
        stream.frame_size = frame_size;
        Some(adjusted)
    }
}

impl Camera for MockCamera<'_> {
    type Buffer = MockBuffer;
    type Request = MockRequest;

    fn id(&self) -> &str {
        &self.id
    }

    fn generate_configuration(&mut self, roles: &[StreamRole]) -> Result<Configuration> {
        self.log.record(Call::GenerateConfiguration(roles.to_vec()));

        let Some(role) = roles.first() else {
            return Err(CameraError::InvalidConfiguration(
                "at least one stream role is required".to_owned(),
            ));
        };
        debug!(camera = %self.id, %role, "generating mock configuration");

        Ok(Configuration::new(
            roles
                .iter()
                .map(|_| self.behavior.default_config.clone())
                .collect(),
        ))
    }

    fn validate(&mut self, config: &mut Configuration) -> ConfigStatus {
        self.log.record(Call::Validate);

        if config.is_empty() {
            return ConfigStatus::Invalid;
        }

        let mut adjusted = false;
        for index in 0..config.len() {
            if let Some(stream) = config.at_mut(index) {
                if stream.size.width == 0 || stream.size.height == 0 {
                    return ConfigStatus::Invalid;
                }
                match self.adjust(stream) {
                    Some(changed) => adjusted |= changed,
                    None => {
                        debug!(camera = %self.id, size = %stream.size, "frame size overflows");
                        return ConfigStatus::Invalid;
                    }
                }
            }
        }

        if adjusted {
            ConfigStatus::Adjusted
        } else {
            ConfigStatus::Valid
        }
    }

    fn configure(&mut self, config: &mut Configuration) -> Result<()> {
        self.log.record(Call::Configure(config.clone()));

        let acceptable = config.iter().all(|(_, stream)| {
            stream.size.width > 0 && stream.size.height > 0 && stream.buffer_count > 0
        });
        if config.is_empty() || !acceptable {
            return Err(CameraError::ConfigureFailed(-EINVAL));
        }

        self.configured = Some(config.clone());
        Ok(())
    }

    fn allocate(&mut self, stream: StreamId) -> Result<Vec<MockBuffer>> {
        let cfg = self
            .configured
            .as_ref()
            .and_then(|config| config.at(stream.0))
            .ok_or(CameraError::InvalidState("stream is not configured"))?;

        if self.behavior.fail_allocation {
            return Err(CameraError::AllocationFailed {
                stream,
                code: -ENOMEM,
            });
        }

        let planes = plane_sizes(cfg, self.behavior.planes);
        let count = usize::try_from(cfg.buffer_count).unwrap_or(usize::MAX);
        let buffers: Vec<MockBuffer> = (0..count)
            .map(|index| MockBuffer {
                index,
                planes: planes.clone(),
            })
            .collect();

        self.log.record(Call::Allocate {
            stream,
            size: cfg.size,
            count: buffers.len(),
        });
        self.allocated.push(stream);
        Ok(buffers)
    }

    fn free(&mut self, stream: StreamId) -> Result<()> {
        self.log.record(Call::Free(stream));
        self.allocated.retain(|allocated| *allocated != stream);
        Ok(())
    }

    fn create_request(&mut self, cookie: u64) -> Result<MockRequest> {
        self.log.record(Call::CreateRequest(cookie));

        if self
            .behavior
            .request_limit
            .is_some_and(|limit| self.created >= limit)
        {
            return Err(CameraError::RequestCreationFailed);
        }
        self.created += 1;

        Ok(MockRequest {
            cookie,
            buffers: Vec::new(),
            attach_failure: self.behavior.attach_failure,
            log: self.log.clone(),
        })
    }

    fn start(&mut self, completions: CompletionSender) -> Result<()> {
        self.log.record(Call::Start);

        if self.worker.is_some() {
            return Err(CameraError::InvalidState("camera already started"));
        }

        let worker = Worker::spawn(
            completions,
            self.behavior.script.clone(),
            self.behavior.frame_interval,
        )
        .map_err(|err| CameraError::StartFailed(err.to_string()))?;
        self.worker = Some(worker);
        Ok(())
    }

    fn queue_request(&mut self, request: MockRequest) -> Result<()> {
        self.log.record(Call::Queue(request.cookie));

        if self.behavior.fail_queue {
            return Err(CameraError::QueueFailed("queue rejected".to_owned()));
        }

        let worker = self
            .worker
            .as_ref()
            .ok_or(CameraError::InvalidState("camera is not started"))?;
        worker
            .tx
            .send(WorkerMsg::Queue(request))
            .map_err(|_| CameraError::QueueFailed("mock worker has exited".to_owned()))
    }

    fn stop(&mut self) -> Result<()> {
        self.log.record(Call::Stop);

        if let Some(worker) = self.worker.take() {
            worker.stop()?;
        }
        Ok(())
    }
}

impl Drop for MockCamera<'_> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop();
        }
        self.log.record(Call::Release(self.id.clone()));
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Stride and frame size for a packed or semi-planar format, or `None` if
/// either overflows.
fn layout(size: Size, format: FourCC) -> Option<(u32, u32)> {
    let Size { width, height } = size;
    match format {
        FourCC::NV12 => {
            let luma = width.checked_mul(height)?;
            Some((width, luma.checked_mul(3)? / 2))
        }
        FourCC::RGB3 => {
            let stride = width.checked_mul(3)?;
            Some((stride, stride.checked_mul(height)?))
        }
        _ => {
            let stride = width.checked_mul(2)?;
            Some((stride, stride.checked_mul(height)?))
        }
    }
}

/// Split a frame into per-plane byte counts. The first plane holds the
/// full-stride luma area, the rest share the remainder.
fn plane_sizes(cfg: &StreamConfig, planes: usize) -> Vec<u32> {
    if planes <= 1 {
        return vec![cfg.frame_size];
    }

    let first = cfg.stride.saturating_mul(cfg.size.height).min(cfg.frame_size);
    let rest = u32::try_from(planes - 1).unwrap_or(u32::MAX);
    let share = (cfg.frame_size - first) / rest;
    std::iter::once(first)
        .chain(std::iter::repeat(share).take(planes - 1))
        .collect()
}

enum WorkerMsg {
    Queue(MockRequest),
    Stop,
}

/// Thread that plays the role of the camera stack's completion thread.
struct Worker {
    tx: Sender<WorkerMsg>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(
        sink: CompletionSender,
        script: Option<Vec<ScriptedFrame>>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = std::thread::Builder::new()
            .name("mock-camera".to_owned())
            .spawn(move || run_worker(&rx, &sink, script, interval))?;
        Ok(Self { tx, handle })
    }

    fn stop(self) -> Result<()> {
        let _ = self.tx.send(WorkerMsg::Stop);
        self.handle
            .join()
            .map_err(|_| CameraError::StopFailed("mock worker panicked".to_owned()))
    }
}

struct Pending {
    request: MockRequest,
    sequence: u32,
    cancelled: bool,
}

fn run_worker(
    rx: &Receiver<WorkerMsg>,
    sink: &CompletionSender,
    script: Option<Vec<ScriptedFrame>>,
    interval: Duration,
) {
    let started = Instant::now();
    let mut held: Vec<MockRequest> = Vec::new();
    let mut outbox: VecDeque<Pending> = VecDeque::new();
    let mut script_fired = false;
    let mut sequence = 0u32;

    loop {
        let msg = if outbox.is_empty() {
            rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            rx.recv_timeout(interval)
        };

        match msg {
            Ok(WorkerMsg::Queue(request)) => match &script {
                None => {
                    outbox.push_back(Pending {
                        request,
                        sequence,
                        cancelled: false,
                    });
                    sequence = sequence.wrapping_add(1);
                }
                Some(frames) => {
                    held.push(request);
                    let ready = frames
                        .iter()
                        .all(|frame| held.iter().any(|req| req.cookie == frame.cookie));
                    if !script_fired && ready {
                        script_fired = true;
                        for frame in frames {
                            if let Some(pos) = held.iter().position(|req| req.cookie == frame.cookie)
                            {
                                outbox.push_back(Pending {
                                    request: held.swap_remove(pos),
                                    sequence: frame.sequence,
                                    cancelled: frame.cancelled,
                                });
                            }
                        }
                    }
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                if let Some(pending) = outbox.pop_front() {
                    let status = if pending.cancelled {
                        RequestStatus::Cancelled
                    } else {
                        RequestStatus::Complete
                    };
                    emit(sink, &pending.request, status, pending.sequence, started.elapsed());
                }
            }
            Ok(WorkerMsg::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Stopping cancels everything still in flight.
    for pending in outbox.drain(..) {
        emit(
            sink,
            &pending.request,
            RequestStatus::Cancelled,
            pending.sequence,
            started.elapsed(),
        );
    }
    for request in held.drain(..) {
        emit(sink, &request, RequestStatus::Cancelled, 0, started.elapsed());
    }
}

fn emit(
    sink: &CompletionSender,
    request: &MockRequest,
    status: RequestStatus,
    sequence: u32,
    timestamp: Duration,
) {
    let completed = CompletedRequest {
        cookie: request.cookie,
        status,
        buffers: request.metadata(sequence, timestamp),
    };
    if sink.send(completed).is_err() {
        trace!(cookie = request.cookie, "completion receiver gone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured_camera(manager: &MockManager) -> MockCamera<'_> {
        let mut camera = manager.acquire("mock:0").expect("acquire failed");
        let mut config = camera
            .generate_configuration(&[StreamRole::Viewfinder])
            .expect("generate_configuration failed");
        camera.validate(&mut config);
        camera.configure(&mut config).expect("configure failed");
        camera
    }

    #[test]
    fn test_mock_manager_lists_cameras() {
        let manager = MockManager::new(["cam-a", "cam-b"]);
        assert_eq!(manager.cameras(), vec!["cam-a", "cam-b"]);
    }

    #[test]
    fn test_acquire_is_exclusive() {
        let manager = MockManager::default();
        let camera = manager.acquire("mock:0").expect("acquire failed");

        let second = manager.acquire("mock:0");
        assert!(matches!(second, Err(CameraError::AcquireFailed { .. })));

        drop(camera);
        assert!(manager.acquire("mock:0").is_ok());
    }

    #[test]
    fn test_acquire_unknown_camera() {
        let manager = MockManager::default();
        assert!(matches!(
            manager.acquire("missing"),
            Err(CameraError::CameraNotFound(_))
        ));
    }

    #[test]
    fn test_validate_adjusts_to_nearest_size() {
        let manager = MockManager::default()
            .with_supported_sizes(vec![Size::new(640, 480), Size::new(1920, 1080)]);
        let mut camera = manager.acquire("mock:0").expect("acquire failed");
        let mut config = camera
            .generate_configuration(&[StreamRole::Viewfinder])
            .expect("generate_configuration failed");

        if let Some(stream) = config.at_mut(0) {
            stream.size = Size::new(600, 400);
        }

        assert_eq!(camera.validate(&mut config), ConfigStatus::Adjusted);
        let stream = config.at(0).expect("stream missing");
        assert_eq!(stream.size, Size::new(640, 480));
        assert_eq!(stream.frame_size, 614_400);
    }

    #[test]
    fn test_validate_accepts_supported_size() {
        let manager = MockManager::default().with_supported_sizes(vec![Size::new(1280, 720)]);
        let mut camera = manager.acquire("mock:0").expect("acquire failed");
        let mut config = camera
            .generate_configuration(&[StreamRole::Viewfinder])
            .expect("generate_configuration failed");

        assert_eq!(camera.validate(&mut config), ConfigStatus::Valid);
    }

    #[test]
    fn test_validate_rejects_overflowing_size() {
        let manager = MockManager::default();
        let mut camera = manager.acquire("mock:0").expect("acquire failed");
        let mut config = camera
            .generate_configuration(&[StreamRole::Viewfinder])
            .expect("generate_configuration failed");

        if let Some(stream) = config.at_mut(0) {
            stream.size = Size::new(70_000, 70_000);
        }

        assert_eq!(camera.validate(&mut config), ConfigStatus::Invalid);
    }

    #[test]
    fn test_allocate_requires_configuration() {
        let manager = MockManager::default();
        let mut camera = manager.acquire("mock:0").expect("acquire failed");
        assert!(matches!(
            camera.allocate(StreamId(0)),
            Err(CameraError::InvalidState(_))
        ));
    }

    #[test]
    fn test_allocate_plane_layout() {
        let manager = MockManager::default()
            .with_default_config(StreamConfig::new(Size::new(640, 480), FourCC::NV12, 2))
            .with_planes(2);
        let mut camera = configured_camera(&manager);

        let buffers = camera.allocate(StreamId(0)).expect("allocate failed");
        assert_eq!(buffers.len(), 2);
        let first = buffers.first().expect("no buffers");
        assert_eq!(first.plane_count(), 2);
        assert_eq!(first.planes, vec![307_200, 153_600]);
    }

    #[test]
    fn test_request_rejects_second_buffer_for_stream() {
        let manager = MockManager::default();
        let mut camera = configured_camera(&manager);
        let mut buffers = camera.allocate(StreamId(0)).expect("allocate failed");
        let mut request = camera.create_request(0).expect("create_request failed");

        let first = buffers.pop().expect("no buffers");
        let second = buffers.pop().expect("no buffers");
        request
            .add_buffer(StreamId(0), first)
            .expect("add_buffer failed");
        let result = request.add_buffer(StreamId(0), second);

        assert!(matches!(result, Err(CameraError::AttachBufferFailed(code)) if code == -EEXIST));
        assert_eq!(request.buffer_count(), 1);
    }

    #[test]
    fn test_unscripted_completion_in_queue_order() {
        let manager = MockManager::default();
        let mut camera = configured_camera(&manager);
        let buffers = camera.allocate(StreamId(0)).expect("allocate failed");
        let (tx, rx) = crossbeam_channel::unbounded();
        camera.start(tx).expect("start failed");

        for (cookie, buffer) in (0u64..).zip(buffers) {
            let mut request = camera.create_request(cookie).expect("create_request failed");
            request
                .add_buffer(StreamId(0), buffer)
                .expect("add_buffer failed");
            camera.queue_request(request).expect("queue_request failed");
        }

        let cookies: Vec<u64> = (0..4)
            .map(|_| {
                rx.recv_timeout(Duration::from_secs(1))
                    .expect("completion missing")
                    .cookie
            })
            .collect();
        assert_eq!(cookies, vec![0, 1, 2, 3]);

        camera.stop().expect("stop failed");
    }

    #[test]
    fn test_stop_cancels_held_requests() {
        let manager = MockManager::default().with_script(vec![
            ScriptedFrame::complete(0, 1),
            ScriptedFrame::complete(1, 2),
        ]);
        let mut camera = configured_camera(&manager);
        let mut buffers = camera.allocate(StreamId(0)).expect("allocate failed");
        let (tx, rx) = crossbeam_channel::unbounded();
        camera.start(tx).expect("start failed");

        // Only one of the two scripted requests is queued, so nothing fires.
        let mut request = camera.create_request(0).expect("create_request failed");
        request
            .add_buffer(StreamId(0), buffers.pop().expect("no buffers"))
            .expect("add_buffer failed");
        camera.queue_request(request).expect("queue_request failed");
        camera.stop().expect("stop failed");

        let events: Vec<CompletedRequest> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events.first().map(|event| event.status),
            Some(RequestStatus::Cancelled)
        );
    }

    #[test]
    fn test_release_and_manager_stop_are_logged() {
        let manager = MockManager::default();
        let log = manager.call_log();
        {
            let _camera = manager.acquire("mock:0").expect("acquire failed");
        }
        drop(manager);

        let calls = log.calls();
        assert_eq!(calls.last(), Some(&Call::ManagerStop));
        assert!(calls.contains(&Call::Release("mock:0".to_owned())));
    }
}
