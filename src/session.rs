//! Capture session over one acquired camera.
//!
//! A [`CaptureSession`] owns the camera handle from acquisition to release.
//! Stopping the camera, freeing buffers and releasing the lock happen in
//! [`CaptureSession::teardown`] on the success path and in `Drop` on every
//! early return.

use crate::config::CaptureOptions;
use crate::traits::{
    Camera, CameraError, CameraId, CameraManager, CaptureRequest, CompletionSender, ConfigStatus,
    Configuration, FrameBuffer, Result, StreamConfig, StreamId,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// List camera ids, failing when the system has none.
pub fn enumerate<M: CameraManager>(manager: &M) -> Result<Vec<CameraId>> {
    let ids = manager.cameras();
    if ids.is_empty() {
        return Err(CameraError::NoCameras);
    }

    info!(count = ids.len(), "cameras enumerated");
    Ok(ids)
}

/// Lock camera `id` for exclusive use.
pub fn acquire<'m, M: CameraManager>(
    manager: &'m M,
    id: &str,
) -> Result<CaptureSession<M::Camera<'m>>> {
    let camera = manager.acquire(id)?;
    info!(camera = id, "camera acquired");
    Ok(CaptureSession::new(camera))
}

/// Stream settings before and after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureOutcome {
    /// The stack's default for the requested role.
    pub default: StreamConfig,
    /// What was actually applied.
    pub validated: StreamConfig,
    /// Validation result.
    pub status: ConfigStatus,
}

/// One acquired camera and the resources allocated on it.
pub struct CaptureSession<C: Camera> {
    camera: C,
    config: Option<Configuration>,
    allocated: Vec<StreamId>,
    running: bool,
}

impl<C: Camera> CaptureSession<C> {
    /// Wrap an already acquired camera.
    pub const fn new(camera: C) -> Self {
        Self {
            camera,
            config: None,
            allocated: Vec::new(),
            running: false,
        }
    }

    /// The applied configuration, once `configure` succeeded.
    pub const fn configuration(&self) -> Option<&Configuration> {
        self.config.as_ref()
    }

    /// Generate the default configuration for the role, apply the requested
    /// size and format, validate and apply it.
    ///
    /// Validation may change the request; the validated settings are the ones
    /// applied and later used for allocation.
    pub fn configure(&mut self, options: &CaptureOptions) -> Result<ConfigureOutcome> {
        let mut config = self.camera.generate_configuration(&[options.role])?;

        let stream = config
            .at_mut(0)
            .ok_or(CameraError::ConfigurationUnavailable(options.role))?;
        let default = stream.clone();
        debug!(camera = self.camera.id(), %default, "default configuration");

        stream.size = options.size;
        if let Some(format) = options.pixel_format {
            stream.pixel_format = format;
        }
        if let Some(count) = options.buffer_count {
            stream.buffer_count = count;
        }

        let status = self.camera.validate(&mut config);
        match status {
            ConfigStatus::Invalid => {
                return Err(CameraError::InvalidConfiguration(format!(
                    "camera rejected {config}"
                )));
            }
            ConfigStatus::Adjusted => {
                warn!(requested = %options.size, validated = %config, "configuration adjusted");
            }
            ConfigStatus::Valid => debug!(%config, "configuration valid"),
        }

        self.camera.configure(&mut config)?;

        let validated = config
            .at(0)
            .cloned()
            .ok_or(CameraError::ConfigurationUnavailable(options.role))?;
        info!(%validated, "camera configured");
        self.config = Some(config);

        Ok(ConfigureOutcome {
            default,
            validated,
            status,
        })
    }

    /// Allocate buffers for every stream of the applied configuration.
    pub fn allocate_buffers(&mut self) -> Result<Vec<(StreamId, Vec<C::Buffer>)>> {
        let streams: Vec<StreamId> = self
            .config
            .as_ref()
            .ok_or(CameraError::InvalidState("camera is not configured"))?
            .iter()
            .map(|(id, _)| id)
            .collect();

        let mut allocations = Vec::with_capacity(streams.len());
        for stream in streams {
            let buffers = self.camera.allocate(stream)?;
            self.allocated.push(stream);
            info!(%stream, count = buffers.len(), "buffers allocated");
            allocations.push((stream, buffers));
        }

        Ok(allocations)
    }

    /// Build one request per buffer, each carrying exactly that buffer.
    ///
    /// The buffer's position in `buffers` becomes the request cookie.
    pub fn build_requests(
        &mut self,
        stream: StreamId,
        buffers: Vec<C::Buffer>,
    ) -> Result<Vec<C::Request>> {
        let requests = buffers
            .into_iter()
            .enumerate()
            .map(|(position, buffer)| {
                let cookie = u64::try_from(position).unwrap_or(u64::MAX);
                debug!(
                    cookie,
                    buffer = buffer.index(),
                    planes = buffer.plane_count(),
                    "building request"
                );

                let mut request = self.camera.create_request(cookie)?;
                request.add_buffer(stream, buffer)?;
                if request.buffer_count() != 1 {
                    return Err(CameraError::InvalidState(
                        "request must carry exactly one buffer",
                    ));
                }
                Ok(request)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(%stream, count = requests.len(), "requests built");
        Ok(requests)
    }

    /// Start the camera, queue every request, wait out the capture window
    /// and stop. Completed requests are not queued again.
    pub fn run(
        &mut self,
        requests: Vec<C::Request>,
        window: Duration,
        completions: CompletionSender,
    ) -> Result<()> {
        if requests.is_empty() {
            warn!("starting capture with no requests");
        }

        self.camera.start(completions)?;
        self.running = true;

        let queued = requests.len();
        for request in requests {
            self.camera.queue_request(request)?;
        }
        info!(queued, ?window, "capture window open");

        std::thread::sleep(window);
        self.stop()
    }

    /// Stop the camera if it is running.
    pub fn stop(&mut self) -> Result<()> {
        if self.running {
            self.running = false;
            self.camera.stop()?;
            info!(camera = self.camera.id(), "camera stopped");
        }
        Ok(())
    }

    /// Stop, free every allocated stream and release the camera.
    pub fn teardown(mut self) -> Result<()> {
        self.release_resources()
    }

    fn release_resources(&mut self) -> Result<()> {
        let mut first_error = self.stop().err();

        for stream in std::mem::take(&mut self.allocated) {
            if let Err(err) = self.camera.free(stream) {
                warn!(%stream, %err, "failed to free buffers");
                first_error.get_or_insert(err);
            } else {
                debug!(%stream, "buffers freed");
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl<C: Camera> Drop for CaptureSession<C> {
    fn drop(&mut self) {
        if let Err(err) = self.release_resources() {
            warn!(%err, "teardown failed");
        }
        debug!(camera = self.camera.id(), "releasing camera");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockManager};
    use crate::traits::Size;

    #[test]
    fn test_enumerate_empty_fails() {
        let manager = MockManager::new(Vec::<String>::new());
        assert!(matches!(enumerate(&manager), Err(CameraError::NoCameras)));
    }

    #[test]
    fn test_configure_reports_default_and_validated() {
        let manager = MockManager::default()
            .with_supported_sizes(vec![Size::new(1280, 720), Size::new(800, 600)]);
        let mut session = acquire(&manager, "mock:0").expect("acquire failed");

        let outcome = session
            .configure(&CaptureOptions::default())
            .expect("configure failed");

        assert_eq!(outcome.default.size, Size::new(1280, 720));
        assert_eq!(outcome.validated.size, Size::new(800, 600));
        assert_eq!(outcome.status, ConfigStatus::Adjusted);
        assert_eq!(
            session
                .configuration()
                .and_then(|config| config.at(0))
                .map(|stream| stream.size),
            Some(Size::new(800, 600))
        );
    }

    #[test]
    fn test_allocate_before_configure_fails() {
        let manager = MockManager::default();
        let mut session = acquire(&manager, "mock:0").expect("acquire failed");
        assert!(matches!(
            session.allocate_buffers(),
            Err(CameraError::InvalidState(_))
        ));
    }

    #[test]
    fn test_drop_frees_buffers_and_releases() {
        let manager = MockManager::default();
        let log = manager.call_log();
        {
            let mut session = acquire(&manager, "mock:0").expect("acquire failed");
            session
                .configure(&CaptureOptions::default())
                .expect("configure failed");
            let _buffers = session.allocate_buffers().expect("allocate failed");
        }

        let calls = log.calls();
        let free = calls.iter().position(|call| *call == Call::Free(StreamId(0)));
        let release = calls
            .iter()
            .position(|call| *call == Call::Release("mock:0".to_owned()));
        assert!(free.is_some());
        assert!(free < release);
    }

    #[test]
    fn test_request_creation_failure_is_reported() {
        let manager = MockManager::default().with_request_limit(2);
        let mut session = acquire(&manager, "mock:0").expect("acquire failed");
        session
            .configure(&CaptureOptions::default())
            .expect("configure failed");
        let mut allocations = session.allocate_buffers().expect("allocate failed");
        let (stream, buffers) = allocations.pop().expect("no allocation");

        let result = session.build_requests(stream, buffers);
        assert!(matches!(result, Err(CameraError::RequestCreationFailed)));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let manager = MockManager::default();
        let log = manager.call_log();
        let mut session = acquire(&manager, "mock:0").expect("acquire failed");
        session.stop().expect("stop failed");
        session.teardown().expect("teardown failed");

        assert_eq!(log.count(|call| *call == Call::Stop), 0);
    }
}
