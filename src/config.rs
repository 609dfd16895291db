//! Capture options.

use crate::traits::{CameraError, FourCC, Result, Size, StreamRole};
use std::time::Duration;

/// Default requested frame size.
pub const DEFAULT_SIZE: Size = Size::new(640, 480);

/// Default capture window.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(1000);

/// What to capture and for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Camera to use. `None` picks the first enumerated camera.
    pub camera: Option<String>,
    /// Stream role for the default configuration.
    pub role: StreamRole,
    /// Requested frame size. The stack may adjust it.
    pub size: Size,
    /// Requested pixel format. `None` keeps the stack default.
    pub pixel_format: Option<FourCC>,
    /// Requested buffer count. `None` keeps the stack default.
    pub buffer_count: Option<u32>,
    /// How long to wait for completions before stopping the camera.
    pub window: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            camera: None,
            role: StreamRole::Viewfinder,
            size: DEFAULT_SIZE,
            pixel_format: None,
            buffer_count: None,
            window: DEFAULT_WINDOW,
        }
    }
}

impl CaptureOptions {
    /// Select a camera by id.
    #[must_use]
    pub fn with_camera<S: Into<String>>(mut self, id: S) -> Self {
        self.camera = Some(id.into());
        self
    }

    /// Set the requested frame size.
    #[must_use]
    pub const fn with_size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }

    /// Set the capture window.
    #[must_use]
    pub const fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Reject options no camera could satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.size.width == 0 || self.size.height == 0 {
            return Err(CameraError::InvalidConfiguration(format!(
                "frame size must be non-zero, got {}",
                self.size
            )));
        }
        if self.buffer_count == Some(0) {
            return Err(CameraError::InvalidConfiguration(
                "buffer count must be non-zero".to_owned(),
            ));
        }
        if self.window.is_zero() {
            return Err(CameraError::InvalidConfiguration(
                "capture window must be non-zero".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CaptureOptions::default();
        assert_eq!(options.role, StreamRole::Viewfinder);
        assert_eq!(options.size, Size::new(640, 480));
        assert_eq!(options.window, Duration::from_secs(1));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_size() {
        let options = CaptureOptions::default().with_size(Size::new(0, 480));
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_window() {
        let options = CaptureOptions::default().with_window(Duration::ZERO);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_buffers() {
        let options = CaptureOptions {
            buffer_count: Some(0),
            ..CaptureOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
