//! Fallback camera used when no capture backend is compiled in.
//!
//! This exists so the crate (and binary) builds without system OpenCV.
//! Opening always fails, which the acquisition loop treats like any other
//! unavailable device: it logs and keeps retrying.

use crate::camera::types::{CameraDevice, CameraError};
use image::RgbImage;

/// A camera that never produces frames.
#[derive(Debug, Default)]
pub struct NoopCamera {
    index: i32,
}

impl NoopCamera {
    pub fn new(index: i32) -> Self {
        Self { index }
    }

    pub fn index(&self) -> i32 {
        self.index
    }
}

impl CameraDevice for NoopCamera {
    fn open(&mut self) -> Result<(), CameraError> {
        Err(CameraError::Unsupported)
    }

    fn is_open(&self) -> bool {
        false
    }

    fn read(&mut self) -> Result<Option<RgbImage>, CameraError> {
        Ok(None)
    }

    fn release(&mut self) {}
}

/// Whether a real capture backend is available in this build.
pub fn backend_available() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_camera_never_opens() {
        let mut camera = NoopCamera::new(0);
        assert!(matches!(camera.open(), Err(CameraError::Unsupported)));
        assert!(!camera.is_open());
        assert!(camera.read().unwrap().is_none());
    }
}
