//! Frame type shared between the acquisition and recognition loops.

use chrono::{DateTime, Local};
use image::RgbImage;
use thiserror::Error;

/// A captured camera frame.
///
/// Frames handed out by [`crate::camera::FrameSource::get`] are independent
/// copies; the acquisition loop keeps exclusive ownership of its own slot.
#[derive(Debug, Clone)]
pub struct Frame {
    /// RGB pixel buffer at source resolution
    pub image: RgbImage,
    /// Wall-clock capture time
    pub captured_at: DateTime<Local>,
    /// Monotonic capture counter, starting at 1
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            captured_at: Local::now(),
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Errors raised by a camera backend.
///
/// None of these are fatal: the acquisition loop logs them and retries.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera {0} could not be opened")]
    OpenFailed(i32),
    #[error("camera read failed: {0}")]
    ReadFailed(String),
    #[error("no camera backend compiled in (enable the `opencv` feature)")]
    Unsupported,
}

/// A capture device driven by the acquisition loop.
///
/// The device is created and used on the acquisition thread only, so
/// implementations do not need to be `Send`.
pub trait CameraDevice {
    /// Open (or re-open) the device.
    fn open(&mut self) -> Result<(), CameraError>;

    /// Whether the device is currently open.
    fn is_open(&self) -> bool;

    /// Grab one frame. `Ok(None)` means the device produced nothing this cycle.
    fn read(&mut self) -> Result<Option<RgbImage>, CameraError>;

    /// Release the device.
    fn release(&mut self);
}
