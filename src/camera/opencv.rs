//! OpenCV capture backend.
//!
//! Wraps `videoio::VideoCapture` and converts its BGR frames into RGB
//! buffers. Requires the `opencv` feature and a system OpenCV install.

use crate::camera::types::{CameraDevice, CameraError};
use image::RgbImage;
use ::opencv::{core::Mat, imgproc, prelude::*, videoio};

/// A local camera opened by index.
pub struct OpenCvCamera {
    index: i32,
    capture: Option<videoio::VideoCapture>,
    frame: Mat,
    rgb: Mat,
}

impl OpenCvCamera {
    pub fn new(index: i32) -> Self {
        Self {
            index,
            capture: None,
            frame: Mat::default(),
            rgb: Mat::default(),
        }
    }

    pub fn index(&self) -> i32 {
        self.index
    }
}

impl CameraDevice for OpenCvCamera {
    fn open(&mut self) -> Result<(), CameraError> {
        let capture = videoio::VideoCapture::new(self.index, videoio::CAP_ANY)
            .map_err(|_| CameraError::OpenFailed(self.index))?;
        let opened = capture
            .is_opened()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;
        if !opened {
            return Err(CameraError::OpenFailed(self.index));
        }
        self.capture = Some(capture);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.capture.is_some()
    }

    fn read(&mut self) -> Result<Option<RgbImage>, CameraError> {
        let Some(capture) = self.capture.as_mut() else {
            return Ok(None);
        };

        let grabbed = capture
            .read(&mut self.frame)
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;
        if !grabbed || self.frame.empty() {
            return Ok(None);
        }

        imgproc::cvt_color(
            &self.frame,
            &mut self.rgb,
            imgproc::COLOR_BGR2RGB,
            0,
            ::opencv::core::AlgorithmHint::ALGO_HINT_DEFAULT,
        )
        .map_err(|e| CameraError::ReadFailed(e.to_string()))?;

        let width = self.rgb.cols() as u32;
        let height = self.rgb.rows() as u32;
        let bytes = self
            .rgb
            .data_bytes()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;

        Ok(RgbImage::from_raw(width, height, bytes.to_vec()))
    }

    fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            let _ = capture.release();
        }
    }
}

/// Whether a real capture backend is available in this build.
pub fn backend_available() -> bool {
    true
}
