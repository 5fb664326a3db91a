//! Camera acquisition for the Facewatch Agent.
//!
//! The capture backend is chosen at compile time: the `opencv` feature
//! provides a real device, otherwise a noop device keeps the crate
//! buildable everywhere.

pub mod source;
pub mod types;

#[cfg(feature = "opencv")]
pub mod opencv;

#[cfg(not(feature = "opencv"))]
pub mod noop;

pub use source::{FrameSource, DEFAULT_RETRY_DELAY};
pub use types::{CameraDevice, CameraError, Frame};

#[cfg(feature = "opencv")]
pub use self::opencv::{backend_available, OpenCvCamera};

/// Backend-agnostic camera type alias
#[cfg(feature = "opencv")]
pub type Camera = OpenCvCamera;

#[cfg(not(feature = "opencv"))]
pub use noop::{backend_available, NoopCamera};

/// Backend-agnostic camera type alias
#[cfg(not(feature = "opencv"))]
pub type Camera = NoopCamera;
