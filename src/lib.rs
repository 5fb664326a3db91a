//! Facewatch Agent - owner-aware camera monitor.
//!
//! This library watches a camera feed, recognises the enrolled owner and
//! raises a gated, de-duplicated alert when an unrecognised face persists.
//!
//! # Privacy Guarantees
//!
//! - **In-memory frames**: camera frames are never written to disk
//! - **Intruder-only snapshots**: only the face crop of a fired alert is stored
//! - **Local model**: the owner model is trained and kept on this machine
//! - **Transparency**: everything the monitor does is counted and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Facewatch Agent                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────┐       │
//! │  │ FrameSource │──▶│ Recognition  │──▶│ Vote window  │       │
//! │  │  (camera)   │   │ (every 5th)  │   │   (4 of 7)   │       │
//! │  └─────────────┘   └──────────────┘   └──────────────┘       │
//! │                                              │               │
//! │                                              ▼               │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────┐       │
//! │  │  Dispatch   │◀──│  Alert gate  │◀──│ Shared state │       │
//! │  │  (worker)   │   │(streak+cool) │   │  (telemetry) │       │
//! │  └─────────────┘   └──────────────┘   └──────────────┘       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use facewatch_agent::{
//!     camera::Camera, dispatch::AlertDispatcher, monitor::Monitor,
//!     transparency::create_shared_log, vision::RecognitionEngine, Config,
//! };
//!
//! let config = Config::load().unwrap_or_default();
//! let log = create_shared_log();
//! let dispatcher = AlertDispatcher::from_config(&config, Some(log.clone())).unwrap();
//!
//! let index = config.camera_index;
//! let engine_config = config.clone();
//! let mut monitor = Monitor::start(
//!     &config,
//!     move || Camera::new(index),
//!     move || RecognitionEngine::from_config(&engine_config),
//!     dispatcher,
//!     log,
//! )
//! .expect("Failed to start monitor");
//!
//! println!("{:?}", monitor.telemetry());
//! monitor.stop();
//! monitor.join();
//! ```

pub mod camera;
pub mod command;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod monitor;
pub mod state;
pub mod transparency;
pub mod vision;

// Re-export key types at crate root for convenience
pub use camera::{Camera, CameraDevice, CameraError, Frame, FrameSource};
pub use command::{CommandError, CommandHook, LockAction, RemoteCommand};
pub use config::{Config, ConfigError};
pub use core::{AlertEvent, AlertGate, AlertPayload, DecisionTracker, ThreatState, VoteWindow};
pub use dispatch::{AlertDispatcher, AlertSink, DispatchError, SnapshotStore};
pub use monitor::{Monitor, MonitorError};
pub use state::{SharedStateStore, Telemetry};
pub use transparency::{ActivityLog, ActivityStats, SharedActivityLog};
pub use vision::{DetectionBatch, FaceObservation, RecognitionEngine, VisionError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Camera notice that can be displayed to users.
pub const PRIVACY_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║              FACEWATCH AGENT - CAMERA PRIVACY NOTICE             ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent watches the camera to tell the owner from others.    ║
║                                                                  ║
║  ✓ WHAT WE STORE:                                                ║
║    • The owner model trained from your enrollment images         ║
║    • A face crop each time an intruder alert fires               ║
║    • Counters of frames analysed and alerts fired                ║
║                                                                  ║
║  ✗ WHAT WE NEVER STORE:                                          ║
║    • Video or individual camera frames                           ║
║    • Faces recognised as the owner                               ║
║    • Faces that did not trigger an alert                         ║
║                                                                  ║
║  Alerts go only to the backend or chat you configure.            ║
║                                                                  ║
║  You can view activity statistics anytime with:                  ║
║    facewatch status                                              ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_notice_contents() {
        assert!(PRIVACY_NOTICE.contains("PRIVACY NOTICE"));
        assert!(PRIVACY_NOTICE.contains("NEVER STORE"));
        assert!(PRIVACY_NOTICE.contains("facewatch status"));
    }
}
