//! Transparency module for the Facewatch Agent.
//!
//! Tracks what the monitor has seen and done so the user can audit it.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, ActivityLog, ActivityStats,
    SharedActivityLog,
};
