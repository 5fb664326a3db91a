//! Decision logic for the Facewatch Agent.
//!
//! This module contains:
//! - The vote window smoothing per-frame intruder signals
//! - Threat smoothing and the streak + cooldown alert gate
//! - Alert events and their outward payload

pub mod alert;
pub mod decision;
pub mod windowing;

use std::time::Duration;

/// Number of recent frame signals the vote window holds.
pub const DECISION_WINDOW: usize = 7;

/// True votes in the window needed for an aggregated threat.
pub const INTRUDER_VOTES_REQUIRED: usize = 4;

/// Consecutive threat reads needed before an alert may fire.
pub const INTRUDER_STREAK_REQUIRED: u32 = 3;

/// Minimum time between two fired alerts.
pub const ALERT_COOLDOWN: Duration = Duration::from_secs(10);

// Re-export commonly used types
pub use alert::{AlertEvent, AlertPayload, INTRUDER_EVENT};
pub use decision::{AlertGate, DecisionTracker, ThreatSmoother, ThreatState, ThreatUpdate};
pub use windowing::VoteWindow;
