//! Activity log of what the monitor observed and did.
//!
//! Only counts are kept: no images, face crops or identities end up here.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Activity counters for the current session.
#[derive(Debug)]
pub struct ActivityLog {
    /// Frames read from the camera
    frames_captured: AtomicU64,
    /// Frames that went through detection
    frames_sampled: AtomicU64,
    /// Faces that passed the size filter and were classified
    faces_observed: AtomicU64,
    /// Sampled frames with at least one intruder
    intruder_frames: AtomicU64,
    /// Alerts that passed the streak and cooldown gate
    alerts_fired: AtomicU64,
    /// Snapshot or delivery failures
    dispatch_failures: AtomicU64,
    /// Inbound commands handled
    commands_received: AtomicU64,
    /// Session start time
    session_start: DateTime<Local>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            frames_captured: AtomicU64::new(0),
            frames_sampled: AtomicU64::new(0),
            faces_observed: AtomicU64::new(0),
            intruder_frames: AtomicU64::new(0),
            alerts_fired: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
            commands_received: AtomicU64::new(0),
            session_start: Local::now(),
            persist_path: None,
        }
    }

    /// Create an activity log that continues the totals stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            eprintln!("Note: Could not load previous activity stats: {e}");
        }

        log
    }

    pub fn record_frames_captured(&self, count: u64) {
        self.frames_captured.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one analysed frame and what it contained.
    pub fn record_sample(&self, faces: usize, has_intruder: bool) {
        self.frames_sampled.fetch_add(1, Ordering::Relaxed);
        self.faces_observed.fetch_add(faces as u64, Ordering::Relaxed);
        if has_intruder {
            self.intruder_frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_alert_fired(&self) {
        self.alerts_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self) {
        self.commands_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> ActivityStats {
        ActivityStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_sampled: self.frames_sampled.load(Ordering::Relaxed),
            faces_observed: self.faces_observed.load(Ordering::Relaxed),
            intruder_frames: self.intruder_frames.load(Ordering::Relaxed),
            alerts_fired: self.alerts_fired.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            commands_received: self.commands_received.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Local::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Activity:\n\
             - Frames captured: {}\n\
             - Frames analysed: {}\n\
             - Faces observed: {}\n\
             - Frames with an intruder: {}\n\
             - Alerts fired: {}\n\
             - Dispatch failures: {}\n\
             - Commands received: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy:\n\
             - Frames are processed in memory and discarded\n\
             - Only intruder snapshots are written to disk",
            stats.frames_captured,
            stats.frames_sampled,
            stats.faces_observed,
            stats.intruder_frames,
            stats.alerts_fired,
            stats.dispatch_failures,
            stats.commands_received,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                frames_captured: stats.frames_captured,
                frames_sampled: stats.frames_sampled,
                faces_observed: stats.faces_observed,
                intruder_frames: stats.intruder_frames,
                alerts_fired: stats.alerts_fired,
                dispatch_failures: stats.dispatch_failures,
                commands_received: stats.commands_received,
                last_updated: Local::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
            debug!("Activity log saved to {}", path.display());
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.frames_captured
                    .store(persisted.frames_captured, Ordering::Relaxed);
                self.frames_sampled
                    .store(persisted.frames_sampled, Ordering::Relaxed);
                self.faces_observed
                    .store(persisted.faces_observed, Ordering::Relaxed);
                self.intruder_frames
                    .store(persisted.intruder_frames, Ordering::Relaxed);
                self.alerts_fired
                    .store(persisted.alerts_fired, Ordering::Relaxed);
                self.dispatch_failures
                    .store(persisted.dispatch_failures, Ordering::Relaxed);
                self.commands_received
                    .store(persisted.commands_received, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.frames_captured,
            &self.frames_sampled,
            &self.faces_observed,
            &self.intruder_frames,
            &self.alerts_fired,
            &self.dispatch_failures,
            &self.commands_received,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of activity statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityStats {
    pub frames_captured: u64,
    pub frames_sampled: u64,
    pub faces_observed: u64,
    pub intruder_frames: u64,
    pub alerts_fired: u64,
    pub dispatch_failures: u64,
    pub commands_received: u64,
    pub session_start: DateTime<Local>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(default)]
    frames_captured: u64,
    #[serde(default)]
    frames_sampled: u64,
    #[serde(default)]
    faces_observed: u64,
    #[serde(default)]
    intruder_frames: u64,
    #[serde(default)]
    alerts_fired: u64,
    #[serde(default)]
    dispatch_failures: u64,
    #[serde(default)]
    commands_received: u64,
    last_updated: DateTime<Local>,
}

/// Thread-safe shared activity log.
pub type SharedActivityLog = Arc<ActivityLog>;

/// Create a new shared activity log.
pub fn create_shared_log() -> SharedActivityLog {
    Arc::new(ActivityLog::new())
}

/// Create a new shared activity log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedActivityLog {
    Arc::new(ActivityLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_counting() {
        let log = ActivityLog::new();

        log.record_sample(2, true);
        log.record_sample(0, false);
        log.record_alert_fired();
        log.record_frames_captured(10);

        let stats = log.stats();
        assert_eq!(stats.frames_sampled, 2);
        assert_eq!(stats.faces_observed, 2);
        assert_eq!(stats.intruder_frames, 1);
        assert_eq!(stats.alerts_fired, 1);
        assert_eq!(stats.frames_captured, 10);
    }

    #[test]
    fn test_activity_reset() {
        let log = ActivityLog::new();
        log.record_sample(3, true);
        log.record_command();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.frames_sampled, 0);
        assert_eq!(stats.commands_received, 0);
    }

    #[test]
    fn test_persisted_totals_accumulate() {
        let path = std::env::temp_dir()
            .join(format!("facewatch-activity-{}", uuid::Uuid::new_v4()))
            .join("activity.json");

        let first = ActivityLog::with_persistence(path.clone());
        first.record_alert_fired();
        first.record_dispatch_failure();
        first.save().unwrap();

        let second = ActivityLog::with_persistence(path.clone());
        second.record_alert_fired();
        let stats = second.stats();
        assert_eq!(stats.alerts_fired, 2);
        assert_eq!(stats.dispatch_failures, 1);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_summary_format() {
        let summary = ActivityLog::new().summary();
        assert!(summary.contains("Frames analysed"));
        assert!(summary.contains("Alerts fired"));
        assert!(summary.contains("Privacy"));
    }
}
