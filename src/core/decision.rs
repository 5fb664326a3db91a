//! Threat smoothing and alert gating.
//!
//! Two stages run on different loops:
//! - [`ThreatSmoother`] runs once per sampled frame and turns the frame
//!   intruder signal into the published threat boolean.
//! - [`AlertGate`] runs on the control loop's own cadence and fires an alert
//!   once the threat has held for a streak of reads, the cooldown has
//!   elapsed, and an intruder crop is available.

use super::windowing::VoteWindow;
use crate::config::DecisionConfig;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Externally visible decision state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatState {
    Calm,
    ThreatDetected,
    AlertCooldown,
}

/// Result of pushing one frame signal through the smoother.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreatUpdate {
    /// Aggregated threat after this signal
    pub threat: bool,
    /// Aggregated threat went from false to true on this signal
    pub rising_edge: bool,
}

/// Vote-window smoothing with rising-edge detection.
#[derive(Debug, Clone, Default)]
pub struct ThreatSmoother {
    window: VoteWindow,
    threat: bool,
}

impl ThreatSmoother {
    pub fn new(window: usize, votes_required: usize) -> Self {
        Self {
            window: VoteWindow::new(window, votes_required),
            threat: false,
        }
    }

    pub fn from_config(config: &DecisionConfig) -> Self {
        Self::new(config.vote_window, config.votes_required)
    }

    /// Push one frame intruder signal.
    pub fn push(&mut self, frame_has_intruder: bool) -> ThreatUpdate {
        self.window.push(frame_has_intruder);
        let threat = self.window.is_threat();
        let rising_edge = threat && !self.threat;
        self.threat = threat;
        ThreatUpdate {
            threat,
            rising_edge,
        }
    }

    pub fn threat(&self) -> bool {
        self.threat
    }
}

/// Streak + cooldown gate in front of the alert dispatcher.
#[derive(Debug, Clone)]
pub struct AlertGate {
    streak_required: u32,
    cooldown: Duration,
    streak: u32,
    last_fired: Option<Instant>,
    threat: bool,
}

impl AlertGate {
    pub fn new(streak_required: u32, cooldown: Duration) -> Self {
        Self {
            streak_required,
            cooldown,
            streak: 0,
            last_fired: None,
            threat: false,
        }
    }

    pub fn from_config(config: &DecisionConfig) -> Self {
        Self::new(config.streak_required, config.cooldown)
    }

    /// Observe one read of the aggregated threat at `now`.
    ///
    /// Returns `true` when an alert must fire. Firing resets the streak to
    /// zero and restarts the cooldown, whatever happens to the alert after.
    pub fn observe(&mut self, threat: bool, crop_available: bool, now: Instant) -> bool {
        self.threat = threat;
        if !threat {
            self.streak = 0;
            return false;
        }
        self.streak = self.streak.saturating_add(1);

        let fire = self.streak >= self.streak_required && self.cooled_down(now) && crop_available;
        if fire {
            self.streak = 0;
            self.last_fired = Some(now);
        }
        fire
    }

    fn cooled_down(&self, now: Instant) -> bool {
        match self.last_fired {
            Some(at) => now.saturating_duration_since(at) >= self.cooldown,
            None => true,
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn last_fired(&self) -> Option<Instant> {
        self.last_fired
    }

    pub fn state(&self, now: Instant) -> ThreatState {
        if !self.cooled_down(now) {
            ThreatState::AlertCooldown
        } else if self.threat {
            ThreatState::ThreatDetected
        } else {
            ThreatState::Calm
        }
    }
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new(super::INTRUDER_STREAK_REQUIRED, super::ALERT_COOLDOWN)
    }
}

/// Both decision stages driven from a single thread.
///
/// The monitor splits the stages across its loops; this is the same
/// pipeline for callers that step it manually.
#[derive(Debug, Clone, Default)]
pub struct DecisionTracker {
    pub smoother: ThreatSmoother,
    pub gate: AlertGate,
}

impl DecisionTracker {
    pub fn from_config(config: &DecisionConfig) -> Self {
        Self {
            smoother: ThreatSmoother::from_config(config),
            gate: AlertGate::from_config(config),
        }
    }

    /// Feed a sampled frame's intruder signal.
    pub fn on_sample(&mut self, frame_has_intruder: bool) -> ThreatUpdate {
        self.smoother.push(frame_has_intruder)
    }

    /// Run one control tick against the current threat.
    pub fn on_tick(&mut self, crop_available: bool, now: Instant) -> bool {
        self.gate.observe(self.smoother.threat(), crop_available, now)
    }

    pub fn state(&self, now: Instant) -> ThreatState {
        self.gate.state(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(30);

    #[test]
    fn test_first_alert_on_third_read() {
        let mut gate = AlertGate::default();
        let t0 = Instant::now();

        assert!(!gate.observe(true, true, t0));
        assert!(!gate.observe(true, true, t0 + TICK));
        assert!(gate.observe(true, true, t0 + TICK * 2));
        assert_eq!(gate.streak(), 0);
        assert_eq!(gate.state(t0 + TICK * 2), ThreatState::AlertCooldown);
    }

    #[test]
    fn test_no_refire_within_cooldown() {
        let mut gate = AlertGate::default();
        let t0 = Instant::now();

        let mut fired_at = Vec::new();
        let mut now = t0;
        while now < t0 + Duration::from_secs(25) {
            if gate.observe(true, true, now) {
                fired_at.push(now - t0);
            }
            now += TICK;
        }

        assert_eq!(fired_at.len(), 3);
        assert_eq!(fired_at[0], TICK * 2);
        for pair in fired_at.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(10));
        }
    }

    #[test]
    fn test_false_read_resets_streak() {
        let mut gate = AlertGate::default();
        let t0 = Instant::now();

        gate.observe(true, true, t0);
        gate.observe(true, true, t0);
        gate.observe(false, true, t0);
        assert_eq!(gate.streak(), 0);
        assert!(!gate.observe(true, true, t0));
        assert!(!gate.observe(true, true, t0));
        assert!(gate.observe(true, true, t0));
    }

    #[test]
    fn test_no_alert_without_crop() {
        let mut gate = AlertGate::default();
        let t0 = Instant::now();

        for i in 0..10 {
            assert!(!gate.observe(true, false, t0 + TICK * i));
        }
        assert_eq!(gate.state(t0), ThreatState::ThreatDetected);
        // Streak kept growing, so the first read with a crop fires.
        assert!(gate.observe(true, true, t0 + TICK * 10));
    }

    #[test]
    fn test_rising_edges_not_true_frames() {
        use ThreatUpdate as U;
        let signals = [false, false, false, true, true, true, true, true, false, true];

        let mut smoother = ThreatSmoother::default();
        let updates: Vec<U> = signals.iter().map(|&s| smoother.push(s)).collect();

        let image_updates = updates.iter().filter(|u| u.rising_edge).count();
        let threat: Vec<bool> = updates.iter().map(|u| u.threat).collect();
        let edges = threat
            .iter()
            .enumerate()
            .filter(|&(i, &t)| t && (i == 0 || !threat[i - 1]))
            .count();

        assert_eq!(image_updates, edges);
        assert_eq!(image_updates, 1);
        assert_ne!(image_updates, signals.iter().filter(|&&s| s).count());
        assert!(updates[6].rising_edge);
    }

    #[test]
    fn test_repeated_episodes_produce_repeated_edges() {
        let mut smoother = ThreatSmoother::default();
        let mut edges = 0;
        for _ in 0..3 {
            for _ in 0..7 {
                edges += smoother.push(true).rising_edge as usize;
            }
            for _ in 0..7 {
                edges += smoother.push(false).rising_edge as usize;
            }
        }
        assert_eq!(edges, 3);
    }

    #[test]
    fn test_tracker_pipeline() {
        let mut tracker = DecisionTracker::default();
        let t0 = Instant::now();

        for _ in 0..4 {
            tracker.on_sample(true);
        }
        assert_eq!(tracker.state(t0), ThreatState::Calm);

        let fired: Vec<bool> = (0..3).map(|i| tracker.on_tick(true, t0 + TICK * i)).collect();
        assert_eq!(fired, vec![false, false, true]);
        assert_eq!(tracker.state(t0 + TICK * 3), ThreatState::AlertCooldown);
        assert_eq!(
            tracker.state(t0 + Duration::from_secs(11)),
            ThreatState::ThreatDetected
        );
    }
}
