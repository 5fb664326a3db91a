//! Sliding vote window over per-frame intruder signals.
//!
//! Each sampled frame contributes one boolean vote. The window keeps the
//! most recent votes only, so a single misclassified frame cannot flip the
//! aggregated threat in either direction.

use std::collections::VecDeque;

/// Fixed-capacity ring of the most recent intruder votes.
#[derive(Debug, Clone)]
pub struct VoteWindow {
    /// Maximum number of votes kept
    capacity: usize,
    /// True votes needed for the aggregated threat
    required: usize,
    /// Votes, oldest first
    votes: VecDeque<bool>,
}

impl VoteWindow {
    /// Create an empty window.
    ///
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize, required: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            required,
            votes: VecDeque::with_capacity(capacity),
        }
    }

    /// Record a vote, evicting the oldest one once full.
    pub fn push(&mut self, vote: bool) {
        if self.votes.len() == self.capacity {
            self.votes.pop_front();
        }
        self.votes.push_back(vote);
    }

    /// Number of true votes currently held.
    pub fn true_count(&self) -> usize {
        self.votes.iter().filter(|&&v| v).count()
    }

    /// Aggregated threat: enough of the held votes are true.
    pub fn is_threat(&self) -> bool {
        self.true_count() >= self.required
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget all votes.
    pub fn clear(&mut self) {
        self.votes.clear();
    }
}

impl Default for VoteWindow {
    fn default() -> Self {
        Self::new(super::DECISION_WINDOW, super::INTRUDER_VOTES_REQUIRED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random signal without pulling in a rng.
    fn signal(seed: u64, len: usize) -> Vec<bool> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 33) & 1 == 1
            })
            .collect()
    }

    #[test]
    fn test_empty_window_is_calm() {
        let window = VoteWindow::default();
        assert!(window.is_empty());
        assert!(!window.is_threat());
        assert_eq!(window.capacity(), 7);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut window = VoteWindow::default();
        for i in 0..50 {
            window.push(i % 3 == 0);
            assert!(window.len() <= 7);
        }
        assert_eq!(window.len(), 7);
    }

    #[test]
    fn test_oldest_vote_is_evicted() {
        let mut window = VoteWindow::default();
        for _ in 0..4 {
            window.push(true);
        }
        assert!(window.is_threat());

        for _ in 0..3 {
            window.push(false);
        }
        // Window is [T,T,T,T,F,F,F]
        assert!(window.is_threat());

        window.push(false);
        assert_eq!(window.true_count(), 3);
        assert!(!window.is_threat());
    }

    #[test]
    fn test_matches_reference_over_synthetic_sequences() {
        for seed in 0..40 {
            for len in 0..=20 {
                let votes = signal(seed, len);
                let mut window = VoteWindow::default();
                for (t, &vote) in votes.iter().enumerate() {
                    window.push(vote);
                    let start = (t + 1).saturating_sub(7);
                    let expected = votes[start..=t].iter().filter(|&&v| v).count() >= 4;
                    assert_eq!(window.is_threat(), expected, "seed {seed} len {len} t {t}");
                }
            }
        }
    }

    #[test]
    fn test_clear() {
        let mut window = VoteWindow::new(3, 2);
        window.push(true);
        window.push(true);
        assert!(window.is_threat());
        window.clear();
        assert!(!window.is_threat());
        assert!(window.is_empty());
    }
}
