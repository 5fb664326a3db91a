//! Demonstration of the Facewatch decision pipeline.
//!
//! This example shows how to:
//! 1. Feed per-frame intruder signals through the vote window
//! 2. Watch the threat flag rise and fall
//! 3. Run the streak + cooldown gate on a simulated control clock
//!
//! Run with: cargo run --example decision_demo
//!
//! No camera or model is needed; the signals are synthetic.

use std::time::{Duration, Instant};

use facewatch_agent::{
    config::DecisionConfig,
    core::{DecisionTracker, ThreatState},
};

fn main() {
    println!("Facewatch Agent - Decision Demo");
    println!("===============================");
    println!();

    let config = DecisionConfig::default();
    println!(
        "Window: {} frames, threat at {} votes, alert after {} reads, cooldown {}s",
        config.vote_window,
        config.votes_required,
        config.streak_required,
        config.cooldown.as_secs()
    );
    println!();

    // A noisy owner session, an intruder who stays, then a flicker.
    let mut signals = vec![false, true, false, false, true, false, false];
    signals.extend(std::iter::repeat(true).take(40));
    signals.extend([false, true, false, false, false, false, false, false]);

    let mut tracker = DecisionTracker::from_config(&config);
    let start = Instant::now();
    let frame_interval = Duration::from_millis(150);
    let ticks_per_frame = 5;

    let mut alerts = 0;
    let mut last_state = ThreatState::Calm;

    for (i, &signal) in signals.iter().enumerate() {
        let update = tracker.on_sample(signal);
        if update.rising_edge {
            println!("frame {i:>3}: threat raised (alert image refreshed)");
        }

        for t in 0..ticks_per_frame {
            let now = start + frame_interval * i as u32 + frame_interval / ticks_per_frame * t;
            if tracker.on_tick(true, now) {
                alerts += 1;
                println!("frame {i:>3}: ALERT fired");
            }
            let state = tracker.state(now);
            if state != last_state {
                println!("frame {i:>3}: state {last_state:?} -> {state:?}");
                last_state = state;
            }
        }
    }

    println!();
    println!("Frames: {}", signals.len());
    println!("Intruder frames: {}", signals.iter().filter(|&&s| s).count());
    println!("Alerts fired: {alerts}");
}
