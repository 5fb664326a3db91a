//! Continuous frame acquisition into a single "latest frame" slot.
//!
//! The acquisition loop runs on its own thread and overwrites the slot
//! unconditionally. Consumers never wait for a new frame: slow consumers
//! simply miss intermediate frames.

use crate::camera::types::{CameraDevice, Frame};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Delay between attempts to open an unavailable device.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Pause after a failed or empty read before trying again.
const READ_BACKOFF: Duration = Duration::from_millis(5);

/// Owns the camera device and publishes the most recent frame.
pub struct FrameSource {
    slot: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
    frames_captured: Arc<AtomicU64>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl FrameSource {
    /// Start the acquisition loop.
    ///
    /// `open_device` runs on the acquisition thread, so the device itself
    /// never crosses threads.
    pub fn spawn<F, D>(open_device: F, retry_delay: Duration) -> Self
    where
        F: FnOnce() -> D + Send + 'static,
        D: CameraDevice,
    {
        let slot = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let frames_captured = Arc::new(AtomicU64::new(0));

        let handle = {
            let slot = slot.clone();
            let running = running.clone();
            let frames_captured = frames_captured.clone();
            thread::Builder::new()
                .name("frame-source".to_string())
                .spawn(move || {
                    let device = open_device();
                    run_acquisition(device, slot, running, frames_captured, retry_delay);
                })
        };

        let thread_handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Could not spawn acquisition thread: {e}");
                running.store(false, Ordering::SeqCst);
                None
            }
        };

        Self {
            slot,
            running,
            frames_captured,
            thread_handle: Mutex::new(thread_handle),
        }
    }

    /// Copy of the most recent frame, or `None` if nothing was captured yet.
    pub fn get(&self) -> Option<Frame> {
        self.slot.lock().clone()
    }

    /// Copy of the most recent frame if it is newer than `sequence`.
    ///
    /// Lets a poller skip re-copying a frame it has already seen.
    pub fn get_newer(&self, sequence: u64) -> Option<Frame> {
        let slot = self.slot.lock();
        match slot.as_ref() {
            Some(frame) if frame.sequence > sequence => Some(frame.clone()),
            _ => None,
        }
    }

    /// Number of frames captured since start.
    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    /// Check if the acquisition loop is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the loop and release the device.
    ///
    /// Idempotent and callable from any thread; the device is released by
    /// the acquisition thread exactly once, before this returns.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.thread_handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Acquisition thread panicked");
            }
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_acquisition<D: CameraDevice>(
    mut device: D,
    slot: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
    frames_captured: Arc<AtomicU64>,
    retry_delay: Duration,
) {
    let mut sequence: u64 = 0;
    let mut open_failures: u64 = 0;

    while running.load(Ordering::SeqCst) {
        if !device.is_open() {
            match device.open() {
                Ok(()) => {
                    info!("Camera opened");
                    open_failures = 0;
                }
                Err(e) => {
                    if open_failures == 0 {
                        warn!("Camera unavailable, retrying every {retry_delay:?}: {e}");
                    } else {
                        debug!("Camera open retry {open_failures} failed: {e}");
                    }
                    open_failures += 1;
                    sleep_while_running(&running, retry_delay);
                    continue;
                }
            }
        }

        match device.read() {
            Ok(Some(image)) => {
                sequence += 1;
                let frame = Frame::new(image, sequence);
                let previous = slot.lock().replace(frame);
                drop(previous);
                frames_captured.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => thread::sleep(READ_BACKOFF),
            Err(e) => {
                debug!("Frame read failed: {e}");
                thread::sleep(READ_BACKOFF);
            }
        }
    }

    device.release();
    info!("Camera released after {sequence} frames");
}

/// Sleep for up to `duration`, waking early once `running` clears.
pub(crate) fn sleep_while_running(running: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(20)));
    }
}
