//! Supervised monitor loops.
//!
//! Three loops share one stop flag:
//! - acquisition ([`FrameSource`]) keeps the latest-frame slot fresh,
//! - recognition analyses sampled frames, smooths the threat and publishes
//!   [`SharedState`](crate::state::SharedState),
//! - control runs the streak + cooldown gate and hands fired alerts to the
//!   dispatcher.
//!
//! Only the shared store and the frame slot cross loop boundaries.

use crate::camera::source::sleep_while_running;
use crate::camera::{CameraDevice, FrameSource, DEFAULT_RETRY_DELAY};
use crate::config::{Config, DecisionConfig};
use crate::core::{AlertEvent, AlertGate, ThreatSmoother};
use crate::dispatch::{AlertDispatcher, DispatchHandle};
use crate::state::{create_shared_store, FrameUpdate, SharedStore, Telemetry};
use crate::transparency::SharedActivityLog;
use crate::vision::{
    train_owner_model, ModelArtifacts, RecognitionEngine, TrainingError, TrainingReport,
    TrainingRequest, VisionError,
};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Pause when the recognition loop finds no new frame.
const IDLE_POLL: Duration = Duration::from_millis(2);

/// Monitor error types.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor startup failed: {0}")]
    Startup(#[from] VisionError),
    #[error("owner training failed: {0}")]
    Training(#[from] TrainingError),
    #[error("could not spawn monitor thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("recognition thread exited during startup")]
    EngineLost,
    #[error("alert dispatcher is already shut down")]
    DispatcherClosed,
}

/// Make sure the classifier artifacts exist before the monitor starts.
///
/// Trains from the enrollment directory when they are missing and
/// `auto_train` is on. Returns the report if training ran.
pub fn prepare_model(config: &Config) -> Result<Option<TrainingReport>, MonitorError> {
    let artifacts = ModelArtifacts::in_dir(&config.model_dir());
    if artifacts.exist() {
        return Ok(None);
    }
    if !config.auto_train {
        return Err(MonitorError::Startup(VisionError::ModelMissing(
            artifacts.model_path,
        )));
    }

    info!("No owner model found, training from enrollment images");
    let report = train_owner_model(&TrainingRequest::from_config(config))?;
    Ok(Some(report))
}

/// Cloneable handle that asks the monitor to stop.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Exponential moving average of the analysed-frame rate.
#[derive(Debug, Default)]
pub struct FpsMeter {
    last: Option<Instant>,
    fps: f64,
}

impl FpsMeter {
    pub fn tick(&mut self, now: Instant) -> f64 {
        if let Some(last) = self.last {
            let dt = now.saturating_duration_since(last).as_secs_f64();
            if dt > 0.0 {
                self.fps = 0.9 * self.fps + 0.1 * (1.0 / dt);
            }
        }
        self.last = Some(now);
        self.fps
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

/// The running monitor.
pub struct Monitor {
    running: Arc<AtomicBool>,
    source: Option<Arc<FrameSource>>,
    store: SharedStore,
    dispatcher: Option<AlertDispatcher>,
    threads: Vec<JoinHandle<()>>,
    log: SharedActivityLog,
}

impl Monitor {
    /// Start all loops.
    ///
    /// The engine is built on the recognition thread before the camera is
    /// opened; if that fails nothing else is started and the error is
    /// returned.
    pub fn start<C, D, E>(
        config: &Config,
        open_camera: C,
        build_engine: E,
        dispatcher: AlertDispatcher,
        log: SharedActivityLog,
    ) -> Result<Self, MonitorError>
    where
        C: FnOnce() -> D + Send + 'static,
        D: CameraDevice,
        E: FnOnce() -> Result<RecognitionEngine, VisionError> + Send + 'static,
    {
        let dispatch = dispatcher.handle().ok_or(MonitorError::DispatcherClosed)?;
        let running = Arc::new(AtomicBool::new(true));
        let store = create_shared_store();

        let (ready_tx, ready_rx) = bounded::<Result<(), VisionError>>(1);
        let (source_tx, source_rx) = bounded::<Arc<FrameSource>>(1);

        let recognition = {
            let running = running.clone();
            let store = store.clone();
            let log = log.clone();
            let decision = config.decision.clone();
            thread::Builder::new()
                .name("recognition".to_string())
                .spawn(move || {
                    let engine = match build_engine() {
                        Ok(engine) => {
                            let _ = ready_tx.send(Ok(()));
                            engine
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let Ok(source) = source_rx.recv() else {
                        return;
                    };
                    run_recognition(engine, source, store, log, decision, running);
                })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = recognition.join();
                return Err(MonitorError::Startup(e));
            }
            Err(_) => {
                let _ = recognition.join();
                return Err(MonitorError::EngineLost);
            }
        }

        let source = Arc::new(FrameSource::spawn(open_camera, DEFAULT_RETRY_DELAY));
        // The receiver only disappears if the recognition thread died.
        if source_tx.send(source.clone()).is_err() {
            running.store(false, Ordering::SeqCst);
            source.shutdown();
            let _ = recognition.join();
            return Err(MonitorError::EngineLost);
        }

        let control = {
            let running = running.clone();
            let store = store.clone();
            let log = log.clone();
            let decision = config.decision.clone();
            thread::Builder::new()
                .name("control".to_string())
                .spawn(move || run_control(store, dispatch, log, decision, running))
        };

        let mut monitor = Self {
            running,
            source: Some(source),
            store,
            dispatcher: Some(dispatcher),
            threads: vec![recognition],
            log,
        };
        match control {
            Ok(handle) => monitor.threads.push(handle),
            Err(e) => {
                monitor.stop();
                monitor.join();
                return Err(MonitorError::Spawn(e));
            }
        }

        info!("Monitor started");
        Ok(monitor)
    }

    /// The shared state published by the recognition loop.
    pub fn state(&self) -> SharedStore {
        self.store.clone()
    }

    /// Current outward telemetry.
    pub fn telemetry(&self) -> Telemetry {
        self.store.telemetry()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask every loop to stop after its current iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.running.clone())
    }

    /// Wait for every loop to finish.
    ///
    /// Releases the camera and drains queued alerts. Idempotent; call
    /// [`Self::stop`] first or this waits until someone else does.
    pub fn join(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(20));
        }

        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("Monitor thread panicked");
            }
        }
        if let Some(source) = self.source.take() {
            source.shutdown();
            self.log.record_frames_captured(source.frames_captured());
        }
        if let Some(mut dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown();
        }
        debug!("Monitor joined");
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

fn run_recognition(
    mut engine: RecognitionEngine,
    source: Arc<FrameSource>,
    store: SharedStore,
    log: SharedActivityLog,
    decision: DecisionConfig,
    running: Arc<AtomicBool>,
) {
    let mut smoother = ThreatSmoother::from_config(&decision);
    let mut meter = FpsMeter::default();
    let mut seen = 0;

    while running.load(Ordering::SeqCst) {
        let Some(frame) = source.get_newer(seen) else {
            thread::sleep(IDLE_POLL);
            continue;
        };
        seen = frame.sequence;

        let Some(batch) = engine.process(&frame) else {
            continue;
        };
        let fps = meter.tick(Instant::now());
        let has_intruder = batch.has_intruder();
        log.record_sample(batch.faces.len(), has_intruder);

        let update = smoother.push(has_intruder);
        if update.rising_edge {
            info!("Threat detected");
        }

        store.publish(FrameUpdate {
            batch,
            threat: update.threat,
            rising_edge: update.rising_edge,
            fps,
            last_intruder: engine.last_intruder().cloned(),
        });
    }
    debug!("Recognition loop stopped");
}

fn run_control(
    store: SharedStore,
    dispatch: DispatchHandle,
    log: SharedActivityLog,
    decision: DecisionConfig,
    running: Arc<AtomicBool>,
) {
    let mut gate = AlertGate::from_config(&decision);

    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        let (threat, crop) = store.threat_and_intruder();

        if gate.observe(threat, crop.is_some(), now) {
            if let Some(crop) = crop {
                let event = AlertEvent::from_intruder(&crop);
                warn!(
                    "Intruder alert {} (distance {:.1})",
                    event.id, event.confidence
                );
                log.record_alert_fired();
                dispatch.dispatch(event);
            }
        }
        store.set_decision(gate.state(now));

        sleep_while_running(&running, decision.control_interval);
    }
    debug!("Control loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_meter_converges() {
        let mut meter = FpsMeter::default();
        let t0 = Instant::now();
        assert_eq!(meter.tick(t0), 0.0);

        let mut fps = 0.0;
        for i in 1..=200u32 {
            fps = meter.tick(t0 + Duration::from_millis(100) * i);
        }
        assert!((fps - 10.0).abs() < 0.01, "fps {fps}");
    }

    #[test]
    fn test_fps_meter_smooths_spikes() {
        let mut meter = FpsMeter::default();
        let t0 = Instant::now();
        for i in 0..=100u32 {
            meter.tick(t0 + Duration::from_millis(100) * i);
        }
        let spiked = meter.tick(t0 + Duration::from_millis(10_001));
        assert!(spiked < 120.0);
        assert!(spiked > 10.0);
    }

    #[test]
    fn test_prepare_model_without_auto_train() {
        let mut config = Config::default();
        config.data_path =
            std::env::temp_dir().join(format!("facewatch-prepare-{}", uuid::Uuid::new_v4()));
        config.auto_train = false;

        assert!(matches!(
            prepare_model(&config),
            Err(MonitorError::Startup(VisionError::ModelMissing(_)))
        ));
    }

    #[test]
    fn test_prepare_model_reports_training_failure() {
        let mut config = Config::default();
        config.data_path =
            std::env::temp_dir().join(format!("facewatch-prepare-{}", uuid::Uuid::new_v4()));

        assert!(matches!(
            prepare_model(&config),
            Err(MonitorError::Training(TrainingError::EnrollDirMissing(_)))
        ));
    }
}
