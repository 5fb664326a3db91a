//! Alert dispatch: snapshot persistence and best-effort delivery.
//!
//! [`AlertDispatcher::dispatch`] only enqueues. A worker thread persists the
//! snapshot and hands the payload to every configured [`AlertSink`]; a slow
//! or unreachable collaborator never stalls the monitor loops.

use crate::config::Config;
use crate::core::{AlertEvent, AlertPayload};
use crate::transparency::SharedActivityLog;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Dispatch error types.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("snapshot encoding failed: {0}")]
    Snapshot(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dispatch config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Writes intruder snapshots as timestamped JPEG files.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist the event's snapshot and return its path.
    pub fn save(&self, event: &AlertEvent) -> Result<PathBuf, DispatchError> {
        std::fs::create_dir_all(&self.dir)?;

        let stamp = event.timestamp.format("%Y%m%d_%H%M%S");
        let mut path = self.dir.join(format!("intruder_{stamp}.jpg"));
        if path.exists() {
            let suffix = &event.id.simple().to_string()[..8];
            path = self.dir.join(format!("intruder_{stamp}_{suffix}.jpg"));
        }

        event
            .snapshot
            .save_with_format(&path, ImageFormat::Jpeg)?;
        Ok(path)
    }
}

/// A delivery channel for fired alerts.
///
/// Sinks run on the dispatcher worker thread. Errors are logged and
/// counted by the worker, never retried.
pub trait AlertSink: Send {
    fn name(&self) -> &str;

    fn deliver(
        &mut self,
        event: &AlertEvent,
        payload: &AlertPayload,
        snapshot: &Path,
    ) -> Result<(), DispatchError>;
}

/// Logs the payload; used when no backend is configured.
#[derive(Debug, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn deliver(
        &mut self,
        _event: &AlertEvent,
        payload: &AlertPayload,
        _snapshot: &Path,
    ) -> Result<(), DispatchError> {
        let json = serde_json::to_string(payload)
            .map_err(|e| DispatchError::Serialization(e.to_string()))?;
        info!("Alert: {json}");
        Ok(())
    }
}

#[cfg(feature = "gateway")]
pub use http::{BackendSink, TelegramSink};

#[cfg(feature = "gateway")]
mod http {
    use super::*;
    use crate::config::TelegramConfig;
    use std::time::Duration;

    /// Async HTTP client driven by a private current-thread runtime.
    struct HttpDelivery {
        client: reqwest::Client,
        runtime: tokio::runtime::Runtime,
    }

    impl HttpDelivery {
        fn new(timeout: Duration) -> Result<Self, DispatchError> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| DispatchError::Config(format!("Failed to create runtime: {e}")))?;
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| DispatchError::Config(format!("Failed to create HTTP client: {e}")))?;
            Ok(Self { client, runtime })
        }

        fn send(&self, request: reqwest::RequestBuilder) -> Result<(), DispatchError> {
            self.runtime.block_on(async {
                let response = request
                    .send()
                    .await
                    .map_err(|e| DispatchError::Network(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    let message = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(DispatchError::Server {
                        status: status.as_u16(),
                        message,
                    });
                }
                Ok(())
            })
        }
    }

    /// POSTs the JSON payload to the configured backend.
    pub struct BackendSink {
        url: String,
        api_key: Option<String>,
        http: HttpDelivery,
    }

    impl BackendSink {
        pub fn new(
            url: impl Into<String>,
            api_key: Option<String>,
            timeout: Duration,
        ) -> Result<Self, DispatchError> {
            Ok(Self {
                url: url.into(),
                api_key,
                http: HttpDelivery::new(timeout)?,
            })
        }
    }

    impl AlertSink for BackendSink {
        fn name(&self) -> &str {
            "backend"
        }

        fn deliver(
            &mut self,
            _event: &AlertEvent,
            payload: &AlertPayload,
            _snapshot: &Path,
        ) -> Result<(), DispatchError> {
            let mut request = self.http.client.post(&self.url).json(payload);
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {key}"));
            }
            self.http.send(request)
        }
    }

    /// Sends the snapshot to a Telegram chat.
    pub struct TelegramSink {
        bot_token: String,
        chat_id: String,
        host: String,
        http: HttpDelivery,
    }

    impl TelegramSink {
        pub fn new(config: &TelegramConfig, timeout: Duration) -> Result<Self, DispatchError> {
            let host = hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            Ok(Self {
                bot_token: config.bot_token.clone(),
                chat_id: config.chat_id.clone(),
                host,
                http: HttpDelivery::new(timeout)?,
            })
        }

        fn url(&self) -> String {
            format!("https://api.telegram.org/bot{}/sendPhoto", self.bot_token)
        }
    }

    impl AlertSink for TelegramSink {
        fn name(&self) -> &str {
            "telegram"
        }

        fn deliver(
            &mut self,
            event: &AlertEvent,
            payload: &AlertPayload,
            snapshot: &Path,
        ) -> Result<(), DispatchError> {
            let bytes = std::fs::read(snapshot)?;
            let caption = alert_caption(&self.host, payload);

            let photo = reqwest::multipart::Part::bytes(bytes)
                .file_name(format!("intruder_{}.jpg", event.id.simple()))
                .mime_str("image/jpeg")
                .map_err(|e| DispatchError::Serialization(e.to_string()))?;
            let form = reqwest::multipart::Form::new()
                .text("chat_id", self.chat_id.clone())
                .text("caption", caption)
                .part("photo", photo);

            self.http.send(self.http.client.post(self.url()).multipart(form))
        }
    }
}

/// Human-readable notification text for an alert.
pub fn alert_caption(host: &str, payload: &AlertPayload) -> String {
    format!(
        "INTRUDER DETECTED\nHost: {host}\nConfidence: {:.1}\nTime: {}",
        payload.confidence, payload.timestamp
    )
}

/// Build the sinks named by the alert configuration.
pub fn sinks_from_config(config: &Config) -> Result<Vec<Box<dyn AlertSink>>, DispatchError> {
    #[allow(unused_mut)]
    let mut sinks: Vec<Box<dyn AlertSink>> = Vec::new();
    let alerts = &config.alerts;

    #[cfg(feature = "gateway")]
    {
        if let Some(url) = &alerts.backend_url {
            sinks.push(Box::new(BackendSink::new(
                url.clone(),
                alerts.api_key.clone(),
                alerts.timeout,
            )?));
        }
        if let Some(telegram) = &alerts.telegram {
            sinks.push(Box::new(TelegramSink::new(telegram, alerts.timeout)?));
        }
    }

    #[cfg(not(feature = "gateway"))]
    {
        if alerts.backend_url.is_some() || alerts.telegram.is_some() {
            warn!("Built without the `gateway` feature; remote alert delivery is disabled");
        }
    }

    if alerts.backend_url.is_none() || sinks.is_empty() {
        sinks.push(Box::new(LogSink));
    }
    Ok(sinks)
}

/// Cloneable sending side of the dispatcher queue.
#[derive(Clone)]
pub struct DispatchHandle {
    sender: Sender<AlertEvent>,
    dropped: Arc<AtomicU64>,
}

impl DispatchHandle {
    /// Enqueue an alert without blocking.
    ///
    /// Returns `false` if the queue was full or the worker is gone; the
    /// event is dropped in that case.
    pub fn dispatch(&self, event: AlertEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!("Alert queue full, dropping alert {}", event.id);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(event)) => {
                warn!("Alert worker stopped, dropping alert {}", event.id);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Owns the delivery worker.
pub struct AlertDispatcher {
    handle: Option<DispatchHandle>,
    worker: Option<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
}

impl AlertDispatcher {
    /// Start the delivery worker.
    pub fn spawn(
        store: SnapshotStore,
        sinks: Vec<Box<dyn AlertSink>>,
        capacity: usize,
        log: Option<SharedActivityLog>,
    ) -> Result<Self, DispatchError> {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        let worker = thread::Builder::new()
            .name("alert-dispatch".to_string())
            .spawn(move || run_worker(receiver, store, sinks, log))?;

        Ok(Self {
            handle: Some(DispatchHandle {
                sender,
                dropped: dropped.clone(),
            }),
            worker: Some(worker),
            dropped,
        })
    }

    /// Start a worker with the snapshot store and sinks from `config`.
    pub fn from_config(config: &Config, log: Option<SharedActivityLog>) -> Result<Self, DispatchError> {
        let sinks = sinks_from_config(config)?;
        info!(
            "Alert sinks: {}",
            sinks.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
        );
        Self::spawn(
            SnapshotStore::new(config.intruder_dir()),
            sinks,
            config.alerts.queue_capacity,
            log,
        )
    }

    /// A sending handle for another thread.
    ///
    /// `None` once the dispatcher has been shut down.
    pub fn handle(&self) -> Option<DispatchHandle> {
        self.handle.clone()
    }

    /// Enqueue an alert without blocking.
    pub fn dispatch(&self, event: AlertEvent) -> bool {
        match &self.handle {
            Some(handle) => handle.dispatch(event),
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Alerts dropped because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the queue and wait for queued alerts to be delivered.
    ///
    /// Handles given out by [`Self::handle`] must be dropped first or the
    /// worker keeps waiting for them.
    pub fn shutdown(&mut self) {
        self.handle = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Alert worker panicked");
            }
        }
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    receiver: Receiver<AlertEvent>,
    store: SnapshotStore,
    mut sinks: Vec<Box<dyn AlertSink>>,
    log: Option<SharedActivityLog>,
) {
    let record_failure = || {
        if let Some(log) = &log {
            log.record_dispatch_failure();
        }
    };

    for event in receiver.iter() {
        let path = match store.save(&event) {
            Ok(path) => path,
            Err(e) => {
                warn!("Could not save intruder snapshot: {e}");
                record_failure();
                continue;
            }
        };
        info!("Intruder snapshot saved to {}", path.display());

        let payload = event.payload(&path);
        for sink in sinks.iter_mut() {
            match sink.deliver(&event, &payload, &path) {
                Ok(()) => debug!("Alert {} delivered via {}", event.id, sink.name()),
                Err(e) => {
                    warn!("Alert delivery via {} failed: {e}", sink.name());
                    record_failure();
                }
            }
        }
    }
    debug!("Alert worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::{FaceRect, IntruderCrop};
    use chrono::Local;
    use image::{Rgb, RgbImage};
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Clone, Default)]
    struct RecordingSink {
        payloads: Arc<Mutex<Vec<AlertPayload>>>,
    }

    impl AlertSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        fn deliver(
            &mut self,
            _event: &AlertEvent,
            payload: &AlertPayload,
            snapshot: &Path,
        ) -> Result<(), DispatchError> {
            assert!(snapshot.is_file());
            self.payloads.lock().push(payload.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl AlertSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn deliver(
            &mut self,
            _event: &AlertEvent,
            _payload: &AlertPayload,
            _snapshot: &Path,
        ) -> Result<(), DispatchError> {
            Err(DispatchError::Network("unreachable".to_string()))
        }
    }

    /// Blocks every delivery until the gate is released.
    struct BlockedSink(Arc<Mutex<()>>);

    impl AlertSink for BlockedSink {
        fn name(&self) -> &str {
            "blocked"
        }

        fn deliver(
            &mut self,
            _event: &AlertEvent,
            _payload: &AlertPayload,
            _snapshot: &Path,
        ) -> Result<(), DispatchError> {
            let _guard = self.0.lock();
            Ok(())
        }
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("facewatch-dispatch-{}", uuid::Uuid::new_v4()))
    }

    fn event() -> AlertEvent {
        AlertEvent::from_intruder(&IntruderCrop {
            image: Arc::new(RgbImage::from_pixel(24, 24, Rgb([180, 40, 40]))),
            rect: FaceRect::new(5, 6, 24, 24),
            distance: 81.0,
            captured_at: Local::now(),
        })
    }

    #[test]
    fn test_snapshot_file_name() {
        let dir = temp_dir();
        let store = SnapshotStore::new(&dir);
        let event = event();

        let path = store.save(&event).unwrap();
        let expected = format!("intruder_{}.jpg", event.timestamp.format("%Y%m%d_%H%M%S"));
        assert_eq!(path.file_name().unwrap().to_string_lossy(), expected);

        // Same second does not overwrite.
        let second = store.save(&event).unwrap();
        assert_ne!(path, second);
        assert!(second.is_file());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_worker_delivers_and_counts_failures() {
        let dir = temp_dir();
        let log = crate::transparency::create_shared_log();
        let recording = RecordingSink::default();
        let sinks: Vec<Box<dyn AlertSink>> = vec![Box::new(FailingSink), Box::new(recording.clone())];

        let mut dispatcher =
            AlertDispatcher::spawn(SnapshotStore::new(&dir), sinks, 4, Some(log.clone())).unwrap();
        assert!(dispatcher.dispatch(event()));
        dispatcher.shutdown();

        let payloads = recording.payloads.lock();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].event, "intruder_detected");
        assert_eq!(payloads[0].bbox, [5, 6, 24, 24]);
        assert!(payloads[0].snapshot_path.starts_with(&*dir.to_string_lossy()));
        assert_eq!(log.stats().dispatch_failures, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_dispatch_never_blocks_on_slow_sink() {
        let dir = temp_dir();
        let gate = Arc::new(Mutex::new(()));
        let held = gate.lock();

        let sinks: Vec<Box<dyn AlertSink>> = vec![Box::new(BlockedSink(gate.clone()))];
        let mut dispatcher = AlertDispatcher::spawn(SnapshotStore::new(&dir), sinks, 1, None).unwrap();

        let start = Instant::now();
        let accepted = (0..10).filter(|_| dispatcher.dispatch(event())).count();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(accepted < 10);
        assert_eq!(dispatcher.dropped(), (10 - accepted) as u64);

        drop(held);
        dispatcher.shutdown();
        assert!(!dispatcher.dispatch(event()));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_log_sink_used_without_backend() {
        let config = Config::default();
        let sinks = sinks_from_config(&config).unwrap();
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].name(), "log");
    }

    #[test]
    fn test_caption() {
        let payload = event().payload(Path::new("/tmp/x.jpg"));
        let caption = alert_caption("desk-1", &payload);
        assert!(caption.starts_with("INTRUDER DETECTED"));
        assert!(caption.contains("desk-1"));
        assert!(caption.contains("81.0"));
    }
}
