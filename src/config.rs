//! Configuration for the Facewatch Agent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera device index handed to the capture backend
    pub camera_index: i32,

    /// Name of the enrolled owner identity
    pub owner_name: String,

    /// Root for enrollment images, model artifacts and intruder snapshots
    pub data_path: PathBuf,

    /// Train automatically when `monitor` starts without a model artifact
    pub auto_train: bool,

    /// Region detector settings
    pub detector: DetectorConfig,

    /// Per-frame recognition settings
    pub recognition: RecognitionConfig,

    /// Smoothing and alert gating settings
    pub decision: DecisionConfig,

    /// Alert delivery settings
    pub alerts: AlertConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facewatch-agent");

        Self {
            camera_index: 0,
            owner_name: "owner".to_string(),
            data_path: data_dir,
            auto_train: true,
            detector: DetectorConfig::default(),
            recognition: RecognitionConfig::default(),
            decision: DecisionConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facewatch-agent")
            .join("config.json")
    }

    /// Directory holding the owner's enrollment images.
    pub fn enroll_dir(&self) -> PathBuf {
        self.data_path.join("enrolled").join(&self.owner_name)
    }

    /// Directory holding the classifier and label-map artifacts.
    pub fn model_dir(&self) -> PathBuf {
        self.data_path.join("models")
    }

    /// Directory receiving intruder snapshots.
    pub fn intruder_dir(&self) -> PathBuf {
        self.data_path.join("intruders")
    }

    /// Path of the persisted activity log.
    pub fn activity_path(&self) -> PathBuf {
        self.data_path.join("activity.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        std::fs::create_dir_all(self.model_dir())?;
        std::fs::create_dir_all(self.intruder_dir())?;
        Ok(())
    }
}

/// Haar cascade settings used by the OpenCV region detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Path to a frontal-face cascade XML file
    pub cascade_path: PathBuf,
    pub scale_factor: f64,
    pub min_neighbors: i32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            cascade_path: PathBuf::from("haarcascade_frontalface_default.xml"),
            scale_factor: 1.1,
            min_neighbors: 5,
        }
    }
}

/// Per-frame recognition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Only every Nth new frame is analysed
    pub process_every_n_frames: u32,
    /// Scale applied to the intensity image before region detection
    pub downscale_factor: f32,
    /// Regions smaller than this (source pixels) are discarded
    pub min_face_area: u32,
    /// Edge length of the square canonical face crop
    pub face_size: u32,
    /// Owner matches with a distance above this are treated as intruders
    pub intruder_distance_threshold: f64,
    /// Enrollment images needed before training is attempted
    pub min_enrollment_images: usize,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            process_every_n_frames: 5,
            downscale_factor: 0.5,
            min_face_area: 80 * 80,
            face_size: 200,
            intruder_distance_threshold: 70.0,
            min_enrollment_images: 10,
        }
    }
}

/// Smoothing and alert gating settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub vote_window: usize,
    pub votes_required: usize,
    pub streak_required: u32,
    /// Minimum time between two fired alerts
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
    /// Cadence of the control loop
    #[serde(with = "duration_millis")]
    pub control_interval: Duration,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            vote_window: crate::core::DECISION_WINDOW,
            votes_required: crate::core::INTRUDER_VOTES_REQUIRED,
            streak_required: crate::core::INTRUDER_STREAK_REQUIRED,
            cooldown: crate::core::ALERT_COOLDOWN,
            control_interval: Duration::from_millis(30),
        }
    }
}

/// Alert delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Endpoint receiving the JSON alert payload
    pub backend_url: Option<String>,
    /// Bearer key sent with the payload
    pub api_key: Option<String>,
    /// Upper bound for each outbound HTTP call
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Alerts waiting for delivery beyond this are dropped
    pub queue_capacity: usize,
    pub telegram: Option<TelegramConfig>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            api_key: None,
            timeout: Duration::from_secs(5),
            queue_capacity: 8,
            telegram: None,
        }
    }
}

/// Telegram bot credentials for snapshot notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Serde support for Duration as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde support for Duration as milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
