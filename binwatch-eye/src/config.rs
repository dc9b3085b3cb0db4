//! Configuration for binwatch-eye

use crate::error::{EyeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default class list of the garbage model, in model output order.
pub const GARBAGE_CLASSES: &[&str] = &[
    "0",
    "c",
    "garbage",
    "garbage_bag",
    "sampah-detection",
    "trash",
];

/// Serde helper storing a `Duration` as whole milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Timing and threshold knobs of a stream worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Minimum time between two detection samples
    #[serde(with = "duration_ms")]
    pub sample_interval: Duration,
    /// How long garbage must stay present before an alert goes out
    #[serde(with = "duration_ms")]
    pub sustain_threshold: Duration,
    /// Pause after a failed frame read
    #[serde(with = "duration_ms")]
    pub read_retry_delay: Duration,
    /// Pause at the end of every loop iteration
    #[serde(with = "duration_ms")]
    pub loop_pause: Duration,
    /// Detections at or below this confidence are ignored
    pub confidence_floor: f32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(3),
            sustain_threshold: Duration::from_secs(5),
            read_retry_delay: Duration::from_secs(1),
            loop_pause: Duration::from_millis(30),
            confidence_floor: 0.1,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.sample_interval.is_zero() {
            return Err("Sample interval must be non-zero".to_string());
        }
        if self.loop_pause.is_zero() {
            return Err("Loop pause must be non-zero".to_string());
        }
        if self.read_retry_delay.is_zero() {
            return Err("Read retry delay must be non-zero".to_string());
        }
        if !self.confidence_floor.is_finite() || !(0.0..1.0).contains(&self.confidence_floor) {
            return Err("Confidence floor must be in [0, 1)".to_string());
        }
        Ok(())
    }
}

/// SMTP transport settings and credentials for alert mails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    pub sender: String,
    pub app_password: String,
    pub recipient: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Total send attempts per alert (1 = no retry)
    pub max_attempts: u32,
    /// Backoff before the second attempt, doubled for each further one
    #[serde(with = "duration_ms")]
    pub retry_backoff: Duration,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            sender: String::new(),
            app_password: String::new(),
            recipient: String::new(),
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            max_attempts: 1,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl MailerConfig {
    /// Checks transport settings only; credentials are not validated here.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.smtp_host.trim().is_empty() {
            return Err("SMTP host must not be empty".to_string());
        }
        if self.smtp_port == 0 {
            return Err("SMTP port must be non-zero".to_string());
        }
        if self.max_attempts == 0 || self.max_attempts > 5 {
            return Err("Send attempts must be between 1 and 5".to_string());
        }
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        !self.sender.is_empty() && !self.app_password.is_empty() && !self.recipient.is_empty()
    }
}

/// Garbage model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    /// Square model input edge in pixels
    pub input_size: u32,
    pub class_names: Vec<String>,
    /// Candidates scoring below this never leave the model
    pub score_threshold: f32,
    pub iou_threshold: f32,
    /// HTTPS location the model is fetched from when `model_path` is missing
    pub model_url: Option<String>,
    /// Expected SHA-256 of the downloaded model, lowercase hex
    pub model_sha256: Option<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/best.onnx"),
            input_size: 640,
            class_names: GARBAGE_CLASSES.iter().map(|c| c.to_string()).collect(),
            score_threshold: 0.25,
            iou_threshold: 0.45,
            model_url: None,
            model_sha256: None,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_size == 0 || self.input_size > 4096 || self.input_size % 32 != 0 {
            return Err("Input size must be a multiple of 32 up to 4096".to_string());
        }
        if self.class_names.is_empty() {
            return Err("At least one class name is required".to_string());
        }
        if !self.score_threshold.is_finite() || !(0.0..1.0).contains(&self.score_threshold) {
            return Err("Score threshold must be in [0, 1)".to_string());
        }
        if !self.iou_threshold.is_finite() || !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err("IoU threshold must be in [0, 1]".to_string());
        }
        if let Some(url) = &self.model_url {
            if !url.starts_with("https://") || url.len() > 2048 {
                return Err("Model URL must be an https:// address".to_string());
            }
        }
        if let Some(checksum) = &self.model_sha256 {
            if checksum.len() != 64 || !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err("Model checksum must be 64 hex digits".to_string());
            }
        }
        Ok(())
    }
}

/// Dashboard refresh settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    #[serde(with = "duration_ms")]
    pub refresh_interval: Duration,
    /// Directory receiving `<area>.jpg` snapshots, if any
    pub snapshot_dir: Option<PathBuf>,
    #[serde(with = "duration_ms")]
    pub snapshot_interval: Duration,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_millis(50),
            snapshot_dir: None,
            snapshot_interval: Duration::from_secs(1),
        }
    }
}

impl DashboardConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.refresh_interval.is_zero() {
            return Err("Refresh interval must be non-zero".to_string());
        }
        Ok(())
    }
}

/// A stream registered at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec {
    pub area: String,
    pub source: String,
}

impl StreamSpec {
    /// Parse the `AREA=SOURCE` command-line form.
    pub fn parse(value: &str) -> std::result::Result<Self, String> {
        let (area, source) = value
            .split_once('=')
            .ok_or_else(|| format!("Expected AREA=SOURCE, got '{}'", value))?;
        Ok(Self {
            area: area.trim().to_string(),
            source: source.trim().to_string(),
        })
    }
}

/// Whole-application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub worker: WorkerConfig,
    pub mailer: MailerConfig,
    pub detector: DetectorConfig,
    pub dashboard: DashboardConfig,
    pub streams: Vec<StreamSpec>,
    pub log_level: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML or JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            serde_json::from_str(&content)
                .map_err(|e| EyeError::Config(format!("Invalid JSON in {:?}: {}", path, e)))
        } else {
            toml::from_str(&content)
                .map_err(|e| EyeError::Config(format!("Invalid TOML in {:?}: {}", path, e)))
        }
    }

    /// Overlay `BINWATCH_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(sender) = lookup("BINWATCH_SENDER") {
            self.mailer.sender = sender;
        }
        if let Some(password) = lookup("BINWATCH_APP_PASSWORD") {
            self.mailer.app_password = password;
        }
        if let Some(recipient) = lookup("BINWATCH_RECIPIENT") {
            self.mailer.recipient = recipient;
        }
        if let Some(host) = lookup("BINWATCH_SMTP_HOST") {
            self.mailer.smtp_host = host;
        }
        if let Some(port) = lookup("BINWATCH_SMTP_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                self.mailer.smtp_port = p;
            }
        }
        if let Some(model) = lookup("BINWATCH_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(model);
        }
        if let Some(url) = lookup("BINWATCH_MODEL_URL") {
            self.detector.model_url = Some(url);
        }
        if let Some(level) = lookup("BINWATCH_LOG_LEVEL") {
            self.log_level = Some(level);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.worker
            .validate()
            .and_then(|_| self.mailer.validate())
            .and_then(|_| self.detector.validate())
            .and_then(|_| self.dashboard.validate())
            .map_err(EyeError::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.worker.sample_interval, Duration::from_secs(3));
        assert_eq!(config.worker.sustain_threshold, Duration::from_secs(5));
        assert_eq!(config.worker.read_retry_delay, Duration::from_secs(1));
        assert_eq!(config.worker.loop_pause, Duration::from_millis(30));
        assert_eq!(config.mailer.smtp_host, "smtp.gmail.com");
        assert_eq!(config.mailer.smtp_port, 587);
        assert_eq!(config.mailer.max_attempts, 1);
        assert_eq!(config.dashboard.refresh_interval, Duration::from_millis(50));
        assert_eq!(config.detector.class_names.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_worker_validation() {
        let mut config = WorkerConfig::default();
        config.sample_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = WorkerConfig::default();
        config.confidence_floor = 1.5;
        assert!(config.validate().is_err());

        config.confidence_floor = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_rejects_zero_retry_delay() {
        let mut config = WorkerConfig::default();
        config.read_retry_delay = Duration::ZERO;
        assert_eq!(
            config.validate(),
            Err("Read retry delay must be non-zero".to_string())
        );

        let mut app = AppConfig::default();
        app.worker.read_retry_delay = Duration::ZERO;
        assert!(matches!(app.validate(), Err(EyeError::Config(_))));
    }

    #[test]
    fn test_mailer_validation_ignores_credentials() {
        let config = MailerConfig::default();
        assert!(!config.has_credentials());
        assert!(config.validate().is_ok());

        let mut config = MailerConfig::default();
        config.max_attempts = 0;
        assert!(config.validate().is_err());
        config.max_attempts = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_detector_validation() {
        let mut config = DetectorConfig::default();
        config.input_size = 650;
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::default();
        config.class_names.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_detector_model_url_validation() {
        let mut config = DetectorConfig::default();
        config.model_url = Some("http://models.example.com/best.onnx".to_string());
        assert!(config.validate().is_err());

        config.model_url = Some("https://models.example.com/best.onnx".to_string());
        assert!(config.validate().is_ok());

        config.model_sha256 = Some("abc".to_string());
        assert!(config.validate().is_err());

        config.model_sha256 = Some("0f".repeat(32));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stream_spec_parse() {
        let spec = StreamSpec::parse("Lobby = rtsp://10.0.0.2/live").unwrap();
        assert_eq!(spec.area, "Lobby");
        assert_eq!(spec.source, "rtsp://10.0.0.2/live");

        // Only the first '=' separates area from source
        let spec = StreamSpec::parse("Gate=http://cam/feed?a=b").unwrap();
        assert_eq!(spec.source, "http://cam/feed?a=b");

        assert!(StreamSpec::parse("no-separator").is_err());
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("BINWATCH_SENDER", "ops@example.com"),
            ("BINWATCH_RECIPIENT", "cleaning@example.com"),
            ("BINWATCH_SMTP_PORT", "2525"),
            ("BINWATCH_LOG_LEVEL", "debug"),
            ("BINWATCH_MODEL_URL", "https://models.example.com/best.onnx"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_vars(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.mailer.sender, "ops@example.com");
        assert_eq!(config.mailer.recipient, "cleaning@example.com");
        assert_eq!(config.mailer.smtp_port, 2525);
        assert!(config.mailer.app_password.is_empty());
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(
            config.detector.model_url.as_deref(),
            Some("https://models.example.com/best.onnx")
        );
    }

    #[test]
    fn test_env_overlay_ignores_bad_port() {
        let mut config = AppConfig::default();
        config.apply_vars(|key| (key == "BINWATCH_SMTP_PORT").then(|| "smtp".to_string()));
        assert_eq!(config.mailer.smtp_port, 587);
    }

    #[test]
    fn test_durations_round_trip_as_millis() {
        let config = WorkerConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["sample_interval"], 3000);
        assert_eq!(json["loop_pause"], 30);
    }
}
