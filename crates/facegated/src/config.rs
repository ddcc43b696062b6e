use facegate_core::ModelPaths;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the three ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the dataset manifest (JSON).
    pub dataset_manifest: PathBuf,
    /// Euclidean distance below which a probe matches an identity.
    pub match_threshold: f32,
    /// Capture monitor poll period in milliseconds.
    pub monitor_interval_ms: u64,
    /// Number of warmup frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Model load timeout in seconds; 0 disables the timeout.
    pub model_load_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACEGATE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facegate_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        let dataset_manifest = std::env::var("FACEGATE_DATASET_MANIFEST")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("dataset/manifest.json"));

        Self {
            camera_device: std::env::var("FACEGATE_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            dataset_manifest,
            match_threshold: env_f32("FACEGATE_MATCH_THRESHOLD", 0.6),
            monitor_interval_ms: env_u64("FACEGATE_MONITOR_INTERVAL_MS", 500),
            warmup_frames: env_usize("FACEGATE_WARMUP_FRAMES", 4),
            model_load_timeout_secs: env_u64("FACEGATE_MODEL_LOAD_TIMEOUT_SECS", 0),
        }
    }

    /// Resolved paths of the three model resources.
    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir)
    }

    /// Monitor poll period.
    pub fn monitor_period(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Model load timeout, if enabled.
    pub fn model_load_timeout(&self) -> Option<Duration> {
        (self.model_load_timeout_secs > 0)
            .then(|| Duration::from_secs(self.model_load_timeout_secs))
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
