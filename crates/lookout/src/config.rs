//! YAML configuration for the lookout service.
//!
//! One file serves both deployment variants; validation is split into
//! the part every run needs and the parts specific to `watch` and
//! `bus` mode. All values are resolved once at startup and read-only
//! afterwards.

use anyhow::{bail, Context, Result};
use lookout_sinks::FtpConfig;
use lookout_sources::MqttConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub inference: InferenceConfig,
    #[serde(default)]
    pub file_operations: FileOperationsConfig,
    #[serde(default)]
    pub ftp: Option<FtpConfig>,
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,
    #[serde(default)]
    pub save_images: SaveImagesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Directory holding the model and its label vocabulary.
    pub model_dir: PathBuf,

    /// Confidence boundary in [0, 1]; negative classifications at or
    /// below it are emitted for review.
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// The negative/background class.
    #[serde(default = "default_target_label")]
    pub target_label: String,

    /// Directory watched in `watch` mode.
    #[serde(default)]
    pub image_watch_dir: Option<PathBuf>,

    /// File-name glob for the watcher.
    #[serde(default = "default_watch_pattern")]
    pub watch_pattern: String,

    /// Watcher polling cadence.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Explicit inference runner path. Falls back to the
    /// LOOKOUT_CLASSIFY_BIN env var, then to `lookout-classify` next to
    /// the executable.
    #[serde(default)]
    pub classifier_cmd: Option<PathBuf>,
}

fn default_threshold() -> f32 {
    0.9
}

fn default_target_label() -> String {
    "nothing".to_string()
}

fn default_watch_pattern() -> String {
    "*.jpg".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileOperationsConfig {
    /// Copy discarded images to `copy_destination`.
    #[serde(default)]
    pub copy: bool,
    #[serde(default)]
    pub copy_destination: Option<PathBuf>,
    /// Delete the local source file after routing.
    #[serde(default)]
    pub delete: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveImagesConfig {
    /// Save discarded bus images to `destination`.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub destination: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub filename: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            filename: None,
        }
    }
}

impl Config {
    /// Load and parse the config file, applying the checks common to
    /// both deployment variants.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate_common()?;
        Ok(config)
    }

    fn validate_common(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.inference.threshold) {
            bail!(
                "inference.threshold must be in [0, 1], got {}",
                self.inference.threshold
            );
        }
        if self.inference.target_label.is_empty() {
            bail!("inference.target_label must not be empty");
        }
        if self.file_operations.copy && self.file_operations.copy_destination.is_none() {
            bail!("file_operations.copy is enabled but copy_destination is not set");
        }
        if self.save_images.enabled && self.save_images.destination.is_none() {
            bail!("save_images.enabled is set but save_images.destination is not");
        }
        Ok(())
    }

    /// Checks specific to `watch` mode.
    pub fn validate_watch(&self) -> Result<()> {
        if self.inference.image_watch_dir.is_none() {
            bail!("watch mode requires inference.image_watch_dir");
        }
        if self.inference.poll_interval_ms == 0 {
            bail!("inference.poll_interval_ms must be positive");
        }
        Ok(())
    }

    /// Checks specific to `bus` mode.
    pub fn validate_bus(&self) -> Result<()> {
        let Some(mqtt) = &self.mqtt else {
            bail!("bus mode requires the mqtt section");
        };
        if mqtt.subscribe_topic.is_empty() {
            bail!("mqtt.subscribe_topic must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
inference:
  model_dir: /var/lib/lookout/model
  threshold: 0.5
  target_label: nothing
  image_watch_dir: /var/spool/camera
file_operations:
  copy: true
  copy_destination: /var/lib/lookout/retained
  delete: true
ftp:
  host: camera-ftp.local
  port: 2121
  username: camera
  password: secret
mqtt:
  host: broker.local
  username: lookout
  password: secret
  subscribe_topic: camera/images
  publish_topic: camera/detections
save_images:
  enabled: true
  destination: /var/lib/lookout/retained
logging:
  level: debug
  filename: /var/log/lookout.log
"#;

    fn parse(yaml: &str) -> Config {
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config
    }

    #[test]
    fn full_config_parses_and_validates() {
        let config = parse(FULL);
        config.validate_common().unwrap();
        config.validate_watch().unwrap();
        config.validate_bus().unwrap();

        assert_eq!(config.inference.threshold, 0.5);
        assert_eq!(config.ftp.as_ref().unwrap().port, 2121);
        assert_eq!(config.mqtt.as_ref().unwrap().port, 1883);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse("inference:\n  model_dir: /model\n");
        config.validate_common().unwrap();

        assert_eq!(config.inference.threshold, 0.9);
        assert_eq!(config.inference.target_label, "nothing");
        assert_eq!(config.inference.watch_pattern, "*.jpg");
        assert_eq!(config.inference.poll_interval_ms, 500);
        assert!(!config.file_operations.copy);
        assert!(!config.file_operations.delete);
        assert!(!config.save_images.enabled);
        assert_eq!(config.logging.level, "info");
        assert!(config.ftp.is_none());
        assert!(config.mqtt.is_none());
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        let config = parse("inference:\n  model_dir: /model\n  threshold: 1.5\n");
        assert!(config.validate_common().is_err());
    }

    #[test]
    fn empty_target_label_is_rejected() {
        let config = parse("inference:\n  model_dir: /model\n  target_label: \"\"\n");
        assert!(config.validate_common().is_err());
    }

    #[test]
    fn copy_without_destination_is_rejected() {
        let config = parse(
            "inference:\n  model_dir: /model\nfile_operations:\n  copy: true\n",
        );
        assert!(config.validate_common().is_err());
    }

    #[test]
    fn save_without_destination_is_rejected() {
        let config = parse("inference:\n  model_dir: /model\nsave_images:\n  enabled: true\n");
        assert!(config.validate_common().is_err());
    }

    #[test]
    fn watch_mode_requires_watch_dir() {
        let config = parse("inference:\n  model_dir: /model\n");
        assert!(config.validate_watch().is_err());
    }

    #[test]
    fn bus_mode_requires_mqtt_section() {
        let config = parse("inference:\n  model_dir: /model\n");
        assert!(config.validate_bus().is_err());
    }

    #[test]
    fn load_rejects_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "inference: [not, a, map]").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn load_reads_a_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, FULL).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.inference.model_dir, PathBuf::from("/var/lib/lookout/model"));
    }
}
