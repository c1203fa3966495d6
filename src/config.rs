use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{LogicalPosition, DEFAULT_MAX_LOGICAL_POSITION, SKIP_SEQUENCE};

/// Hard ceiling for `max_logical_position`
pub const MAX_CONFIGURABLE_POSITION: LogicalPosition = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    pub max_logical_position: LogicalPosition,
    /// Compress a tube after placement once it has more gaps than this. 0 disables.
    pub auto_compress_gap_threshold: usize,
    pub log_level: String,
    /// Daily rolling log files are written here when set
    pub log_dir: Option<PathBuf>,
    pub log_file_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_logical_position: DEFAULT_MAX_LOGICAL_POSITION,
            auto_compress_gap_threshold: 0,
            log_level: "info".to_string(),
            log_dir: None,
            log_file_prefix: "tube-scheduler.log".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("max logical position {value} must be between {min} and {max}")]
    PositionBound {
        value: LogicalPosition,
        min: LogicalPosition,
        max: LogicalPosition,
    },
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_logical_position = std::env::var("TUBE_MAX_POSITION")
            .ok()
            .and_then(|value| value.parse::<LogicalPosition>().ok())
            .unwrap_or(defaults.max_logical_position);

        let auto_compress_gap_threshold = std::env::var("TUBE_AUTO_COMPRESS_GAPS")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(defaults.auto_compress_gap_threshold);

        let log_level = std::env::var("RUST_LOG").unwrap_or(defaults.log_level);

        let log_dir = std::env::var("TUBE_LOG_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .or(defaults.log_dir);

        let log_file_prefix =
            std::env::var("TUBE_LOG_FILE_PREFIX").unwrap_or(defaults.log_file_prefix);

        Self {
            max_logical_position,
            auto_compress_gap_threshold,
            log_level,
            log_dir,
            log_file_prefix,
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// The bound must at least fit the largest skip number, otherwise retired
    /// stitches could never be placed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let min = SKIP_SEQUENCE[SKIP_SEQUENCE.len() - 1];
        if self.max_logical_position < min || self.max_logical_position > MAX_CONFIGURABLE_POSITION
        {
            return Err(ConfigError::PositionBound {
                value: self.max_logical_position,
                min,
                max: MAX_CONFIGURABLE_POSITION,
            });
        }
        Ok(())
    }

    pub fn auto_compress_enabled(&self) -> bool {
        self.auto_compress_gap_threshold > 0
    }

    pub fn file_logging_enabled(&self) -> bool {
        self.log_dir.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_logical_position, 10_000);
        assert!(!config.auto_compress_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config = SchedulerConfig::from_json_str(r#"{"autoCompressGapThreshold": 50}"#).unwrap();
        assert_eq!(config.max_logical_position, DEFAULT_MAX_LOGICAL_POSITION);
        assert_eq!(config.auto_compress_gap_threshold, 50);
        assert!(config.auto_compress_enabled());
        assert!(!config.file_logging_enabled());
    }

    #[test]
    fn test_from_json_log_dir() {
        let config =
            SchedulerConfig::from_json_str(r#"{"logDir": "/var/log/tubes", "logFilePrefix": "sim.log"}"#)
                .unwrap();
        assert!(config.file_logging_enabled());
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/tubes")));
        assert_eq!(config.log_file_prefix, "sim.log");
    }

    #[test]
    fn test_bound_below_largest_skip_rejected() {
        let err = SchedulerConfig::from_json_str(r#"{"maxLogicalPosition": 999}"#).unwrap_err();
        assert!(matches!(err, ConfigError::PositionBound { value: 999, .. }));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            SchedulerConfig::from_json_str("{not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
