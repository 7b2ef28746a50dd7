//! Driver configuration.
//!
//! Loaded from YAML. Every field has a default, so an empty document is a
//! valid configuration:
//!
//! ```yaml
//! constraints:
//!   max_carbs_grams: 48
//!   max_bolus_units: 3.0
//! queue:
//!   max_pending: 16
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading the file failed.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not valid YAML for this schema.
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A value is outside its allowed range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

// ============================================================================
// Configuration Types
// ============================================================================

/// User limits applied by the constraint pipeline.
///
/// These can only tighten the hard limits built into the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    /// Largest carbohydrate entry in grams.
    pub max_carbs_grams: i32,
    /// Largest bolus in units.
    pub max_bolus_units: f64,
    /// Lowest allowed temp target low bound (mg/dL).
    pub tt_low_min_mgdl: f64,
    /// Highest allowed temp target low bound (mg/dL).
    pub tt_low_max_mgdl: f64,
    /// Lowest allowed temp target high bound (mg/dL).
    pub tt_high_min_mgdl: f64,
    /// Highest allowed temp target high bound (mg/dL).
    pub tt_high_max_mgdl: f64,
    /// Longest temp target in minutes.
    pub tt_max_duration_min: u32,
    /// Highest temp basal percent.
    pub max_basal_percent: i32,
    /// Longest temp basal in hours.
    pub max_temp_basal_hours: i32,
    /// Longest extended bolus in half hours.
    pub max_extended_half_hours: i32,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        ConstraintConfig {
            max_carbs_grams: 48,
            max_bolus_units: 3.0,
            tt_low_min_mgdl: 72.0,
            tt_low_max_mgdl: 180.0,
            tt_high_min_mgdl: 72.0,
            tt_high_max_mgdl: 225.0,
            tt_max_duration_min: 24 * 60,
            max_basal_percent: 200,
            max_temp_basal_hours: 24,
            max_extended_half_hours: 16,
        }
    }
}

/// Outbound command queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Commands that may wait behind the in-flight one.
    pub max_pending: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig { max_pending: 16 }
    }
}

/// Top-level driver configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Constraint limits.
    pub constraints: ConstraintConfig,
    /// Queue settings.
    pub queue: QueueConfig,
}

impl DriverConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: DriverConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Serialize to YAML.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check that every limit is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.constraints;
        if c.max_carbs_grams < 0 {
            return Err(invalid("max_carbs_grams", "must not be negative"));
        }
        if !(c.max_bolus_units >= 0.0) {
            return Err(invalid("max_bolus_units", "must be a non-negative number"));
        }
        if !(c.tt_low_min_mgdl <= c.tt_low_max_mgdl) {
            return Err(invalid("tt_low_min_mgdl", "must not exceed tt_low_max_mgdl"));
        }
        if !(c.tt_high_min_mgdl <= c.tt_high_max_mgdl) {
            return Err(invalid("tt_high_min_mgdl", "must not exceed tt_high_max_mgdl"));
        }
        if c.max_basal_percent < 0 {
            return Err(invalid("max_basal_percent", "must not be negative"));
        }
        if c.max_temp_basal_hours < 1 {
            return Err(invalid("max_temp_basal_hours", "must be at least 1"));
        }
        if c.max_extended_half_hours < 1 {
            return Err(invalid("max_extended_half_hours", "must be at least 1"));
        }
        if self.queue.max_pending == 0 {
            return Err(invalid("max_pending", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = DriverConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, DriverConfig::default());
        assert_eq!(config.constraints.max_carbs_grams, 48);
        assert_eq!(config.queue.max_pending, 16);
    }

    #[test]
    fn test_partial_document() {
        let yaml = "constraints:\n  max_carbs_grams: 60\n  max_bolus_units: 5.5\n";
        let config = DriverConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.constraints.max_carbs_grams, 60);
        assert_eq!(config.constraints.max_bolus_units, 5.5);
        assert_eq!(config.constraints.tt_high_max_mgdl, 225.0);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = DriverConfig::default();
        config.queue.max_pending = 4;
        let yaml = config.to_yaml_string().unwrap();
        assert_eq!(DriverConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = DriverConfig::from_yaml_str("queue:\n  max_pending: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "max_pending", .. }));

        let err = DriverConfig::from_yaml_str("constraints:\n  max_carbs_grams: -1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "max_carbs_grams", .. }));

        assert!(matches!(
            DriverConfig::from_yaml_str("constraints: [1, 2]"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            DriverConfig::from_file("/nonexistent/danar.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
