//! Run configuration: detector thresholds and preprocessing options.
//!
//! Every section carries `#[serde(default)]` so a partial JSON file only
//! overrides what it names.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;

pub const LOW_CONSUMPTION_RANGE: RangeInclusive<f64> = 10.0..=200.0;
pub const NEIGHBOR_RATIO_RANGE: RangeInclusive<f64> = 30.0..=90.0;
pub const SUDDEN_DROP_RANGE: RangeInclusive<f64> = 40.0..=90.0;

/// Tunable detector thresholds, immutable for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Average m³/month of non-zero months below which a facility is flagged.
    pub low_consumption_threshold: f64,
    /// Percent of the building peer average a facility must reach.
    pub neighbor_ratio_threshold: f64,
    /// Month-over-month decline, in percent, counted as a sudden drop.
    pub sudden_drop_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_consumption_threshold: 30.0,
            neighbor_ratio_threshold: 60.0,
            sudden_drop_threshold: 70.0,
        }
    }
}

impl Thresholds {
    /// Check every threshold against its documented range.
    ///
    /// The engine itself never calls this; callers validate before a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "low_consumption_threshold",
            self.low_consumption_threshold,
            LOW_CONSUMPTION_RANGE,
        )?;
        check_range(
            "neighbor_ratio_threshold",
            self.neighbor_ratio_threshold,
            NEIGHBOR_RATIO_RANGE,
        )?;
        check_range(
            "sudden_drop_threshold",
            self.sudden_drop_threshold,
            SUDDEN_DROP_RANGE,
        )
    }
}

fn check_range(
    name: &'static str,
    value: f64,
    range: RangeInclusive<f64>,
) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// How raw tables are turned into a cleaned dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub meter_id_column: String,
    pub building_id_column: String,
    /// First year (inclusive) a reading column label may carry.
    pub first_year: i32,
    /// Last year (inclusive) a reading column label may carry.
    pub last_year: i32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            meter_id_column: "TN".to_string(),
            building_id_column: "BN".to_string(),
            first_year: 2016,
            last_year: 2025,
        }
    }
}

impl PreprocessConfig {
    pub fn years(&self) -> RangeInclusive<i32> {
        self.first_year..=self.last_year
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.first_year > self.last_year {
            return Err(ConfigError::EmptyYearRange {
                first: self.first_year,
                last: self.last_year,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: Thresholds,
    pub preprocess: PreprocessConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        self.preprocess.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_thresholds() {
        let t = Thresholds::default();
        assert_eq!(t.low_consumption_threshold, 30.0);
        assert_eq!(t.neighbor_ratio_threshold, 60.0);
        assert_eq!(t.sudden_drop_threshold, 70.0);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{"thresholds": {"sudden_drop_threshold": 50}}"#)
                .unwrap();
        assert_eq!(config.thresholds.sudden_drop_threshold, 50.0);
        assert_eq!(config.thresholds.low_consumption_threshold, 30.0);
        assert_eq!(config.preprocess.meter_id_column, "TN");
        assert_eq!(config.preprocess.years(), 2016..=2025);
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let t = Thresholds {
            neighbor_ratio_threshold: 95.0,
            ..Default::default()
        };
        match t.validate() {
            Err(ConfigError::OutOfRange { name, .. }) => {
                assert_eq!(name, "neighbor_ratio_threshold")
            }
            other => panic!("expected OutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_inverted_year_range_rejected() {
        let config = PreprocessConfig {
            first_year: 2025,
            last_year: 2016,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
