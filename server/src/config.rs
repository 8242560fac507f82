//! Service configuration loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use almanac_memory::embedding::DEFAULT_DIMENSION;
use almanac_memory::{ReflectionThresholds, SchedulerConfig};

use crate::error::{ServiceError, ServiceResult};

/// Upper bound for every interval setting (one year)
pub const MAX_INTERVAL_HOURS: f64 = 24.0 * 365.0;

pub const DEFAULT_LOG_FILTER: &str = "almanac=info,almanac_server=info,almanac_memory=info";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlmanacConfig {
    /// `tracing` filter used when `RUST_LOG` is unset
    pub log_filter: String,
    pub embedding: EmbeddingSettings,
    pub reflection: ReflectionSettings,
    pub scheduler: SchedulerSettings,
}

impl Default for AlmanacConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            embedding: EmbeddingSettings::default(),
            reflection: ReflectionSettings::default(),
            scheduler: SchedulerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub dimension: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReflectionSettings {
    pub project_count: usize,
    pub decision_sequence: usize,
    pub event_pattern_threshold: usize,
    /// Minimum hours between automatic reflections
    pub interval_hours: f64,
    pub min_entries: usize,
}

impl Default for ReflectionSettings {
    fn default() -> Self {
        let defaults = ReflectionThresholds::default();
        Self {
            project_count: defaults.project_count,
            decision_sequence: defaults.decision_sequence,
            event_pattern_threshold: defaults.event_pattern_threshold,
            interval_hours: defaults.reflection_interval.num_seconds() as f64 / 3600.0,
            min_entries: defaults.min_entries,
        }
    }
}

impl ReflectionSettings {
    pub fn thresholds(&self) -> ReflectionThresholds {
        ReflectionThresholds {
            project_count: self.project_count,
            decision_sequence: self.decision_sequence,
            event_pattern_threshold: self.event_pattern_threshold,
            reflection_interval: hours_to_chrono(self.interval_hours),
            min_entries: self.min_entries,
            ..ReflectionThresholds::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub interval_hours: f64,
    pub jitter_percent: f64,
    pub min_interval_hours: f64,
    /// Seed for reflection randomness; entropy when absent
    pub seed: Option<u64>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: 6.0,
            jitter_percent: 10.0,
            min_interval_hours: 6.0,
            seed: None,
        }
    }
}

impl SchedulerSettings {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs_f64(self.interval_hours * 3600.0),
            jitter_percent: self.jitter_percent,
            min_interval: hours_to_chrono(self.min_interval_hours),
            ..SchedulerConfig::default()
        }
    }
}

impl AlmanacConfig {
    /// Read and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> ServiceResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ServiceError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ServiceResult<()> {
        if self.embedding.dimension == 0 {
            return Err(ServiceError::config("embedding.dimension must be positive"));
        }
        let intervals = [
            ("reflection.interval_hours", self.reflection.interval_hours),
            ("scheduler.interval_hours", self.scheduler.interval_hours),
            ("scheduler.min_interval_hours", self.scheduler.min_interval_hours),
        ];
        for (name, hours) in intervals {
            if !(0.0..=MAX_INTERVAL_HOURS).contains(&hours) {
                return Err(ServiceError::config(format!(
                    "{} must be between 0 and {} hours",
                    name, MAX_INTERVAL_HOURS
                )));
            }
        }
        // the periodic loop sleeps this long between cycles
        if self.scheduler.interval_hours <= 0.0 {
            return Err(ServiceError::config(
                "scheduler.interval_hours must be positive",
            ));
        }
        if !(0.0..=100.0).contains(&self.scheduler.jitter_percent) {
            return Err(ServiceError::config(
                "scheduler.jitter_percent must be between 0 and 100",
            ));
        }
        Ok(())
    }
}

fn hours_to_chrono(hours: f64) -> chrono::Duration {
    chrono::Duration::seconds((hours * 3600.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AlmanacConfig::from_toml_str("").unwrap();
        assert_eq!(config, AlmanacConfig::default());
        assert_eq!(config.embedding.dimension, 128);
        assert_eq!(config.reflection.interval_hours, 24.0);
        assert!(config.scheduler.enabled);
        assert!(config.scheduler.seed.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = AlmanacConfig::from_toml_str(
            r#"
            [reflection]
            project_count = 4

            [scheduler]
            enabled = false
            seed = 42
            "#,
        )
        .unwrap();

        assert_eq!(config.reflection.project_count, 4);
        assert_eq!(config.reflection.decision_sequence, 5);
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.seed, Some(42));
        assert_eq!(config.scheduler.jitter_percent, 10.0);
    }

    #[test]
    fn test_thresholds_conversion() {
        let settings = ReflectionSettings {
            interval_hours: 1.5,
            min_entries: 2,
            ..Default::default()
        };
        let thresholds = settings.thresholds();
        assert_eq!(thresholds.reflection_interval, chrono::Duration::minutes(90));
        assert_eq!(thresholds.min_entries, 2);
        assert_eq!(thresholds.min_errors, 3);
    }

    #[test]
    fn test_scheduler_conversion() {
        let settings = SchedulerSettings {
            interval_hours: 0.5,
            min_interval_hours: 2.0,
            ..Default::default()
        };
        let config = settings.scheduler_config();
        assert_eq!(config.interval, Duration::from_secs(1800));
        assert_eq!(config.min_interval, chrono::Duration::hours(2));
        assert_eq!(config.important_events.len(), 4);
    }

    #[test]
    fn test_rejects_zero_dimension() {
        let err = AlmanacConfig::from_toml_str("[embedding]\ndimension = 0").unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[test]
    fn test_rejects_negative_interval() {
        let err = AlmanacConfig::from_toml_str("[scheduler]\ninterval_hours = -1.0").unwrap_err();
        assert!(err.to_string().contains("scheduler.interval_hours"));
    }

    #[test]
    fn test_rejects_zero_scheduler_interval() {
        let err = AlmanacConfig::from_toml_str("[scheduler]\ninterval_hours = 0.0").unwrap_err();
        assert!(err.to_string().contains("must be positive"));

        // a zero reflection interval only disables rate limiting
        assert!(AlmanacConfig::from_toml_str("[reflection]\ninterval_hours = 0.0").is_ok());
    }

    #[test]
    fn test_rejects_huge_intervals() {
        for doc in [
            "[scheduler]\ninterval_hours = 1e300",
            "[scheduler]\nmin_interval_hours = 1e18",
            "[reflection]\ninterval_hours = 9000.0",
        ] {
            let err = AlmanacConfig::from_toml_str(doc).unwrap_err();
            assert!(matches!(err, ServiceError::Config(_)), "{}", doc);
        }

        let config = AlmanacConfig::from_toml_str("[scheduler]\ninterval_hours = 8760.0").unwrap();
        assert_eq!(
            config.scheduler.scheduler_config().interval,
            Duration::from_secs(8760 * 3600)
        );
    }

    #[test]
    fn test_rejects_jitter_out_of_range() {
        assert!(AlmanacConfig::from_toml_str("[scheduler]\njitter_percent = 150.0").is_err());
        assert!(AlmanacConfig::from_toml_str("[scheduler]\njitter_percent = 100.0").is_ok());
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = AlmanacConfig::from_toml_str("[scheduler\n").unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_filter = \"almanac=debug\"").unwrap();
        writeln!(file, "[embedding]\ndimension = 64").unwrap();

        let config = AlmanacConfig::load(file.path()).unwrap();
        assert_eq!(config.log_filter, "almanac=debug");
        assert_eq!(config.embedding.dimension, 64);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AlmanacConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ServiceError::Io(_)));
    }
}
