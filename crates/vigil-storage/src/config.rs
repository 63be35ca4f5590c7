use chrono::Duration;
use serde::{Deserialize, Serialize};
use vigil_common::duration::parse_duration;

use crate::error::{Result, StoreError};
use crate::store::DEFAULT_BATCH_SIZE;

/// Store settings as read from a TOML file:
///
/// ```toml
/// database_url = "sqlite:///var/lib/vigil/vigil.db?mode=rwc"
/// batch_size = 20
///
/// [retention]
/// max_age = "168h"
/// max_items = 5000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Retention caps applied by [`crate::AlertStore::flush_with_config`].
/// An absent `max_age` and a zero `max_items` each disable their cap.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default)]
    pub max_age: Option<String>,
    #[serde(default)]
    pub max_items: u64,
}

impl StoreConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            batch_size: default_batch_size(),
            retention: RetentionConfig::default(),
        }
    }
}

impl RetentionConfig {
    /// The configured maximum age, or zero when age-based eviction is off.
    pub fn max_age(&self) -> Result<Duration> {
        match self.max_age.as_deref() {
            None => Ok(Duration::zero()),
            Some(raw) => parse_duration(raw).map_err(|source| StoreError::ParseDurationFail {
                field: "retention.max_age",
                value: raw.to_string(),
                source,
            }),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://data/vigil.db?mode=rwc".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: StoreConfig = toml::from_str("").unwrap();
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.database_url, "sqlite://data/vigil.db?mode=rwc");
        assert_eq!(config.retention.max_items, 0);
        assert_eq!(config.retention.max_age().unwrap(), Duration::zero());
    }

    #[test]
    fn retention_section_is_parsed() {
        let config: StoreConfig = toml::from_str(
            r#"
            database_url = "sqlite::memory:"
            batch_size = 50

            [retention]
            max_age = "168h"
            max_items = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.retention.max_items, 5000);
        assert_eq!(config.retention.max_age().unwrap(), Duration::days(7));
    }

    #[test]
    fn example_file_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/vigil.example.toml");
        let config = StoreConfig::load(path).unwrap();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.retention.max_age().unwrap(), Duration::hours(168));
    }

    #[test]
    fn invalid_max_age_is_a_duration_error() {
        let retention = RetentionConfig {
            max_age: Some("7d".to_string()),
            max_items: 0,
        };
        assert!(matches!(
            retention.max_age(),
            Err(StoreError::ParseDurationFail { field: "retention.max_age", .. })
        ));
    }
}
