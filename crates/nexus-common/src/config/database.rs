//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PARSE_CACHE_CAPACITY, DEFAULT_SCHEMA};

/// Main database configuration.
///
/// # Example
///
/// ```rust
/// use nexus_common::config::DatabaseConfig;
///
/// let config = DatabaseConfig::default();
/// assert_eq!(config.parse_cache_capacity, 1000);
/// assert_eq!(config.default_schema, "public");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Number of parsed statement batches kept in the LRU parse cache.
    /// Zero disables caching.
    /// Default: 1000
    pub parse_cache_capacity: usize,

    /// Schema qualifier accepted in front of table names.
    /// Default: "public"
    pub default_schema: String,

    /// Log a warning whenever a query falls back to a full table scan.
    /// Default: false
    pub warn_on_seq_scan: bool,

    /// Fail any query that needs a full table scan.
    /// Default: false
    pub forbid_seq_scan: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            parse_cache_capacity: DEFAULT_PARSE_CACHE_CAPACITY,
            default_schema: DEFAULT_SCHEMA.to_string(),
            warn_on_seq_scan: false,
            forbid_seq_scan: false,
        }
    }
}

impl DatabaseConfig {
    /// Creates a minimal configuration for testing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            parse_cache_capacity: 64,
            warn_on_seq_scan: true,
            ..Default::default()
        }
    }

    /// Sets the parse cache capacity.
    #[must_use]
    pub fn with_parse_cache_capacity(mut self, capacity: usize) -> Self {
        self.parse_cache_capacity = capacity;
        self
    }

    /// Forbids (or allows) full table scans.
    #[must_use]
    pub fn with_forbid_seq_scan(mut self, forbid: bool) -> Self {
        self.forbid_seq_scan = forbid;
        self
    }

    /// Enables (or disables) the sequential scan warning.
    #[must_use]
    pub fn with_warn_on_seq_scan(mut self, warn: bool) -> Self {
        self.warn_on_seq_scan = warn;
        self
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_schema.is_empty() {
            return Err("default_schema must not be empty".to_string());
        }

        if self
            .default_schema
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '_'))
        {
            return Err(format!(
                "default_schema '{}' is not a valid identifier",
                self.default_schema
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DatabaseConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.forbid_seq_scan);
    }

    #[test]
    fn test_builder() {
        let config = DatabaseConfig::for_testing()
            .with_parse_cache_capacity(0)
            .with_forbid_seq_scan(true);
        assert_eq!(config.parse_cache_capacity, 0);
        assert!(config.forbid_seq_scan);
        assert!(config.warn_on_seq_scan);
    }

    #[test]
    fn test_invalid_schema() {
        let config = DatabaseConfig {
            default_schema: "my schema".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"forbid_seq_scan": true}"#).unwrap();
        assert!(config.forbid_seq_scan);
        assert_eq!(config.parse_cache_capacity, DEFAULT_PARSE_CACHE_CAPACITY);
    }
}
