//! Coordinator configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is a valid
//! configuration.

use crate::error::ConfigError;
use crate::ids::DatasetId;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Disclosure gate thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Held snapshots needed before the gate opens on its own
    pub open_threshold: usize,
    /// Held snapshots at which the "results are plentiful" hint turns on
    pub hint_threshold: usize,
    /// Open early when two held snapshots differ in adjacency by at least this
    pub divergence_threshold: Option<i64>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            open_threshold: 2,
            hint_threshold: 4,
            divergence_threshold: None,
        }
    }
}

/// Top-level coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Dataset the session works on
    pub dataset_id: DatasetId,
    /// Capacity of the alternative buffer
    pub buffer_capacity: usize,
    /// Gate thresholds
    pub gate: GateConfig,
    /// Keep pinned placements across re-solves
    pub must_fix: bool,
    /// Elapsed-time tick period
    pub tick_interval_ms: u64,
    /// Maximum queued user notices
    pub notice_capacity: usize,
}

impl CoordinatorConfig {
    /// Default buffer capacity
    pub const DEFAULT_BUFFER_CAPACITY: usize = 12;

    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With dataset
    #[inline]
    #[must_use]
    pub fn with_dataset(mut self, dataset_id: DatasetId) -> Self {
        self.dataset_id = dataset_id;
        self
    }

    /// With buffer capacity
    #[inline]
    #[must_use]
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// With gate thresholds
    #[inline]
    #[must_use]
    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    /// With must-fix mode
    #[inline]
    #[must_use]
    pub fn with_must_fix(mut self, must_fix: bool) -> Self {
        self.must_fix = must_fix;
        self
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise as
    /// [`Self::from_toml_str`]
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&raw)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::invalid("buffer_capacity", "must be at least 1"));
        }
        if self.gate.open_threshold == 0 {
            return Err(ConfigError::invalid("gate.open_threshold", "must be at least 1"));
        }
        if self.gate.open_threshold > self.buffer_capacity {
            return Err(ConfigError::invalid(
                "gate.open_threshold",
                format!(
                    "{} exceeds buffer capacity {}",
                    self.gate.open_threshold, self.buffer_capacity
                ),
            ));
        }
        if self.gate.hint_threshold == 0 {
            return Err(ConfigError::invalid("gate.hint_threshold", "must be at least 1"));
        }
        if matches!(self.gate.divergence_threshold, Some(d) if d <= 0) {
            return Err(ConfigError::invalid(
                "gate.divergence_threshold",
                "must be positive when set",
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::invalid("tick_interval_ms", "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            dataset_id: DatasetId::default(),
            buffer_capacity: Self::DEFAULT_BUFFER_CAPACITY,
            gate: GateConfig::default(),
            must_fix: false,
            tick_interval_ms: 1000,
            notice_capacity: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn empty_toml_is_default() {
        let config = CoordinatorConfig::from_toml_str("").unwrap();
        assert_eq!(config, CoordinatorConfig::default());
        assert_eq!(config.buffer_capacity, 12);
        assert_eq!(config.gate.open_threshold, 2);
        assert_eq!(config.gate.hint_threshold, 4);
    }

    #[test]
    fn partial_toml_overrides() {
        let config = CoordinatorConfig::from_toml_str(
            r#"
            dataset_id = "spring-term"
            must_fix = true

            [gate]
            divergence_threshold = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.dataset_id, DatasetId::new("spring-term"));
        assert!(config.must_fix);
        assert_eq!(config.gate.divergence_threshold, Some(3));
        assert_eq!(config.gate.open_threshold, 2);
    }

    #[test]
    fn rejects_threshold_above_capacity() {
        let err = CoordinatorConfig::from_toml_str(
            "buffer_capacity = 1\n[gate]\nopen_threshold = 2\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "gate.open_threshold", .. }
        ));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = CoordinatorConfig::new().with_buffer_capacity(0).validate();
        assert!(err.is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "buffer_capacity = 5").unwrap();
        let config = CoordinatorConfig::load_from(file.path()).unwrap();
        assert_eq!(config.buffer_capacity, 5);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = CoordinatorConfig::load_from(Path::new("/nonexistent/rota.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
