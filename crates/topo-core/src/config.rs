//! Engine configuration

use crate::error::TopoError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use topo_model::fields::{DEFAULT_REFERENCE_DELIMITER, KIND_MODULE};
use topo_model::{KindId, OwnerId};

/// Topograph configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopoConfig {
    /// Owning-account scope used when the caller supplies none
    pub default_owner: OwnerId,
    /// Delimiter of encoded reference-id lists
    pub reference_delimiter: String,
    /// Built-in kind whose host bindings veto deletion
    pub host_bearing_kind: KindId,
    /// Bound on mainline recursion
    pub max_hierarchy_depth: usize,
    /// Per store call timeout in milliseconds
    pub store_call_timeout_ms: Option<u64>,
    /// Veto deletion of instances still referenced by other instances
    pub reject_referenced_delete: bool,
    /// Logging setup
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` env-filter directive
    pub filter: String,
    /// Emit JSON lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl TopoConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With default owner
    #[inline]
    #[must_use]
    pub fn with_default_owner(mut self, owner: impl Into<OwnerId>) -> Self {
        self.default_owner = owner.into();
        self
    }

    /// With reference delimiter
    #[inline]
    #[must_use]
    pub fn with_reference_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.reference_delimiter = delimiter.into();
        self
    }

    /// With max hierarchy depth
    #[inline]
    #[must_use]
    pub fn with_max_hierarchy_depth(mut self, depth: usize) -> Self {
        self.max_hierarchy_depth = depth;
        self
    }

    /// With per-call store timeout
    #[inline]
    #[must_use]
    pub fn with_store_call_timeout(mut self, timeout: Duration) -> Self {
        self.store_call_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// With referenced-instance deletion guard
    #[inline]
    #[must_use]
    pub fn with_reject_referenced_delete(mut self, reject: bool) -> Self {
        self.reject_referenced_delete = reject;
        self
    }

    /// Per-call store timeout
    #[must_use]
    pub fn store_call_timeout(&self) -> Option<Duration> {
        self.store_call_timeout_ms.map(Duration::from_millis)
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// `Config` when the text is not valid or fails validation
    pub fn from_toml_str(text: &str) -> Result<Self, TopoError> {
        let config: Self = toml::from_str(text).map_err(|e| TopoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `Config` when the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TopoError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TopoError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check invariants between settings
    ///
    /// # Errors
    /// `Config` when a setting is out of range
    pub fn validate(&self) -> Result<(), TopoError> {
        if self.reference_delimiter.is_empty() {
            return Err(TopoError::Config("reference_delimiter must not be empty".into()));
        }
        if self.reference_delimiter.chars().any(|c| c.is_ascii_digit() || c == '-') {
            return Err(TopoError::Config(
                "reference_delimiter must not contain digits or '-'".into(),
            ));
        }
        if self.max_hierarchy_depth == 0 {
            return Err(TopoError::Config("max_hierarchy_depth must be positive".into()));
        }
        Ok(())
    }
}

impl Default for TopoConfig {
    fn default() -> Self {
        Self {
            default_owner: OwnerId::default(),
            reference_delimiter: DEFAULT_REFERENCE_DELIMITER.to_string(),
            host_bearing_kind: KindId::new(KIND_MODULE),
            max_hierarchy_depth: 64,
            store_call_timeout_ms: None,
            reject_referenced_delete: true,
            logging: LoggingConfig::default(),
        }
    }
}
