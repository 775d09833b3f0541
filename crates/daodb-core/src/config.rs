//! Runtime configuration.
//!
//! A `DaoConfig` is built once (in code or from JSON) and then shared read-only behind an
//! `Arc`. Nothing in daodb mutates a configuration after construction; an application that
//! wants to reload settings builds a new `DaoConfig` and hands the new `Arc` to the objects
//! it creates afterwards.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default suffix appended to a field name to form its sequence name.
pub const DEFAULT_SEQUENCE_SUFFIX: &str = "_sq";

/// Settings shared by schema registries, records and record sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaoConfig {
    /// chrono `strftime` pattern used to render date columns read from the database
    /// when a field has no own format.
    pub date_format: Option<String>,

    /// Fallback SQL conversion format for date literals when a field has no `format_sql`.
    ///
    /// A purely numeric value (`"103"`) selects `convert(datetime, ...)` rendering;
    /// anything else selects `to_date(...)`.
    pub sql_date_format: Option<String>,

    /// Render `Date` columns as `datetime` instead of `date` in generated DDL.
    pub datetime_for_date: bool,

    /// Refuse the schema-qualifier fallback in table lookups.
    pub strict_table_match: bool,

    /// Default for records: read SQL NULL into non-binary fields as the empty string.
    pub read_nulls_as_empty: bool,

    /// Suffix used by the default sequence naming rule.
    pub sequence_suffix: String,
}

impl Default for DaoConfig {
    fn default() -> Self {
        Self {
            date_format: None,
            sql_date_format: None,
            datetime_for_date: false,
            strict_table_match: false,
            read_nulls_as_empty: false,
            sequence_suffix: DEFAULT_SEQUENCE_SUFFIX.to_string(),
        }
    }
}

impl DaoConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default configuration.
    pub fn shared_default() -> Arc<DaoConfig> {
        static DEFAULT: OnceLock<Arc<DaoConfig>> = OnceLock::new();
        Arc::clone(DEFAULT.get_or_init(|| Arc::new(DaoConfig::default())))
    }

    /// Load a configuration from a JSON document; absent keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DaoConfig =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        tracing::debug!(
            strict_table_match = config.strict_table_match,
            sequence_suffix = %config.sequence_suffix,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.sequence_suffix.trim().is_empty() {
            return Err(Error::Config("sequence_suffix must not be empty".to_string()));
        }
        Ok(())
    }

    /// Set the read-side date format.
    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = Some(format.into());
        self
    }

    /// Set the SQL-side date conversion format.
    pub fn with_sql_date_format(mut self, format: impl Into<String>) -> Self {
        self.sql_date_format = Some(format.into());
        self
    }

    /// Use `datetime` for date columns in DDL.
    pub fn with_datetime_for_date(mut self, value: bool) -> Self {
        self.datetime_for_date = value;
        self
    }

    /// Enable or disable strict table-name matching.
    pub fn with_strict_table_match(mut self, value: bool) -> Self {
        self.strict_table_match = value;
        self
    }

    /// Enable or disable reading NULLs as empty strings.
    pub fn with_read_nulls_as_empty(mut self, value: bool) -> Self {
        self.read_nulls_as_empty = value;
        self
    }

    /// Set the sequence name suffix.
    pub fn with_sequence_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.sequence_suffix = suffix.into();
        self
    }

    /// Wrap into a shareable handle.
    pub fn into_shared(self) -> Arc<DaoConfig> {
        Arc::new(self)
    }
}
