//! Processor configuration.
//!
//! Handles loading, validating, and merging a `config.toml` file. Stock
//! defaults are serialized to a TOML table, the user file is merged on top
//! key-by-key, and the result is deserialized and validated.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [filters]
//! unknown = "ignore"        # "ignore" drops unknown filters, "reject" fails the request
//!
//! [output]
//! quality = 80              # Encode quality (1-100) when no quality() filter is given
//! # format = "webp"         # Encode format when no format() filter is given
//!
//! [request]
//! # timeout_ms = 5000       # Cancel renders that run longer than this
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse; override just the values you want:
//!
//! ```toml
//! [output]
//! format = "png"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::filters::UnknownFilterPolicy;
use crate::imaging::{OutputFormat, Quality};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Processor configuration loaded from `config.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    /// Filter dispatch settings.
    pub filters: FiltersConfig,
    /// Encode defaults.
    pub output: OutputConfig,
    /// Per-request limits.
    pub request: RequestConfig,
}

impl ProcessorConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.output.quality) {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        if self.request.timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "request.timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn quality(&self) -> Quality {
        Quality::new(self.output.quality)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.request.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FiltersConfig {
    /// What happens to filter names the dispatch table does not know.
    pub unknown: UnknownFilterPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Encode quality used when the plan has no `quality()` filter.
    pub quality: u32,
    /// Encode format used when the plan has no `format()` filter.
    /// When absent the source format is kept.
    pub format: Option<OutputFormat>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            quality: Quality::default().value(),
            format: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestConfig {
    /// Wall-clock budget per render, checked at stage boundaries.
    pub timeout_ms: Option<u64>,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ProcessorConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ProcessorConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ProcessorConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<ProcessorConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pathimg Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Filter dispatch
# ---------------------------------------------------------------------------
[filters]
# What to do with filter names that are not recognised:
#   "ignore" drops them and logs a warning
#   "reject" fails the request
unknown = "ignore"

# ---------------------------------------------------------------------------
# Encoding
# ---------------------------------------------------------------------------
[output]
# Encode quality (1 = worst, 100 = best). A quality() filter overrides it.
quality = 80

# Encode format: jpeg, png, webp, gif, tiff or avif.
# Omit to keep the source format. A format() filter overrides it.
# format = "webp"

# ---------------------------------------------------------------------------
# Requests
# ---------------------------------------------------------------------------
[request]
# Cancel a render that runs longer than this many milliseconds.
# The deadline is checked between pipeline stages.
# timeout_ms = 5000
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = ProcessorConfig::default();
        assert_eq!(config.filters.unknown, UnknownFilterPolicy::Ignore);
        assert_eq!(config.output.quality, 80);
        assert_eq!(config.output.format, None);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn parse_partial_config() {
        let config: ProcessorConfig = toml::from_str(
            r#"
[output]
format = "jpg"
"#,
        )
        .unwrap();
        assert_eq!(config.output.format, Some(OutputFormat::Jpeg));
        // Default values preserved
        assert_eq!(config.output.quality, 80);
        assert_eq!(config.filters.unknown, UnknownFilterPolicy::Ignore);
    }

    #[test]
    fn parse_reject_policy() {
        let config: ProcessorConfig = toml::from_str(
            r#"
[filters]
unknown = "reject"
"#,
        )
        .unwrap();
        assert_eq!(config.filters.unknown, UnknownFilterPolicy::Reject);
    }

    #[test]
    fn stock_config_toml_parses_to_defaults() {
        let config: ProcessorConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = ProcessorConfig::default();
        assert_eq!(config.output.quality, defaults.output.quality);
        assert_eq!(config.filters.unknown, defaults.filters.unknown);
        assert_eq!(config.output.format, defaults.output.format);
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config.output.quality, 80);
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[output]
quality = 65

[request]
timeout_ms = 250
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.quality(), Quality::new(65));
        assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.output.format, None);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[output]\nquality = 0\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str(r#"quality = 90"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"quality = 70"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("quality").unwrap().as_integer(), Some(70));
    }

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[output]
quality = 80
format = "png"
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[output]
quality = 70
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let output = merged.get("output").unwrap();
        assert_eq!(output.get("quality").unwrap().as_integer(), Some(70));
        // format preserved from base
        assert_eq!(output.get("format").unwrap().as_str(), Some("png"));
    }

    // =========================================================================
    // Unknown keys and validation
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let result: Result<ProcessorConfig, _> = toml::from_str("[output]\nqualty = 90\n");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<ProcessorConfig, _> = toml::from_str("[outptu]\nquality = 90\n");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_policy_value_rejected() {
        let result: Result<ProcessorConfig, _> = toml::from_str("[filters]\nunknown = \"maybe\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn validate_quality_bounds() {
        let mut config = ProcessorConfig::default();
        config.output.quality = 100;
        assert!(config.validate().is_ok());
        config.output.quality = 101;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quality"));
    }

    #[test]
    fn validate_zero_timeout() {
        let mut config = ProcessorConfig::default();
        config.request.timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }
}
