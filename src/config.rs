//! Validation policy and batching configuration, with file loading.

use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Format, Toml, Yaml},
    value::Value as FigmentValue,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or checking configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_batch_size must be greater than 0")]
    ZeroBatchSize,
    #[error("idle_batch_size {idle} exceeds max_batch_size {max}")]
    IdleExceedsMax { idle: usize, max: usize },
    #[error("max_batch_interval must be a finite, non-negative number of seconds, got {0}")]
    InvalidInterval(f64),
    #[error("dynamic batching is enabled but {0} is not set")]
    MissingSetting(&'static str),
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
}

/// How the sub-labels of a taxonomy relate to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyKind {
    /// Independent buckets; any 0/1 pattern is acceptable.
    #[default]
    Categorical,
    /// Ordered thresholds; once a sub-label is 1 every later one must be 1.
    Ordinal,
}

/// Checks applied on top of the baseline output contract.
///
/// The default policy declares no ordinal taxonomies and accepts scores of
/// any finite value.
///
/// # Examples
///
/// ```
/// use taxon_contract::config::{TaxonomyKind, ValidationPolicy};
///
/// let policy: ValidationPolicy = serde_json::from_str(
///     r#"{"taxonomies": {"hate_severity": "ordinal"}, "require_unit_interval": true}"#,
/// ).unwrap();
/// assert_eq!(policy.taxonomies.get("hate_severity"), Some(&TaxonomyKind::Ordinal));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationPolicy {
    /// Declared taxonomy kinds. Undeclared taxonomies are categorical.
    pub taxonomies: IndexMap<String, TaxonomyKind>,
    /// Reject confidence scores outside `[0, 1]`.
    pub require_unit_interval: bool,
}

impl ValidationPolicy {
    /// Load a policy from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(Into::into)
    }

    /// Declare `taxonomy` as ordinal.
    #[must_use]
    pub fn with_ordinal(mut self, taxonomy: impl Into<String>) -> Self {
        self.taxonomies.insert(taxonomy.into(), TaxonomyKind::Ordinal);
        self
    }
}

/// Values handed to an external batching collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchingConfig {
    /// Largest batch the collaborator may form; must be greater than zero.
    pub max_batch_size: usize,
    /// Batch size to flush at once when the collaborator is otherwise idle.
    #[serde(default)]
    pub idle_batch_size: Option<usize>,
    /// Longest time, in seconds, a request may wait for its batch to fill.
    #[serde(default)]
    pub max_batch_interval: Option<f64>,
}

impl BatchingConfig {
    /// Ensure the configuration values are within acceptable bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_batch_size` is zero, `idle_batch_size`
    /// exceeds it, or `max_batch_interval` is negative or non-finite.
    #[must_use = "Validation should not be ignored"]
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if let Some(idle) = self.idle_batch_size {
            if idle > self.max_batch_size {
                return Err(ConfigError::IdleExceedsMax {
                    idle,
                    max: self.max_batch_size,
                });
            }
        }
        if let Some(interval) = self.max_batch_interval {
            if !interval.is_finite() || interval < 0.0 {
                return Err(ConfigError::InvalidInterval(interval));
            }
        }
        Ok(self)
    }

    /// The batch wait window as a [`Duration`].
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.max_batch_interval.map(Duration::from_secs_f64)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    dynamic_batch: Option<DynamicBatchSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DynamicBatchSection {
    enable: Option<FigmentValue>,
    max_batch_size: Option<usize>,
    idle_batch_size: Option<usize>,
    max_batch_interval: Option<f64>,
}

/// Deployment settings file controlling dynamic batching.
///
/// The file is YAML:
///
/// ```yaml
/// dynamicBatch:
///   enable: true
///   maxBatchSize: 12
///   idleBatchSize: 3
///   maxBatchInterval: 0.2
/// ```
pub struct DynamicBatchSettings;

impl DynamicBatchSettings {
    /// Read the batching configuration from a settings file.
    ///
    /// Returns `Ok(None)` when the file does not exist, has no
    /// `dynamicBatch.enable`, or `enable` is anything but the boolean `true`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] for an unreadable file,
    /// [`ConfigError::MissingSetting`] when batching is enabled without
    /// `maxBatchSize`, and any [`BatchingConfig::validate`] failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<BatchingConfig>, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file; dynamic batching disabled");
            return Ok(None);
        }
        let settings: SettingsFile = Figment::new().merge(Yaml::file(path)).extract()?;
        let Some(section) = settings.dynamic_batch else {
            return Ok(None);
        };
        if !matches!(section.enable, Some(FigmentValue::Bool(_, true))) {
            return Ok(None);
        }
        let max_batch_size = section
            .max_batch_size
            .ok_or(ConfigError::MissingSetting("maxBatchSize"))?;
        let config = BatchingConfig {
            max_batch_size,
            idle_batch_size: section.idle_batch_size,
            max_batch_interval: section.max_batch_interval,
        }
        .validate()?;
        tracing::info!(
            max_batch_size = config.max_batch_size,
            idle_batch_size = ?config.idle_batch_size,
            max_batch_interval = ?config.max_batch_interval,
            "dynamic batching enabled"
        );
        Ok(Some(config))
    }
}
