//! CLI argument types and layered configuration for the `taxonc` binary.
//! Loads from CLI args, environment (prefix `TAXONC_`), and optional config
//! files.

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use ortho_config::OrthoError;
use serde::Deserialize;
use std::path::PathBuf;

use crate::config::{ConfigError, ValidationPolicy};

/// Command-line arguments for the `taxonc` binary.
///
/// Configuration values are loaded from command line arguments, environment
/// variables (prefixed with `TAXONC_`), and an optional configuration file.
///
/// # Examples
///
/// Parse flags directly:
/// ```
/// use taxon_contract::cli::TaxoncArgs;
/// use ortho_config::OrthoConfig;
///
/// let args = TaxoncArgs::load_from_iter(["taxonc", "--require-unit-interval"])
///     .expect("load args from CLI iterator");
/// assert!(args.require_unit_interval);
/// assert!(args.policy().expect("default policy").require_unit_interval);
/// ```
///
/// Load from a configuration file:
/// ```
/// use taxon_contract::cli::TaxoncArgs;
/// use ortho_config::OrthoConfig;
/// use std::io::Write;
/// use tempfile::NamedTempFile;
///
/// let mut file = NamedTempFile::new().expect("create temp file");
/// writeln!(file, "document = \"response.json\"").expect("write config");
/// let path = file.path().to_str().expect("path str");
/// let args = TaxoncArgs::load_from_iter(["taxonc", "--config-path", path])
///     .expect("load args from config path");
/// assert_eq!(args.document.as_deref(), Some(std::path::Path::new("response.json")));
/// ```
#[derive(Debug, Deserialize, ortho_config::OrthoConfig)]
#[ortho_config(prefix = "TAXONC")]
pub struct TaxoncArgs {
    /// Response document to validate. Read from stdin when absent.
    #[serde(default)]
    pub document: Option<PathBuf>,

    /// TOML file holding a [`ValidationPolicy`].
    #[serde(default)]
    pub policy: Option<PathBuf>,

    /// Reject confidence scores outside `[0, 1]` regardless of the policy file.
    #[ortho_config(default = false)]
    #[serde(default)]
    pub require_unit_interval: bool,

    /// Optional path to a configuration file.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl TaxoncArgs {
    /// Load configuration solely from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if any variable cannot be parsed.
    pub fn load_from_env() -> Result<Self, OrthoError> {
        Figment::new()
            .merge(Env::prefixed("TAXONC_"))
            .extract()
            .map_err(Into::into)
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if the file cannot be read or parsed.
    pub fn load_from_config(path: &str) -> Result<Self, OrthoError> {
        Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(Into::into)
    }

    /// Load configuration from environment variables and a file path.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if either source contains invalid values.
    pub fn load_from_env_and_config(path: &str) -> Result<Self, OrthoError> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TAXONC_"))
            .extract()
            .map_err(Into::into)
    }

    /// The validation policy these arguments select.
    ///
    /// Reads the policy file when one is given; `require_unit_interval` can
    /// only tighten it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the policy file cannot be read or
    /// parsed.
    pub fn policy(&self) -> Result<ValidationPolicy, ConfigError> {
        let mut policy = match &self.policy {
            Some(path) => ValidationPolicy::from_toml_file(path)?,
            None => ValidationPolicy::default(),
        };
        policy.require_unit_interval |= self.require_unit_interval;
        Ok(policy)
    }
}

/// Install a stderr `tracing` subscriber filtered by `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
