//! Configuration store for tomo-batch.
//!
//! A run's configuration is layered as registry defaults → persisted
//! document → explicit overrides. The merged [`Configuration`] is threaded
//! through every operation as a plain value and written back to the default
//! document at the end of a successful run, which makes the last used
//! parameters the starting point of the next invocation.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

mod document;
pub mod registry;
mod value;

pub use registry::{OptionDefault, OptionSpec};
pub use value::{ConfigValue, ValueKind};

/// File name of the default document inside the home directory.
pub const CONFIG_FILE_NAME: &str = "tomo-batch.toml";

/// Environment variable that relocates the default document.
pub const CONFIG_ENV_VAR: &str = "TOMO_BATCH_CONFIG";

/// Resolved option values plus the keys explicitly cleared.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Configuration {
    values: BTreeMap<String, ConfigValue>,
    cleared: BTreeSet<String>,
}

impl Configuration {
    pub fn empty() -> Self {
        Configuration::default()
    }

    /// Every declared option at its default value.
    pub fn defaults() -> Self {
        let values = registry::OPTIONS
            .iter()
            .map(|spec| (spec.name.to_owned(), spec.default.to_value()))
            .collect();
        Configuration {
            values,
            cleared: BTreeSet::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ConfigValue::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ConfigValue::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ConfigValue::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ConfigValue::as_bool)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_cleared(&self, key: &str) -> bool {
        self.cleared.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn cleared(&self) -> impl Iterator<Item = &str> {
        self.cleared.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Apply `upper` on top of `self`, honouring the keys `upper` cleared.
    pub fn layered(&self, upper: &Configuration) -> Configuration {
        merge(self, &upper.to_overrides())
    }

    /// Express this configuration as the overrides that would reproduce it.
    pub fn to_overrides(&self) -> Overrides {
        let mut overrides = Overrides::default();
        for (key, value) in &self.values {
            overrides.set(key.clone(), value.clone());
        }
        for key in &self.cleared {
            overrides.unset(key.clone());
        }
        overrides
    }

    /// Check declared options against their kind and allowed choices.
    pub fn validate(&self) -> Result<(), ConfigValidationErrors> {
        let mut errors = Vec::new();
        for (key, value) in &self.values {
            let Some(spec) = registry::lookup(key) else {
                continue;
            };
            if value.clone().coerce(spec.kind).is_none() {
                errors.push(
                    ConfigValidationError::new(
                        None,
                        format!("expected {} (found {})", spec.kind, value.kind()),
                    )
                    .with_key(key),
                );
                continue;
            }
            if !spec.choices.is_empty() {
                let text = value.as_str().unwrap_or_default();
                if !spec.choices.contains(&text) {
                    errors.push(
                        ConfigValidationError::new(
                            None,
                            format!(
                                "invalid choice '{value}' (choose from {})",
                                spec.choices.join(", ")
                            ),
                        )
                        .with_key(key),
                    );
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigValidationErrors(errors))
        }
    }

    pub(crate) fn insert(&mut self, key: String, value: ConfigValue) {
        self.cleared.remove(&key);
        self.values.insert(key, value);
    }

    pub(crate) fn mark_cleared(&mut self, key: String) {
        self.values.remove(&key);
        self.cleared.insert(key);
    }
}

/// A single per-invocation change to the configuration.
#[derive(Clone, Debug, PartialEq)]
pub enum Override {
    Set(ConfigValue),
    /// Remove the key instead of assigning an empty value.
    Unset,
}

/// Ordered overrides; a later entry for the same key wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Overrides {
    entries: Vec<(String, Override)>,
}

impl Overrides {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> &mut Self {
        self.entries.push((key.into(), Override::Set(value.into())));
        self
    }

    pub fn unset(&mut self, key: impl Into<String>) -> &mut Self {
        self.entries.push((key.into(), Override::Unset));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Override)> {
        self.entries.iter().map(|(key, change)| (key.as_str(), change))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Apply `overrides` to `base` key by key. Keys not mentioned are untouched.
pub fn merge(base: &Configuration, overrides: &Overrides) -> Configuration {
    let mut merged = base.clone();
    for (key, change) in overrides.iter() {
        match change {
            Override::Set(value) => merged.insert(key.to_owned(), value.clone()),
            Override::Unset => merged.mark_cleared(key.to_owned()),
        }
    }
    merged
}

/// Read the document at `path`. A missing document yields an empty configuration.
pub fn load_document(path: &Path) -> Result<Configuration, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound || !path.exists() => {
            debug!(path = %path.display(), "no configuration document yet");
            return Ok(Configuration::empty());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.into(),
                source,
            })
        }
    };
    document::parse_document(&contents, path)
}

/// Atomically write `config` to `path`.
pub fn persist(config: &Configuration, path: &Path) -> Result<(), ConfigError> {
    let rendered = document::render_document(config)?;
    tomo_batch_utils::atomic_write(path, &rendered).map_err(|source| ConfigError::Persistence {
        path: path.into(),
        source,
    })
}

/// Options selecting which document a run reads and writes.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub default_path: Option<PathBuf>,
    pub override_path: Option<PathBuf>,
}

impl LoadOptions {
    pub fn with_default_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_path = Some(path.into());
        self
    }

    pub fn with_override_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.override_path = Some(path.into());
        self
    }
}

/// Where the configuration of a run was read from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigSourceKind {
    /// The sticky document that every successful run rewrites.
    Default,
    /// A `--config` document used for this run only.
    Alternate,
}

impl fmt::Display for ConfigSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfigSourceKind::Default => "default config",
            ConfigSourceKind::Alternate => "alternate config",
        };
        f.write_str(label)
    }
}

/// Loads, validates and persists the configuration document of one invocation.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    default_path: PathBuf,
    override_path: Option<PathBuf>,
}

impl ConfigStore {
    pub fn open(options: LoadOptions) -> Result<Self, ConfigError> {
        let default_path = match options.default_path {
            Some(path) => path,
            None => default_config_path()?,
        };
        let override_path = options
            .override_path
            .filter(|path| !same_path(path, &default_path));
        Ok(ConfigStore {
            default_path,
            override_path,
        })
    }

    pub fn default_path(&self) -> &Path {
        &self.default_path
    }

    /// The document this run reads.
    pub fn document_path(&self) -> &Path {
        self.override_path.as_deref().unwrap_or(&self.default_path)
    }

    pub fn source_kind(&self) -> ConfigSourceKind {
        if self.override_path.is_some() {
            ConfigSourceKind::Alternate
        } else {
            ConfigSourceKind::Default
        }
    }

    /// The document this run rewrites, if any.
    pub fn persist_target(&self) -> Option<&Path> {
        match self.source_kind() {
            ConfigSourceKind::Default => Some(&self.default_path),
            ConfigSourceKind::Alternate => None,
        }
    }

    /// Defaults layered with the document on disk.
    pub fn load(&self) -> Result<Configuration, ConfigError> {
        if let Some(path) = &self.override_path {
            if !path.exists() {
                return Err(ConfigError::OverrideNotFound { path: path.clone() });
            }
        }
        let path = self.document_path();
        let document = load_document(path)?;
        debug!(
            path = %path.display(),
            source = %self.source_kind(),
            keys = document.len(),
            "loaded configuration document"
        );
        let config = Configuration::defaults().layered(&document);
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Write `config` back to the sticky document. Returns the written path,
    /// or `None` when this run reads an alternate document.
    pub fn persist(&self, config: &Configuration) -> Result<Option<PathBuf>, ConfigError> {
        match self.persist_target() {
            Some(path) => {
                persist(config, path)?;
                debug!(path = %path.display(), "persisted configuration");
                Ok(Some(path.to_path_buf()))
            }
            None => Ok(None),
        }
    }

    /// Create a fresh defaults document; refuses to overwrite an existing one.
    pub fn init(&self) -> Result<PathBuf, ConfigError> {
        let path = self.document_path();
        if path.exists() {
            return Err(ConfigError::AlreadyExists { path: path.into() });
        }
        persist(&Configuration::defaults(), path)?;
        Ok(path.to_path_buf())
    }
}

/// `$TOMO_BATCH_CONFIG`, falling back to `$HOME/tomo-batch.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = env::var_os(CONFIG_ENV_VAR).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    env::var_os("HOME")
        .filter(|value| !value.is_empty())
        .map(|home| PathBuf::from(home).join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoDefaultPath)
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Errors surfaced while loading or persisting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot locate the default config: set TOMO_BATCH_CONFIG or HOME")]
    NoDefaultPath,
    #[error("override config {path} not found")]
    OverrideNotFound { path: PathBuf },
    #[error("failed to read config {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("configuration validation failed:\n{0}")]
    Validation(ConfigValidationErrors),
    #[error("failed to write config {path}: {source}")]
    Persistence { path: PathBuf, source: io::Error },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("{path} already exists")]
    AlreadyExists { path: PathBuf },
}

/// Container for validation failures, formatted as a bullet list.
#[derive(Debug)]
pub struct ConfigValidationErrors(pub Vec<ConfigValidationError>);

impl fmt::Display for ConfigValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, err) in self.0.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "- {err}")?;
        }
        Ok(())
    }
}

impl ConfigValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ConfigValidationError> {
        self.0.iter()
    }
}

/// Validation failure with optional provenance.
#[derive(Clone, Debug)]
pub struct ConfigValidationError {
    pub path: Option<PathBuf>,
    pub message: String,
    pub key: Option<String>,
}

impl ConfigValidationError {
    fn new(path: Option<PathBuf>, message: String) -> Self {
        ConfigValidationError {
            path,
            message,
            key: None,
        }
    }

    fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(key) = &self.key {
            write!(f, "{}: {}", key, self.message)?;
        } else {
            write!(f, "{}", self.message)?;
        }
        if let Some(path) = &self.path {
            write!(f, " ({})", path.display())?;
        }
        Ok(())
    }
}
