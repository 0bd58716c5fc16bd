//! Include Gardener Configuration Management
//!
//! Provides the language rule table and run defaults with support for:
//! - Built-in rules embedded in the binary (`gardener.toml`)
//! - Local config: `./gardener.toml`
//! - User config: `<config dir>/include-gardener/gardener.toml`
//! - An explicit `--config` path
//! - CLI overrides via `RunOverrides`
//!
//! The first config file found replaces the built-in language table; CLI
//! overrides are applied last.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Rules shipped with the binary.
pub const BUILTIN_RULES: &str = include_str!("../gardener.toml");

/// Language used when none is requested.
pub const DEFAULT_LANGUAGE: &str = "c";

/// Root configuration for Include Gardener.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GardenerConfig {
    /// Run defaults, overridden by CLI flags
    pub defaults: RunDefaults,

    /// Detection rules keyed by lowercase language name
    pub languages: BTreeMap<String, LanguageSettings>,
}

/// Default run parameters.
///
/// # Example TOML
///
/// ```toml
/// [defaults]
/// threads = 4
/// recursive_limit = -1
/// include_paths = ["/usr/include"]
/// exclude = ["third_party"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDefaults {
    /// Worker thread count
    pub threads: usize,

    /// Directory recursion limit (-1 = unlimited)
    pub recursive_limit: i64,

    /// Include search paths, searched in order
    pub include_paths: Vec<PathBuf>,

    /// Exclude regular expressions
    pub exclude: Vec<String>,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            threads: 2,
            recursive_limit: -1,
            include_paths: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

/// Detection rules for one language.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LanguageSettings {
    /// File extensions (without the dot) scanned for this language
    pub extensions: Vec<String>,

    /// Directive patterns, applied in order
    pub statements: Vec<StatementSettings>,

    /// Separator in references that maps to a directory separator
    /// (e.g. `"."` for dotted module paths)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_separator: Option<String>,

    /// Suffixes tried in order when probing a directory for a reference
    pub candidate_suffixes: Vec<String>,
}

/// A single directive pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatementSettings {
    /// Regular expression matched against file content (multi-line mode)
    pub pattern: String,

    /// Whether the directive is a quoted (local) or system reference
    #[serde(default)]
    pub kind: StatementKind,

    /// Capture group holding the referenced path
    #[serde(default = "default_group")]
    pub group: usize,
}

fn default_group() -> usize {
    1
}

/// Directive form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    /// Resolved next to the including file first, then via include paths
    #[default]
    Quoted,
    /// Resolved via include paths only
    System,
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quoted => write!(f, "quoted"),
            Self::System => write!(f, "system"),
        }
    }
}

/// CLI overrides for run parameters.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    /// Override worker thread count
    pub threads: Option<usize>,

    /// Override recursion limit
    pub recursive_limit: Option<i64>,

    /// Include paths appended after the configured ones
    pub include_paths: Vec<PathBuf>,

    /// Exclude patterns appended after the configured ones
    pub exclude: Vec<String>,
}

/// Fully resolved run parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub threads: usize,
    pub recursive_limit: i64,
    pub include_paths: Vec<PathBuf>,
    pub exclude: Vec<String>,
}

impl GardenerConfig {
    /// Parse the built-in rule table.
    pub fn builtin() -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(BUILTIN_RULES).map_err(ConfigError::BuiltinRules)?;
        config.normalized()
    }

    /// Lowercase language keys and check structural validity.
    pub fn normalized(self) -> Result<Self, ConfigError> {
        let mut languages = BTreeMap::new();
        for (name, settings) in self.languages {
            let key = name.to_lowercase();
            if languages.insert(key.clone(), settings).is_some() {
                return Err(ConfigError::ValidationError(format!(
                    "language '{}' is defined more than once",
                    key
                )));
            }
        }

        let config = Self {
            defaults: self.defaults,
            languages,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the rule table and run defaults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.threads == 0 {
            return Err(ConfigError::invalid_value(
                "defaults.threads",
                "at least one worker thread is required",
            ));
        }

        for (name, settings) in &self.languages {
            if settings.extensions.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "languages.{}.extensions must not be empty",
                    name
                )));
            }
            if settings.statements.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "languages.{}.statements must not be empty",
                    name
                )));
            }
            if let Some(ext) = settings.extensions.iter().find(|e| e.starts_with('.')) {
                return Err(ConfigError::invalid_value(
                    format!("languages.{}.extensions", name),
                    format!("'{}' must be given without a leading dot", ext),
                ));
            }
        }
        Ok(())
    }

    /// Apply CLI overrides over the configured defaults.
    pub fn resolve_run(&self, overrides: &RunOverrides) -> Result<RunSettings, ConfigError> {
        let threads = overrides.threads.unwrap_or(self.defaults.threads);
        if threads == 0 {
            return Err(ConfigError::invalid_value(
                "threads",
                "number of threads is set to 0, please use at least one worker thread",
            ));
        }

        let mut include_paths = self.defaults.include_paths.clone();
        include_paths.extend(overrides.include_paths.iter().cloned());

        let mut exclude = self.defaults.exclude.clone();
        exclude.extend(overrides.exclude.iter().cloned());

        Ok(RunSettings {
            threads,
            recursive_limit: overrides
                .recursive_limit
                .unwrap_or(self.defaults.recursive_limit),
            include_paths,
            exclude,
        })
    }
}
