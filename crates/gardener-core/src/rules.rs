//! Language Rule Provider
//!
//! Compiles the textual rule table from `gardener_config` into immutable
//! per-language [`DetectionRuleSet`]s. Every directive pattern is compiled
//! exactly once here, so a malformed pattern is a configuration error raised
//! before any traversal starts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use gardener_config::{GardenerConfig, LanguageSettings, StatementKind};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Errors raised while building or querying the rule table.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Language {0} not supported")]
    UnsupportedLanguage(String),

    #[error("Invalid pattern for language {language}: '{pattern}': {source}")]
    InvalidPattern {
        language: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Pattern '{pattern}' for language {language} has no capture group {group}")]
    InvalidGroup {
        language: String,
        pattern: String,
        group: usize,
    },
}

pub type Result<T> = std::result::Result<T, RuleError>;

/// Whether a directive uses the quoted (local) or system (search-path) form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveKind {
    Quoted,
    System,
}

impl DirectiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectiveKind::Quoted => "quoted",
            DirectiveKind::System => "system",
        }
    }
}

impl From<StatementKind> for DirectiveKind {
    fn from(kind: StatementKind) -> Self {
        match kind {
            StatementKind::Quoted => DirectiveKind::Quoted,
            StatementKind::System => DirectiveKind::System,
        }
    }
}

/// A compiled directive pattern.
#[derive(Debug, Clone)]
pub struct Statement {
    /// Pattern applied to the whole file content in multi-line mode
    pub pattern: Regex,
    /// Directive form
    pub kind: DirectiveKind,
    /// Capture group holding the reference string
    pub group: usize,
}

/// Detection rules of one language.
#[derive(Debug, Clone)]
pub struct DetectionRuleSet {
    /// Recognized file extensions, without the leading dot
    pub extensions: BTreeSet<String>,
    /// Directive patterns in configured order
    pub statements: Vec<Statement>,
    /// Separator in references mapped to `/` before probing
    pub module_separator: Option<String>,
    /// Suffixes appended to a reference when probing, in order
    pub candidate_suffixes: Vec<String>,
}

impl DetectionRuleSet {
    /// Compile the settings of one language.
    pub fn compile(language: &str, settings: &LanguageSettings) -> Result<Self> {
        let statements = settings
            .statements
            .iter()
            .map(|stmt| {
                let pattern = RegexBuilder::new(&stmt.pattern)
                    .multi_line(true)
                    .build()
                    .map_err(|source| RuleError::InvalidPattern {
                        language: language.to_string(),
                        pattern: stmt.pattern.clone(),
                        source,
                    })?;

                if stmt.group >= pattern.captures_len() {
                    return Err(RuleError::InvalidGroup {
                        language: language.to_string(),
                        pattern: stmt.pattern.clone(),
                        group: stmt.group,
                    });
                }

                Ok(Statement {
                    pattern,
                    kind: stmt.kind.into(),
                    group: stmt.group,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            extensions: settings.extensions.iter().cloned().collect(),
            statements,
            module_separator: settings
                .module_separator
                .clone()
                .filter(|sep| !sep.is_empty()),
            candidate_suffixes: settings.candidate_suffixes.clone(),
        })
    }

    /// Check whether a path carries one of the recognized extensions.
    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(ext))
    }

    /// Relative candidate paths to probe for a reference, in order.
    pub fn candidates(&self, reference: &str) -> Vec<String> {
        let base = match &self.module_separator {
            Some(sep) => reference.replace(sep.as_str(), "/"),
            None => reference.to_string(),
        };

        if self.candidate_suffixes.is_empty() {
            return vec![base];
        }

        self.candidate_suffixes
            .iter()
            .map(|suffix| format!("{}{}", base, suffix))
            .collect()
    }
}

/// Immutable rule provider, loaded once before traversal.
#[derive(Debug, Clone)]
pub struct Config {
    languages: BTreeMap<String, Arc<DetectionRuleSet>>,
}

impl Config {
    /// Compile every language of the given configuration.
    pub fn from_settings(settings: &GardenerConfig) -> Result<Self> {
        let mut languages = BTreeMap::new();
        for (name, lang) in &settings.languages {
            let rules = DetectionRuleSet::compile(name, lang)?;
            debug!(
                "Compiled {} statement(s) for language {}",
                rules.statements.len(),
                name
            );
            languages.insert(name.clone(), Arc::new(rules));
        }
        Ok(Self { languages })
    }

    /// Check whether a (lowercase) language name is known.
    pub fn supports_language(&self, name: &str) -> bool {
        self.languages.contains_key(name)
    }

    /// Names of all known languages, sorted.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(|k| k.as_str())
    }

    /// Get the rule set of a language.
    pub fn get_file_detection(&self, name: &str) -> Result<Arc<DetectionRuleSet>> {
        self.languages
            .get(name)
            .cloned()
            .ok_or_else(|| RuleError::UnsupportedLanguage(name.to_string()))
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Config:")?;
        for (name, rules) in &self.languages {
            writeln!(f, "  {}:", name)?;
            let exts: Vec<&str> = rules.extensions.iter().map(|e| e.as_str()).collect();
            writeln!(f, "    extensions: {}", exts.join(", "))?;
            for stmt in &rules.statements {
                writeln!(
                    f,
                    "    {} (group {}): {}",
                    stmt.kind.as_str(),
                    stmt.group,
                    stmt.pattern.as_str()
                )?;
            }
        }
        Ok(())
    }
}
