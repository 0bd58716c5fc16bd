//! Directive Parser
//!
//! Extracts include/import directives from one file using its language's
//! [`DetectionRuleSet`], resolves every reference to a file on disk (or to an
//! unresolved placeholder) and records the resulting edges in the shared
//! [`DependencyGraph`].
//!
//! Resolution order:
//! - quoted references: the including file's directory, then each include
//!   path in configured order
//! - system references: each include path in configured order
//!
//! The first candidate that exists as a regular file wins and is
//! canonicalized. Nothing matching means the reference stays unresolved and
//! is keyed by its literal text.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::graph::{DependencyGraph, NodeKind};
use crate::rules::{DetectionRuleSet, DirectiveKind};

/// Errors that make a single file unusable. The scan continues without it.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to canonicalize {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A directive found in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Referenced path as written
    pub reference: String,
    /// Quoted or system form
    pub kind: DirectiveKind,
    /// 1-based line of the reference
    pub line: usize,
    /// Full matched statement, trimmed
    pub statement: String,
}

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Canonical path of the file that was found
    Found(PathBuf),
    /// Literal reference that could not be located
    Unresolved(String),
}

/// Node key of a filesystem path.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Apply every statement of `rules`, in order, to `content`.
pub fn extract_directives(content: &str, rules: &DetectionRuleSet) -> Vec<Directive> {
    let line_starts = line_starts(content);
    let mut directives = Vec::new();

    for stmt in &rules.statements {
        for caps in stmt.pattern.captures_iter(content) {
            let (Some(whole), Some(reference)) = (caps.get(0), caps.get(stmt.group)) else {
                continue;
            };
            let text = reference.as_str().trim();
            if text.is_empty() {
                continue;
            }

            directives.push(Directive {
                reference: text.to_string(),
                kind: stmt.kind,
                line: line_at(&line_starts, reference.start()),
                statement: whole.as_str().trim().to_string(),
            });
        }
    }

    directives
}

/// Byte offsets at which each line starts.
fn line_starts(content: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(content.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

/// 1-based line number of a byte offset.
fn line_at(line_starts: &[usize], offset: usize) -> usize {
    line_starts.partition_point(|&start| start <= offset)
}

/// Canonical path of `path` if it names a regular file.
fn existing_file(path: &Path) -> Option<PathBuf> {
    if !path.is_file() {
        return None;
    }
    match path.canonicalize() {
        Ok(canonical) => Some(canonical),
        Err(e) => {
            debug!("Cannot canonicalize {}: {}", path.display(), e);
            None
        }
    }
}

/// Resolve a reference against the including directory and the include paths.
///
/// An absolute reference is tried as-is first, whatever its directive kind.
pub fn resolve_reference(
    reference: &str,
    kind: DirectiveKind,
    including_dir: Option<&Path>,
    include_paths: &[PathBuf],
    rules: &DetectionRuleSet,
) -> Resolution {
    let candidates = rules.candidates(reference);

    if Path::new(reference).is_absolute() {
        for candidate in &candidates {
            if let Some(found) = existing_file(Path::new(candidate)) {
                return Resolution::Found(found);
            }
        }
    }

    let local = match kind {
        DirectiveKind::Quoted => including_dir,
        DirectiveKind::System => None,
    };
    for dir in local
        .into_iter()
        .chain(include_paths.iter().map(PathBuf::as_path))
    {
        for candidate in &candidates {
            if let Some(found) = existing_file(&dir.join(candidate)) {
                return Resolution::Found(found);
            }
        }
    }

    Resolution::Unresolved(reference.to_string())
}

/// Parses files of one language into a shared graph.
#[derive(Debug, Clone)]
pub struct IncludeParser {
    language: String,
    rules: Arc<DetectionRuleSet>,
    include_paths: Arc<[PathBuf]>,
    graph: Arc<DependencyGraph>,
}

impl IncludeParser {
    pub fn new(
        language: impl Into<String>,
        rules: Arc<DetectionRuleSet>,
        include_paths: Vec<PathBuf>,
        graph: Arc<DependencyGraph>,
    ) -> Self {
        Self {
            language: language.into(),
            rules,
            include_paths: include_paths.into(),
            graph,
        }
    }

    /// Read, parse and record one file. Returns the number of directives recorded.
    pub fn parse_file(&self, path: &Path) -> Result<usize, ParseError> {
        let canonical = path.canonicalize().map_err(|source| ParseError::Canonicalize {
            path: path.to_path_buf(),
            source,
        })?;
        let content = std::fs::read_to_string(&canonical).map_err(|source| ParseError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(self.parse_content(&canonical, &content))
    }

    /// Record the directives of already-read content.
    ///
    /// `canonical` must be the canonical path of the file the content came from.
    pub fn parse_content(&self, canonical: &Path, content: &str) -> usize {
        let source_key = path_key(canonical);
        self.graph
            .get_or_create_node(&source_key, NodeKind::resolved(&self.language));

        let including_dir = canonical.parent();
        let directives = extract_directives(content, &self.rules);

        for directive in &directives {
            let resolution = resolve_reference(
                &directive.reference,
                directive.kind,
                including_dir,
                &self.include_paths,
                &self.rules,
            );

            let (target_key, target_kind) = match resolution {
                Resolution::Found(path) => (path_key(&path), NodeKind::resolved(&self.language)),
                Resolution::Unresolved(literal) => (literal, NodeKind::Unresolved),
            };

            trace!(
                "{}:{} -> {} ({})",
                source_key,
                directive.line,
                target_key,
                directive.kind.as_str()
            );

            self.graph.record_include(
                &source_key,
                NodeKind::resolved(&self.language),
                &target_key,
                target_kind,
                &directive.statement,
                directive.line,
            );
        }

        directives.len()
    }
}
