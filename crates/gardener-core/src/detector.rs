//! File Detector
//!
//! Walks the process paths, filters candidates and schedules matching files
//! onto a [`WorkerPool`] whose workers run the [`IncludeParser`]. The walk drains
//! a breadth-first worklist of `(directory, depth)` pairs and remembers the
//! smallest depth each canonical directory was expanded at. A symlink cycle is
//! entered at most once, and a directory first reached through a deeper path is
//! expanded again when a shallower path to it turns up.
//!
//! [`FileDetector::run`] returns only after the queue is closed and every
//! worker has joined.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::exclude::{ExcludeError, ExcludeFilter};
use crate::graph::{DependencyGraph, IncludeGraph};
use crate::parser::IncludeParser;
use crate::pool::{PoolError, WorkerPool, QUEUE_SLOTS_PER_WORKER};
use crate::rules::DetectionRuleSet;

/// Default number of worker threads.
pub const DEFAULT_THREADS: usize = 2;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("number of threads is set to {0}, please use at least one worker thread")]
    InvalidThreadCount(usize),

    #[error("no process path given")]
    NoProcessPaths,

    #[error(transparent)]
    Exclude(#[from] ExcludeError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

pub type Result<T> = std::result::Result<T, DetectorError>;

/// How deep directory walks descend below a process path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecursionLimit {
    #[default]
    Unlimited,
    /// Number of subdirectory levels expanded; 0 scans only direct entries
    Depth(usize),
}

impl RecursionLimit {
    fn allows_descent(&self, depth: usize) -> bool {
        match self {
            RecursionLimit::Unlimited => true,
            RecursionLimit::Depth(limit) => depth < *limit,
        }
    }
}

impl From<i64> for RecursionLimit {
    fn from(value: i64) -> Self {
        usize::try_from(value).map_or(RecursionLimit::Unlimited, RecursionLimit::Depth)
    }
}

/// Run parameters of one scan.
#[derive(Debug, Clone)]
pub struct DetectorOptions {
    /// Files and directories to scan
    pub process_paths: Vec<PathBuf>,
    /// Include search paths, in lookup order
    pub include_paths: Vec<PathBuf>,
    /// Exclude patterns (regular expressions)
    pub exclude: Vec<String>,
    pub recursive_limit: RecursionLimit,
    pub threads: usize,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            process_paths: Vec::new(),
            include_paths: Vec::new(),
            exclude: Vec::new(),
            recursive_limit: RecursionLimit::Unlimited,
            threads: DEFAULT_THREADS,
        }
    }
}

/// Counters collected during a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub files_scheduled: usize,
    pub files_parsed: usize,
    pub files_failed: usize,
    pub directories_visited: usize,
    pub entries_excluded: usize,
    pub filesystem_errors: usize,
}

/// Result of a finished scan.
#[derive(Debug)]
pub struct ScanReport {
    pub graph: IncludeGraph,
    pub stats: ScanStats,
}

/// Scans process paths for files of one language.
#[derive(Debug)]
pub struct FileDetector {
    language: String,
    rules: Arc<DetectionRuleSet>,
    options: DetectorOptions,
    exclude: ExcludeFilter,
}

impl FileDetector {
    pub fn new(
        language: impl Into<String>,
        rules: Arc<DetectionRuleSet>,
        options: DetectorOptions,
    ) -> Result<Self> {
        if options.threads == 0 {
            return Err(DetectorError::InvalidThreadCount(options.threads));
        }
        if options.process_paths.is_empty() {
            return Err(DetectorError::NoProcessPaths);
        }
        let exclude = ExcludeFilter::new(&options.exclude)?;

        Ok(Self {
            language: language.into(),
            rules,
            options,
            exclude,
        })
    }

    /// Walk every process path, parse every scheduled file and return the graph.
    pub fn run(self) -> Result<ScanReport> {
        let FileDetector {
            language,
            rules,
            options,
            exclude,
        } = self;

        let graph = Arc::new(DependencyGraph::new());
        let parser = IncludeParser::new(
            language.as_str(),
            Arc::clone(&rules),
            options.include_paths.clone(),
            Arc::clone(&graph),
        );

        let parsed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let pool = {
            let parsed = Arc::clone(&parsed);
            let failed = Arc::clone(&failed);
            WorkerPool::spawn(
                options.threads,
                options.threads * QUEUE_SLOTS_PER_WORKER,
                move |path: PathBuf| match parser.parse_file(&path) {
                    Ok(count) => {
                        trace!("Parsed {} ({} directive(s))", path.display(), count);
                        parsed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        warn!("Skipping file: {}", e);
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                },
            )?
        };

        info!(
            "Scanning {} path(s) for language {} with {} worker(s)",
            options.process_paths.len(),
            language,
            pool.threads()
        );

        let mut walk = Traversal::new(&exclude, &rules, options.recursive_limit);
        for root in &options.process_paths {
            walk.process_root(root, &mut |path: PathBuf| pool.submit(path));
        }
        let mut stats = walk.stats;

        pool.close_and_join()?;
        stats.files_parsed = parsed.load(Ordering::Relaxed);
        stats.files_failed += failed.load(Ordering::Relaxed);

        let graph = match Arc::try_unwrap(graph) {
            Ok(graph) => graph.freeze(),
            Err(shared) => shared.take(),
        };

        info!(
            "Scan finished: {} file(s) parsed, {} failed, {} node(s), {} edge(s)",
            stats.files_parsed,
            stats.files_failed,
            graph.node_count(),
            graph.edge_count()
        );

        Ok(ScanReport { graph, stats })
    }
}

/// Single-threaded producer side of a scan.
struct Traversal<'a> {
    exclude: &'a ExcludeFilter,
    rules: &'a DetectionRuleSet,
    limit: RecursionLimit,
    /// Canonical directory → smallest depth it was expanded at
    visited_dirs: HashMap<PathBuf, usize>,
    seen_files: HashSet<PathBuf>,
    stats: ScanStats,
}

impl<'a> Traversal<'a> {
    fn new(exclude: &'a ExcludeFilter, rules: &'a DetectionRuleSet, limit: RecursionLimit) -> Self {
        Self {
            exclude,
            rules,
            limit,
            visited_dirs: HashMap::new(),
            seen_files: HashSet::new(),
            stats: ScanStats::default(),
        }
    }

    fn process_root(&mut self, root: &Path, submit: &mut dyn FnMut(PathBuf) -> bool) {
        if self.is_excluded(root) {
            return;
        }

        let metadata = match fs::metadata(root) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Cannot access {}: {}", root.display(), e);
                self.stats.filesystem_errors += 1;
                return;
            }
        };

        if metadata.is_dir() {
            self.walk_directory(root, submit);
        } else if metadata.is_file() {
            // Explicit files skip the extension filter
            self.schedule(root.to_path_buf(), submit);
        } else {
            debug!("Skipping {}: not a regular file or directory", root.display());
        }
    }

    fn walk_directory(&mut self, root: &Path, submit: &mut dyn FnMut(PathBuf) -> bool) {
        let mut worklist: VecDeque<(PathBuf, usize)> = VecDeque::new();
        worklist.push_back((root.to_path_buf(), 0));

        while let Some((dir, depth)) = worklist.pop_front() {
            let canonical = match dir.canonicalize() {
                Ok(canonical) => canonical,
                Err(e) => {
                    warn!("Cannot resolve directory {}: {}", dir.display(), e);
                    self.stats.filesystem_errors += 1;
                    continue;
                }
            };
            match self.visited_dirs.get(&canonical).copied() {
                None => self.stats.directories_visited += 1,
                Some(previous) if previous <= depth => {
                    debug!("Directory {} already visited", dir.display());
                    continue;
                }
                Some(previous) => {
                    debug!(
                        "Directory {} reached at depth {} (was {}), expanding again",
                        dir.display(),
                        depth,
                        previous
                    );
                }
            }
            self.visited_dirs.insert(canonical, depth);

            let mut entries = match fs::read_dir(&dir) {
                Ok(entries) => entries
                    .filter_map(|entry| match entry {
                        Ok(entry) => Some(entry.path()),
                        Err(e) => {
                            warn!("Cannot read entry in {}: {}", dir.display(), e);
                            self.stats.filesystem_errors += 1;
                            None
                        }
                    })
                    .collect::<Vec<_>>(),
                Err(e) => {
                    warn!("Cannot read directory {}: {}", dir.display(), e);
                    self.stats.filesystem_errors += 1;
                    continue;
                }
            };
            entries.sort();

            for path in entries {
                if self.is_excluded(&path) {
                    continue;
                }

                let metadata = match fs::metadata(&path) {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        warn!("Cannot access {}: {}", path.display(), e);
                        self.stats.filesystem_errors += 1;
                        continue;
                    }
                };

                if metadata.is_dir() {
                    if self.limit.allows_descent(depth) {
                        worklist.push_back((path, depth + 1));
                    } else {
                        trace!("Recursion limit reached at {}", path.display());
                    }
                } else if metadata.is_file() && self.rules.matches_extension(&path) {
                    self.schedule(path, submit);
                }
            }
        }
    }

    fn is_excluded(&mut self, path: &Path) -> bool {
        if self.exclude.is_excluded(path) {
            debug!("Excluded {}", path.display());
            self.stats.entries_excluded += 1;
            return true;
        }
        false
    }

    fn schedule(&mut self, path: PathBuf, submit: &mut dyn FnMut(PathBuf) -> bool) {
        let canonical = match path.canonicalize() {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!("Cannot resolve file {}: {}", path.display(), e);
                self.stats.filesystem_errors += 1;
                return;
            }
        };
        if !self.seen_files.insert(canonical) {
            debug!("File {} already scheduled", path.display());
            return;
        }

        trace!("Scheduling {}", path.display());
        if submit(path) {
            self.stats.files_scheduled += 1;
        } else {
            warn!("No worker left to parse files");
            self.stats.files_failed += 1;
        }
    }
}
