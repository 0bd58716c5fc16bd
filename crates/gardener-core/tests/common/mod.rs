//! Common test utilities for integration tests.
//!
//! Builds throwaway source trees and runs scans over them.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gardener_config::GardenerConfig;
use gardener_core::detector::{DetectorOptions, FileDetector, RecursionLimit, ScanReport};
use gardener_core::rules::{Config, DetectionRuleSet};
use tempfile::TempDir;

/// A temporary source tree.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    /// Write a file, creating parent directories.
    pub fn file(&self, relative: &str, content: &str) -> &Self {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, content).expect("Failed to write file");
        self
    }

    pub fn dir(&self, relative: &str) -> &Self {
        fs::create_dir_all(self.path(relative)).expect("Failed to create dir");
        self
    }

    /// Canonical node key of a file in the tree.
    pub fn key(&self, relative: &str) -> String {
        self.path(relative)
            .canonicalize()
            .expect("Failed to canonicalize")
            .to_string_lossy()
            .into_owned()
    }
}

pub fn rules(language: &str) -> Arc<DetectionRuleSet> {
    Config::from_settings(&GardenerConfig::builtin().expect("builtin rules"))
        .expect("rules compile")
        .get_file_detection(language)
        .expect("language supported")
}

/// Scan options over the given paths with otherwise default values.
pub fn options(process_paths: Vec<PathBuf>) -> DetectorOptions {
    DetectorOptions {
        process_paths,
        ..Default::default()
    }
}

pub fn scan(language: &str, options: DetectorOptions) -> ScanReport {
    FileDetector::new(language, rules(language), options)
        .expect("Failed to create detector")
        .run()
        .expect("Scan failed")
}

pub fn scan_c(process_paths: Vec<PathBuf>, limit: i64, threads: usize) -> ScanReport {
    scan(
        "c",
        DetectorOptions {
            recursive_limit: RecursionLimit::from(limit),
            threads,
            ..options(process_paths)
        },
    )
}
