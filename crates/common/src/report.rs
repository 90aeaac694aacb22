//! Report archive
//!
//! Persists one record per completed run under a timestamp-derived id and
//! keeps a reverse-chronological index at the archive root. Layout:
//!
//! ```text
//! reports/
//!   index.json                  <- all records, newest first
//!   2026-02-19_14-32-15/
//!     meta.json                 <- the record for this run
//!     html/                     <- copied runner report bundle (optional)
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::registry::TestRegistry;

/// Sentinel duration when the runner output yielded none
pub const NO_DURATION: &str = "\u{2014}";

/// Report ids are exactly the second-precision timestamp shape. Anything
/// else is rejected before touching storage (path traversal guard).
static REPORT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2}$").expect("valid regex"));

/// Verdict for one logical test within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub id: u32,
    pub passed: bool,
    pub duration: String,
}

/// One line of a persisted report, enriched with the registry label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub id: u32,
    pub label: String,
    pub passed: bool,
    pub duration: String,
}

/// Persisted record of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub id: String,
    pub timestamp: String,
    pub all_passed: bool,
    pub total_ms: u64,
    pub has_html: bool,
    pub results: Vec<ReportEntry>,
}

/// Archive of completed runs rooted at a directory
#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
    /// Where the runner leaves its freshly generated HTML report
    html_source: PathBuf,
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>, html_source: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            html_source: html_source.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Archive one completed run. Returns the new report id.
    pub fn archive(
        &self,
        results: &[RunResult],
        total_ms: u64,
        registry: &TestRegistry,
    ) -> Result<String> {
        let now = Utc::now();
        std::fs::create_dir_all(&self.root)?;

        let id = self.next_free_id(now);
        let dir = self.root.join(&id);
        std::fs::create_dir_all(&dir)?;

        // Copy the report bundle the runner just generated, if any
        let has_html = if self.html_source.is_dir() {
            match copy_dir(&self.html_source, &dir.join("html")) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to copy report bundle: {}", e);
                    false
                }
            }
        } else {
            false
        };

        let record = ReportRecord {
            id: id.clone(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            all_passed: results.iter().all(|r| r.passed),
            total_ms,
            has_html,
            results: results
                .iter()
                .map(|r| ReportEntry {
                    id: r.id,
                    label: registry.label_for(r.id),
                    passed: r.passed,
                    duration: r.duration.clone(),
                })
                .collect(),
        };

        write_json_atomic(&dir.join("meta.json"), &record)?;

        // Prepend to the index (newest first)
        let mut index = self.list();
        index.insert(0, record);
        write_json_atomic(&self.index_path(), &index)?;

        info!("Report archived -> {}/", dir.display());
        Ok(id)
    }

    /// All archived records, newest first. A missing or corrupt index reads
    /// as empty rather than an error.
    pub fn list(&self) -> Vec<ReportRecord> {
        let Ok(bytes) = std::fs::read(self.index_path()) else {
            return Vec::new();
        };
        match serde_json::from_slice(&bytes) {
            Ok(records) => records,
            Err(e) => {
                warn!("Report index unreadable, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Delete one archived report. Returns whether anything was removed.
    ///
    /// The artifact directory and the index entry are removed independently;
    /// missing either one is not an error for the call as a whole.
    pub fn delete(&self, id: &str) -> Result<bool> {
        if !REPORT_ID_RE.is_match(id) {
            return Err(Error::InvalidReportId(id.to_string()));
        }

        let dir = self.root.join(id);
        let mut found = false;

        if dir.exists() {
            found = true;
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!("Failed to remove report dir {}: {}", dir.display(), e);
            }
        }

        let mut index = self.list();
        let before = index.len();
        index.retain(|r| r.id != id);
        if index.len() != before {
            found = true;
            write_json_atomic(&self.index_path(), &index)?;
        }

        Ok(found)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    /// Sortable, filesystem-safe id from the archive moment. When a run from
    /// the same second is already archived, advance one second until free so
    /// back-to-back runs never collide.
    fn next_free_id(&self, now: DateTime<Utc>) -> String {
        let mut candidate = now;
        loop {
            let id = candidate.format("%Y-%m-%d_%H-%M-%S").to_string();
            if !self.root.join(&id).exists() {
                return id;
            }
            candidate = candidate + Duration::seconds(1);
        }
    }
}

/// Serialize to a sibling temp file, then rename into place so readers never
/// observe a partially written document.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Recursively copy a directory tree
fn copy_dir(src: &Path, dest: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(src).into_iter().filter_map(|e| e.ok()) {
        let rel = entry
            .path()
            .strip_prefix(src)
            .unwrap_or_else(|_| entry.path());
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
