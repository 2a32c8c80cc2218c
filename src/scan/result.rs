// src/scan/result.rs
// =============================================================================
// ScanResult: everything one domain scan produced.
//
// Workers finish in any order, so results are keyed by URL rather than kept
// in arrival order. That gives deterministic output for reports and tests:
// records come out sorted by URL, errors sorted by location.
//
// Rust concepts:
// - BTreeMap: a map that keeps its keys sorted, so iteration order is stable
// - Custom serde: `serialize_with` writes the record map as a plain list
// - Moving out of a struct: merge_stage consumes the stage it folds in
// =============================================================================

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::archive::SnapshotRecord;
use crate::error::ErrorKind;
use crate::pool::TaskOutput;

/// Extension bucket for records whose URL has none. Also used as the
/// extension part of report file names, so counts and files line up.
pub const NO_EXTENSION: &str = "noext";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanError {
    /// Snapshot URL, or a listing location such as "example.com#page=2"
    pub url: String,
    pub error: ErrorKind,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    domain: String,
    #[serde(serialize_with = "serialize_values")]
    records: BTreeMap<String, SnapshotRecord>,
    counts_by_extension: BTreeMap<String, usize>,
    errors: Vec<ScanError>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    downloads: BTreeMap<String, PathBuf>,
    /// Closest available capture per verified URL
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    verified: BTreeMap<String, String>,
    /// Tasks never started because a stop was signalled
    skipped: usize,
    /// Records of the skipped tasks, kept so a stopped stage loses nothing
    #[serde(skip)]
    unprocessed: Vec<SnapshotRecord>,
}

impl ScanResult {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Adds a record, keeping only the most recent capture per URL.
    pub fn insert_record(&mut self, record: SnapshotRecord) {
        match self.records.get(&record.url) {
            Some(existing) if existing.timestamp >= record.timestamp => {}
            Some(_) => {
                self.records.insert(record.url.clone(), record);
            }
            None => {
                let bucket = record.extension().unwrap_or_else(|| NO_EXTENSION.to_string());
                *self.counts_by_extension.entry(bucket).or_insert(0) += 1;
                self.records.insert(record.url.clone(), record);
            }
        }
    }

    pub fn record_error(&mut self, url: impl Into<String>, error: ErrorKind) {
        let url = url.into();
        let at = self.errors.partition_point(|e| e.url <= url);
        self.errors.insert(at, ScanError { url, error });
    }

    pub fn record_output(&mut self, output: TaskOutput) {
        let url = output.record.url.clone();
        if let Some(timestamp) = output.closest_timestamp {
            self.verified.insert(url.clone(), timestamp);
        }
        if let Some(path) = output.saved_to {
            self.downloads.insert(url, path);
        }
        self.insert_record(output.record);
    }

    /// Counts a task that never ran and keeps its record.
    pub fn record_skipped(&mut self, record: SnapshotRecord) {
        self.skipped += 1;
        self.unprocessed.push(record);
    }

    // Folds a pool stage into this result: errors, downloads, verifications
    // and skip counts move over. The records handed back are the stage's
    // survivors plus the ones a stop left unprocessed, so the caller can feed
    // them to the next stage (or keep them as partial results).
    pub fn merge_stage(&mut self, stage: ScanResult) -> Vec<SnapshotRecord> {
        for error in stage.errors {
            self.record_error(error.url, error.error);
        }
        self.downloads.extend(stage.downloads);
        self.verified.extend(stage.verified);
        self.skipped += stage.skipped;

        let mut records: Vec<SnapshotRecord> = stage.records.into_values().collect();
        records.extend(stage.unprocessed);
        records
    }

    /// Records sorted by URL
    pub fn records(&self) -> impl Iterator<Item = &SnapshotRecord> {
        self.records.values()
    }

    pub fn into_records(self) -> Vec<SnapshotRecord> {
        self.records.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn counts_by_extension(&self) -> &BTreeMap<String, usize> {
        &self.counts_by_extension
    }

    pub fn errors(&self) -> &[ScanError] {
        &self.errors
    }

    pub fn downloads(&self) -> &BTreeMap<String, PathBuf> {
        &self.downloads
    }

    pub fn verified_timestamp(&self, url: &str) -> Option<&str> {
        self.verified.get(url).map(String::as_str)
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// True when nothing failed and nothing was skipped
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.skipped == 0
    }
}

fn serialize_values<S: Serializer>(
    records: &BTreeMap<String, SnapshotRecord>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(records.len()))?;
    for record in records.values() {
        seq.serialize_element(record)?;
    }
    seq.end()
}
