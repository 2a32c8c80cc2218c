// src/discover/filter.rs
// =============================================================================
// Extension-based filtering of snapshot records.
//
// Extensions are compared case-insensitively and without the leading dot, so
// "PDF", ".pdf" and "pdf" all select the same records. An empty filter keeps
// everything.
// =============================================================================

use serde::Serialize;
use std::collections::BTreeSet;

use crate::archive::SnapshotRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExtensionFilter {
    extensions: BTreeSet<String>,
}

impl ExtensionFilter {
    // Normalizes each entry: trims whitespace, drops leading dots,
    // lowercases, and ignores entries that end up empty.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    pub fn matches(&self, record: &SnapshotRecord) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        match record.extension() {
            Some(ext) => self.extensions.contains(&ext),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str) -> SnapshotRecord {
        SnapshotRecord {
            url: url.to_string(),
            timestamp: "20200101000000".to_string(),
            status_code: Some(200),
            mime_type: "application/octet-stream".to_string(),
            content_length: Some(10),
        }
    }

    fn keep(filter: &ExtensionFilter, records: Vec<SnapshotRecord>) -> Vec<SnapshotRecord> {
        records.into_iter().filter(|r| filter.matches(r)).collect()
    }

    fn sample() -> Vec<SnapshotRecord> {
        vec![
            record("http://example.com/a.pdf"),
            record("http://example.com/B.PDF"),
            record("http://example.com/index.html"),
            record("http://example.com/data.zip?v=2"),
            record("http://example.com/about"),
        ]
    }

    #[test]
    fn test_normalizes_entries() {
        let filter = ExtensionFilter::new([" .PDF", "zip", "", "."]);
        assert_eq!(filter.iter().collect::<Vec<_>>(), vec!["pdf", "zip"]);
    }

    #[test]
    fn test_case_insensitive_match() {
        let filter = ExtensionFilter::new(["pdf"]);
        let kept = keep(&filter, sample());
        let urls: Vec<_> = kept.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["http://example.com/a.pdf", "http://example.com/B.PDF"]);
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let filter = ExtensionFilter::default();
        assert_eq!(keep(&filter, sample()).len(), 5);
    }

    #[test]
    fn test_filtering_is_idempotent() {
        let filters = [
            ExtensionFilter::default(),
            ExtensionFilter::new(["pdf"]),
            ExtensionFilter::new(["zip", "html"]),
            ExtensionFilter::new(["exe"]),
        ];
        for filter in filters {
            let once = keep(&filter, sample());
            let twice = keep(&filter, once.clone());
            assert_eq!(once, twice, "filter {:?} not idempotent", filter);
        }
    }
}
