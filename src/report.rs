// src/report.rs
// =============================================================================
// Writes a finished ScanResult to disk.
//
// Layout under the output directory:
//   <domain>/<domain>_<ext>_urls.json   full entries, newest capture first
//   <domain>/<domain>_<ext>_urls.txt    bare URLs, same order
//   <domain>/<domain>_summary.json      totals and per-extension counts
//
// Records without an extension are grouped under "noext", the same key the
// summary counts them under.
// =============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::SnapshotRecord;
use crate::scan::{ScanResult, NO_EXTENSION};

#[derive(Debug, Serialize)]
struct ReportEntry<'a> {
    url: &'a str,
    timestamp: &'a str,
    archived_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verified_timestamp: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    saved_to: Option<&'a Path>,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    domain: &'a str,
    scan_date: DateTime<Utc>,
    total_urls: usize,
    extensions: &'a BTreeMap<String, usize>,
    errors: usize,
    downloads: usize,
    skipped: usize,
}

// Writes every report file for `result` and returns the paths written.
pub fn write_reports(result: &ScanResult, output_dir: &Path, content_base: &str) -> Result<Vec<PathBuf>> {
    let domain_dir = output_dir.join(result.domain());
    fs::create_dir_all(&domain_dir)
        .with_context(|| format!("could not create {}", domain_dir.display()))?;

    let mut written = Vec::new();

    for (tag, mut records) in group_by_extension(result) {
        // Newest capture first
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.url.cmp(&b.url)));

        let entries: Vec<ReportEntry> = records
            .iter()
            .map(|record| ReportEntry {
                url: &record.url,
                timestamp: &record.timestamp,
                archived_url: record.archived_url(content_base),
                status_code: record.status_code,
                mime_type: &record.mime_type,
                content_length: record.content_length,
                verified_timestamp: result.verified_timestamp(&record.url),
                saved_to: result.downloads().get(&record.url).map(PathBuf::as_path),
            })
            .collect();

        let json_path = domain_dir.join(format!("{}_{}_urls.json", result.domain(), tag));
        write_json(&json_path, &entries)?;
        written.push(json_path);

        let txt_path = domain_dir.join(format!("{}_{}_urls.txt", result.domain(), tag));
        let mut listing = String::new();
        for record in &records {
            listing.push_str(&record.url);
            listing.push('\n');
        }
        fs::write(&txt_path, listing)
            .with_context(|| format!("could not write {}", txt_path.display()))?;
        written.push(txt_path);
    }

    let summary = Summary {
        domain: result.domain(),
        scan_date: Utc::now(),
        total_urls: result.len(),
        extensions: result.counts_by_extension(),
        errors: result.errors().len(),
        downloads: result.downloads().len(),
        skipped: result.skipped(),
    };
    let summary_path = domain_dir.join(format!("{}_summary.json", result.domain()));
    write_json(&summary_path, &summary)?;
    written.push(summary_path);

    Ok(written)
}

fn group_by_extension(result: &ScanResult) -> BTreeMap<String, Vec<&SnapshotRecord>> {
    let mut groups: BTreeMap<String, Vec<&SnapshotRecord>> = BTreeMap::new();
    for record in result.records() {
        let tag = record
            .extension()
            .unwrap_or_else(|| NO_EXTENSION.to_string());
        groups.entry(tag).or_default().push(record);
    }
    groups
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("could not write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn record(url: &str, timestamp: &str) -> SnapshotRecord {
        SnapshotRecord {
            url: url.to_string(),
            timestamp: timestamp.to_string(),
            status_code: Some(200),
            mime_type: "application/pdf".to_string(),
            content_length: Some(42),
        }
    }

    #[test]
    fn test_writes_extension_files_and_summary() {
        let mut result = ScanResult::new("example.com");
        result.insert_record(record("http://example.com/old.pdf", "20100101000000"));
        result.insert_record(record("http://example.com/new.pdf", "20200101000000"));
        result.insert_record(record("http://example.com/about", "20150101000000"));
        result.record_error("http://example.com/broken.pdf", ErrorKind::NotArchived);

        let out = tempfile::tempdir().unwrap();
        let written = write_reports(&result, out.path(), "https://web.archive.org/web").unwrap();
        assert_eq!(written.len(), 5);

        let domain_dir = out.path().join("example.com");
        let txt = fs::read_to_string(domain_dir.join("example.com_pdf_urls.txt")).unwrap();
        assert_eq!(txt, "http://example.com/new.pdf\nhttp://example.com/old.pdf\n");

        let json: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(domain_dir.join("example.com_pdf_urls.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(
            json[0]["archived_url"],
            "https://web.archive.org/web/20200101000000/http://example.com/new.pdf"
        );

        assert!(domain_dir.join("example.com_noext_urls.txt").exists());

        let summary: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(domain_dir.join("example.com_summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["total_urls"], 3);
        assert_eq!(summary["extensions"]["pdf"], 2);
        assert_eq!(summary["errors"], 1);
    }

    #[test]
    fn test_summary_keys_match_report_files() {
        let mut result = ScanResult::new("example.com");
        result.insert_record(record("http://example.com/a.zip", "20200101000000"));
        result.insert_record(record("http://example.com/contact", "20200101000000"));

        let out = tempfile::tempdir().unwrap();
        write_reports(&result, out.path(), "https://web.archive.org/web").unwrap();

        let domain_dir = out.path().join("example.com");
        let summary: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(domain_dir.join("example.com_summary.json")).unwrap(),
        )
        .unwrap();

        let tags: Vec<&String> = summary["extensions"].as_object().unwrap().keys().collect();
        assert_eq!(tags, vec!["noext", "zip"]);
        for tag in tags {
            assert!(domain_dir.join(format!("example.com_{}_urls.json", tag)).exists());
        }
    }

    #[test]
    fn test_empty_result_still_gets_summary() {
        let result = ScanResult::new("example.org");
        let out = tempfile::tempdir().unwrap();

        let written = write_reports(&result, out.path(), "https://web.archive.org/web").unwrap();

        assert_eq!(written, vec![out.path().join("example.org").join("example.org_summary.json")]);
    }
}
