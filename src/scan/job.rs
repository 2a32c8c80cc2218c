// src/scan/job.rs
// =============================================================================
// A DomainJob is one unit of work: every capture under a single domain,
// narrowed by extension and date range, plus what to do with the matches.
//
// Jobs are built with small `with_*` methods (a builder style), so callers
// only spell out what differs from the defaults.
// =============================================================================

use std::path::PathBuf;

use crate::archive::{CdxQuery, MatchType};
use crate::config::DEFAULT_CONCURRENCY;
use crate::discover::ExtensionFilter;

#[derive(Debug, Clone, PartialEq)]
pub struct DomainJob {
    pub domain: String,
    pub extensions: ExtensionFilter,
    pub max_concurrency: usize,
    pub match_type: MatchType,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Confirm each match against the availability API
    pub verify: bool,
    /// Save matched payloads under `<dir>/<domain>/downloads`
    pub download_dir: Option<PathBuf>,
}

impl DomainJob {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            extensions: ExtensionFilter::default(),
            max_concurrency: DEFAULT_CONCURRENCY,
            match_type: MatchType::default(),
            from: None,
            to: None,
            verify: false,
            download_dir: None,
        }
    }

    pub fn with_extensions(mut self, extensions: ExtensionFilter) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_downloads(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    pub fn query(&self) -> CdxQuery {
        CdxQuery::new(self.domain.clone())
            .with_match_type(self.match_type)
            .with_range(self.from.clone(), self.to.clone())
    }
}

// Reduces user input to a bare host the listing API accepts.
//
// "https://www.Example.com/some/path?q=1" -> "www.example.com"
// Returns None when nothing host-like is left.
pub fn normalize_domain(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .trim_start_matches("*.")
        .trim_end_matches('.')
        .to_ascii_lowercase();

    if host.is_empty() || host.chars().any(char::is_whitespace) {
        None
    } else {
        Some(host)
    }
}

// Parses a batch file: one domain per line, blank lines and '#' comments
// ignored, duplicates dropped in first-seen order.
pub fn parse_domain_list(contents: &str) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(domain) = normalize_domain(line) {
            if !domains.contains(&domain) {
                domains.push(domain);
            }
        }
    }
    domains
}
