// src/archive/cdx.rs
// =============================================================================
// The Wayback Machine CDX listing API: query building and response parsing.
//
// A listing request looks like:
//   GET /cdx/search/cdx?url=example.com&matchType=domain&output=json
//       &fl=original,timestamp,mimetype,statuscode,length&collapse=urlkey&page=0
//
// With output=json the body is an array of rows, the first row being a
// header naming the columns:
//   [["original","timestamp","mimetype","statuscode","length"],
//    ["http://example.com/a.pdf","20200101000000","application/pdf","200","1234"]]
//
// Without output=json the same rows come back space-delimited, one per line,
// in the order of `fl`. Both shapes are accepted.
//
// Rust concepts:
// - Option<T> for columns the archive fills with "-" (unknown status/length)
// - Iterators with peek(): look at the first row before deciding it's a header
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Columns requested from the CDX API, in order
pub const FIELDS: [&str; 5] = ["original", "timestamp", "mimetype", "statuscode", "length"];

// A single archived capture of a URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Original URL as captured
    pub url: String,
    /// 14-digit UTC capture time, YYYYMMDDhhmmss
    pub timestamp: String,
    /// HTTP status of the capture; None for revisit rows ("-")
    pub status_code: Option<u16>,
    pub mime_type: String,
    /// Compressed record length; None when the archive does not know it
    pub content_length: Option<u64>,
}

impl SnapshotRecord {
    /// Lowercase file extension of the URL path, without the dot.
    ///
    /// Query strings and fragments are ignored, as are dot-files such as
    /// `/.htaccess`. Returns None when the path has no extension.
    pub fn extension(&self) -> Option<String> {
        path_extension(&self.url)
    }

    /// Browsable Wayback URL for this capture
    pub fn archived_url(&self, content_base: &str) -> String {
        format!("{}/{}/{}", content_base.trim_end_matches('/'), self.timestamp, self.url)
    }
}

/// Raw payload URL of a capture. The `id_` flag asks for the original bytes
/// without the Wayback toolbar rewriting.
pub fn content_url(content_base: &str, timestamp: &str, url: &str) -> String {
    format!("{}/{}id_/{}", content_base.trim_end_matches('/'), timestamp, url)
}

/// Extracts the lowercase path extension from a URL (absolute or scheme-less).
pub fn path_extension(raw: &str) -> Option<String> {
    let path = match url::Url::parse(raw) {
        Ok(parsed) if parsed.has_host() => parsed.path().to_string(),
        _ => {
            // Scheme-less captures such as "example.com/files/a.pdf?x=1"
            let trimmed = raw.split(['?', '#']).next().unwrap_or("");
            let without_scheme = trimmed.split_once("://").map(|(_, rest)| rest).unwrap_or(trimmed);
            match without_scheme.split_once('/') {
                Some((_, path)) => format!("/{}", path),
                None => return None,
            }
        }
    };

    let file_name = path.rsplit('/').next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// How the CDX API should interpret the `url` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MatchType {
    /// Only this exact URL
    Exact,
    /// Every URL starting with the given prefix
    Prefix,
    /// Every URL on this host
    Host,
    /// This host and all subdomains
    #[default]
    Domain,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Prefix => "prefix",
            MatchType::Host => "host",
            MatchType::Domain => "domain",
        }
    }
}

// Parameters for one listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdxQuery {
    pub url: String,
    pub match_type: MatchType,
    /// Inclusive lower bound, 1 to 14 timestamp digits
    pub from: Option<String>,
    /// Inclusive upper bound, 1 to 14 timestamp digits
    pub to: Option<String>,
    /// Keep only one capture per normalized URL
    pub collapse_urlkey: bool,
}

impl CdxQuery {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            match_type: MatchType::default(),
            from: None,
            to: None,
            collapse_urlkey: true,
        }
    }

    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = match_type;
        self
    }

    pub fn with_range(mut self, from: Option<String>, to: Option<String>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Query parameters shared by the page-count and page requests.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("url", self.url.clone()),
            ("matchType", self.match_type.as_str().to_string()),
            ("output", "json".to_string()),
            ("fl", FIELDS.join(",")),
        ];
        if self.collapse_urlkey {
            params.push(("collapse", "urlkey".to_string()));
        }
        if let Some(from) = &self.from {
            params.push(("from", from.clone()));
        }
        if let Some(to) = &self.to {
            params.push(("to", to.clone()));
        }
        params
    }
}

// Records decoded from one listing page
#[derive(Debug, Default, PartialEq)]
pub struct ParsedPage {
    pub records: Vec<SnapshotRecord>,
    /// Rows dropped because they lacked a URL or a valid timestamp
    pub skipped: usize,
}

/// Parses a listing body in either JSON-array or space-delimited form.
pub fn parse_listing(body: &str) -> Result<ParsedPage, ErrorKind> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(ParsedPage::default());
    }

    let rows: Vec<Vec<String>> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| ErrorKind::ParseError(e.to_string()))?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.split_whitespace().map(str::to_string).collect())
            .collect()
    };

    let mut rows = rows.into_iter().peekable();

    // A header row names the columns; without one, assume FIELDS order.
    let has_header = rows
        .peek()
        .map_or(false, |first| first.iter().any(|c| c == "original") && first.iter().any(|c| c == "timestamp"));
    let columns: Vec<String> = if has_header {
        rows.next().unwrap_or_default()
    } else {
        FIELDS.iter().map(|f| f.to_string()).collect()
    };
    let position = |name: &str| columns.iter().position(|c| c == name);
    let (url_col, ts_col) = match (position("original"), position("timestamp")) {
        (Some(u), Some(t)) => (u, t),
        _ => return Err(ErrorKind::ParseError("listing header lacks original/timestamp".into())),
    };
    let mime_col = position("mimetype");
    let status_col = position("statuscode");
    let length_col = position("length");

    let mut page = ParsedPage::default();
    for row in rows {
        let cell = |col: Option<usize>| col.and_then(|i| row.get(i)).map(String::as_str);

        let url = cell(Some(url_col)).unwrap_or("");
        let timestamp = cell(Some(ts_col)).unwrap_or("");
        if url.is_empty() || !is_capture_timestamp(timestamp) {
            page.skipped += 1;
            continue;
        }

        page.records.push(SnapshotRecord {
            url: url.to_string(),
            timestamp: timestamp.to_string(),
            status_code: cell(status_col).and_then(|s| s.parse().ok()),
            mime_type: cell(mime_col).unwrap_or("unknown").to_string(),
            content_length: cell(length_col).and_then(|s| s.parse().ok()),
        });
    }

    Ok(page)
}

/// Parses the plain integer returned by `showNumPages=true`.
pub fn parse_page_count(body: &str) -> Result<u32, ErrorKind> {
    let trimmed = body.trim();
    trimmed
        .parse::<u32>()
        .map_err(|_| ErrorKind::ParseError(format!("expected a page count, got {:?}", truncate(trimmed, 40))))
}

fn is_capture_timestamp(value: &str) -> bool {
    value.len() == 14 && value.bytes().all(|b| b.is_ascii_digit())
}

fn truncate(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
