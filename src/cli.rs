// src/cli.rs
// =============================================================================
// Command-line interface, defined with clap's derive API.
//
// Two subcommands share one set of scan options:
//   wayback-scan scan example.com --ext pdf,docx --verify
//   wayback-scan batch domains.txt --download --output archives
//
// Tunables (rate, workers, retries, timeout) also read WAYBACK_* environment
// variables, so a CI job can set them once instead of on every call.
//
// Rust concepts:
// - Derive macros: Parser, Subcommand and Args generate the parsing code
// - #[command(flatten)]: reuse one options struct in several subcommands
// - value_parser: plug a plain function in as a custom argument validator
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::archive::{MatchType, RetryPolicy, DEFAULT_MAX_RETRIES};
use crate::config::{ScanConfig, DEFAULT_CONCURRENCY, DEFAULT_REQUESTS_PER_SECOND, DEFAULT_TIMEOUT_SECS};
use crate::discover::ExtensionFilter;
use crate::scan::DomainJob;

// The whole CLI: global flags plus one subcommand
//
// `version` with no value makes clap use the version from Cargo.toml
#[derive(Parser, Debug)]
#[command(
    name = "wayback-scan",
    version,
    about = "Discover, verify and download archived files from the Wayback Machine",
    long_about = "wayback-scan lists every capture the Internet Archive holds for a domain, \
                  keeps the ones matching the requested file extensions, and can confirm \
                  or download them. Results are printed and written as JSON/TXT reports."
)]
pub struct Cli {
    /// Log debug output to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

// The two subcommands. Both carry the same ScanOptions, so
// `scan x --verify` and `batch f --verify` mean the same thing
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a single domain
    ///
    /// Example: wayback-scan scan example.com --ext pdf --verify
    Scan {
        /// Domain to scan (a full URL is reduced to its host)
        domain: String,

        #[command(flatten)]
        options: ScanOptions,
    },

    /// Scan every domain listed in a file, one per line
    ///
    /// Blank lines and lines starting with '#' are ignored.
    Batch {
        /// File holding the domains
        file: PathBuf,

        #[command(flatten)]
        options: ScanOptions,
    },
}

// Options shared by `scan` and `batch`
//
// #[derive(Args)] (rather than Parser) marks a group of arguments that gets
// flattened into another command
#[derive(Args, Debug, Clone)]
pub struct ScanOptions {
    /// File extensions to keep, without the dot (repeat or comma-separate)
    ///
    /// Leave empty to keep every capture.
    #[arg(short, long = "ext", value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Only captures at or after this timestamp (1-14 digits, e.g. 2015 or 20150601)
    #[arg(long, value_parser = parse_timestamp_bound)]
    pub from: Option<String>,

    /// Only captures at or before this timestamp (1-14 digits)
    #[arg(long, value_parser = parse_timestamp_bound)]
    pub to: Option<String>,

    /// How the domain is matched against archived URLs
    #[arg(long, value_enum, default_value_t = MatchType::Domain)]
    pub match_type: MatchType,

    /// Confirm each match has an available capture
    #[arg(long)]
    pub verify: bool,

    /// Download matched files into <output>/<domain>/downloads
    #[arg(long)]
    pub download: bool,

    /// Directory for reports and downloads
    #[arg(short, long, default_value = "wayback_archives")]
    pub output: PathBuf,

    /// Skip writing report files
    #[arg(long)]
    pub no_report: bool,

    /// Print results as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Maximum requests per second against the archive (fractions allowed)
    #[arg(long, env = "WAYBACK_RATE", default_value_t = DEFAULT_REQUESTS_PER_SECOND)]
    pub rate: f64,

    /// Number of concurrent verification/download workers
    #[arg(long, env = "WAYBACK_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Retries for timeouts, 429s and 5xx responses
    #[arg(long, env = "WAYBACK_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, env = "WAYBACK_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// First backoff delay in milliseconds (doubles on each retry)
    #[arg(long, env = "WAYBACK_BACKOFF_BASE_MS", default_value_t = 1000)]
    pub backoff_base_ms: u64,

    /// Longest backoff delay in seconds
    #[arg(long, env = "WAYBACK_BACKOFF_CAP_SECS", default_value_t = 30)]
    pub backoff_cap_secs: u64,
}

impl ScanOptions {
    // Network tunables -> ScanConfig. Anything without a flag keeps its default.
    pub fn to_config(&self) -> ScanConfig {
        ScanConfig {
            requests_per_second: self.rate,
            concurrency: self.concurrency,
            timeout: Duration::from_secs(self.timeout),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: Duration::from_millis(self.backoff_base_ms),
                max_delay: Duration::from_secs(self.backoff_cap_secs),
                ..RetryPolicy::default() // factor stays 2
            },
            ..ScanConfig::default()
        }
    }

    // What to scan for one domain -> DomainJob
    pub fn to_job(&self, domain: String) -> DomainJob {
        let mut job = DomainJob::new(domain)
            .with_extensions(ExtensionFilter::new(&self.extensions))
            .with_concurrency(self.concurrency)
            .with_verification(self.verify);
        job.match_type = self.match_type;
        job.from = self.from.clone();
        job.to = self.to.clone();
        if self.download {
            job = job.with_downloads(self.output.clone());
        }
        job
    }
}

// Validates --from/--to. The archive accepts any prefix of YYYYMMDDhhmmss,
// so "2015" and "201506" are both fine. clap shows the Err string to the user.
fn parse_timestamp_bound(value: &str) -> Result<String, String> {
    let value = value.trim();
    if (1..=14).contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(value.to_string())
    } else {
        Err(format!("expected 1 to 14 digits (YYYYMMDDhhmmss prefix), got '{}'", value))
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Where do the `--help` texts come from?
//    - clap turns the `///` doc comments on fields into help text
//    - The first line is the short help, the rest shows up with --help
//
// 2. How does `env = "WAYBACK_RATE"` work?
//    - It needs clap's "env" feature (see Cargo.toml)
//    - Order of precedence: command-line flag, then env var, then default
//
// 3. Why Vec<String> with value_delimiter for --ext?
//    - `-e pdf -e zip` and `--ext pdf,zip` both end up as ["pdf", "zip"]
//
// 4. What is `..RetryPolicy::default()`?
//    - Struct update syntax: fields not listed are copied from the default
// -----------------------------------------------------------------------------
