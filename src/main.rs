// src/main.rs
// =============================================================================
// Entry point of the wayback-scan CLI.
//
// What happens here:
// 1. Parse command-line arguments and set up logging
// 2. Build the shared ArchiveClient (one rate limiter for the whole run)
// 3. Run one scan per domain and print / write the results
// 4. Exit with 0 (clean), 1 (scan finished with errors) or 2 (fatal error)
//
// Ctrl-C flips a cancellation token: queued work is skipped, in-flight
// requests finish, and partial results are still reported.
//
// Rust concepts:
// - #[tokio::main]: turns `async fn main` into a real entry point
// - anyhow::Result: one error type for everything that can go wrong here
// - Arc: lets several owners share one ArchiveClient
// =============================================================================

mod archive;   // src/archive/ - HTTP access to the Wayback Machine
mod cli;       // src/cli.rs - command-line parsing
mod config;    // src/config.rs - tunables and endpoints
mod discover;  // src/discover/ - extension-filtered snapshot listing
mod error;     // src/error.rs - typed scan errors
mod pool;      // src/pool/ - bounded worker pool
mod report;    // src/report.rs - JSON/TXT report files
mod scan;      // src/scan/ - per-domain pipeline and results

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use archive::ArchiveClient;
use cli::{Cli, Commands, ScanOptions};
use scan::{normalize_domain, parse_domain_list, ScanResult};

// #[tokio::main] starts the multi-threaded runtime and runs main on it
#[tokio::main]
async fn main() {
    // run() does the real work; here we only turn its outcome into an exit code
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // {:#} prints the whole context chain ("could not read ...: No such file")
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// Logs go to stderr so `--json` output on stdout stays machine-readable.
fn init_tracing(verbose: bool) {
    let default = if verbose { "wayback_scan=debug,info" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> Result<i32> {
    // Parse CLI arguments (clap exits with usage help on bad input)
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // One stop flag for the whole run; every pool gets a clone of it
    let stop = CancellationToken::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, finishing in-flight requests");
                stop.cancel();
            }
        });
    }

    match cli.command {
        Commands::Scan { domain, options } => {
            let domain = normalize_domain(&domain)
                .with_context(|| format!("'{}' is not a usable domain", domain))?;
            handle_scan(vec![domain], &options, stop).await
        }
        Commands::Batch { file, options } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("could not read domain list {}", file.display()))?;
            let domains = parse_domain_list(&contents);
            if domains.is_empty() {
                bail!("no domains found in {}", file.display());
            }
            if !options.json {
                println!("📄 Loaded {} domain(s) from {}", domains.len(), file.display());
            }
            handle_scan(domains, &options, stop).await
        }
    }
}

// Scans each domain in turn with one shared client, so the rate limit
// holds across the whole batch.
async fn handle_scan(domains: Vec<String>, options: &ScanOptions, stop: CancellationToken) -> Result<i32> {
    let config = options.to_config();
    // Bad rate or zero workers: fail before the first request
    config.validate()?;
    let client = Arc::new(ArchiveClient::new(&config)?);

    let mut results = Vec::with_capacity(domains.len());
    for domain in domains {
        if stop.is_cancelled() {
            break;
        }

        let job = options.to_job(domain);
        if !options.json {
            println!("🔍 Scanning archived captures of {}", job.domain);
            if !job.extensions.is_empty() {
                let wanted: Vec<&str> = job.extensions.iter().collect();
                println!("🧩 Keeping extensions: {}", wanted.join(", "));
            }
        }
        // Arc::clone only bumps a reference count; the client is not copied
        let result = scan::scan_domain(Arc::clone(&client), &job, stop.clone()).await?;

        if !options.no_report {
            let written = report::write_reports(&result, &options.output, &client.endpoints().content)?;
            info!(domain = %result.domain(), files = written.len(), dir = %options.output.display(), "reports written");
        }
        if !options.json {
            print_table(&result);
        }
        results.push(result);
    }

    // JSON goes to stdout in one piece so it can be piped into jq
    if options.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.len() > 1 {
        print_batch_summary(&results);
    }

    if stop.is_cancelled() {
        error!("scan interrupted; results are partial");
    }

    // Exit code 1 lets CI tell "finished, but something failed" from success
    if results.iter().all(ScanResult::is_clean) && !stop.is_cancelled() {
        Ok(0)
    } else {
        Ok(1)
    }
}

fn print_table(result: &ScanResult) {
    if result.is_empty() {
        println!("No matching captures for {}", result.domain());
    } else {
        println!("{:<70} {:<16} {:<8}", "URL", "CAPTURED", "STATUS");
        println!("{}", "=".repeat(96));

        for record in result.records() {
            let url_display = truncate(&record.url, 67);
            let status = record
                .status_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{:<70} {:<16} {:<8}", url_display, record.timestamp, status);
        }
    }
    println!();

    if !result.errors().is_empty() {
        println!("❌ Errors:");
        for failure in result.errors() {
            println!("   {}: {}", truncate(&failure.url, 67), failure.error);
        }
        println!();
    }

    println!("📊 Summary for {}:", result.domain());
    for (ext, count) in result.counts_by_extension() {
        println!("   .{:<10} {}", ext, count);
    }
    println!("   ✅ Found: {}", result.len());
    if !result.downloads().is_empty() {
        println!("   💾 Downloaded: {}", result.downloads().len());
    }
    println!("   ❌ Errors: {}", result.errors().len());
    if result.skipped() > 0 {
        println!("   ⏹️  Skipped: {}", result.skipped());
    }
    println!();
}

fn print_batch_summary(results: &[ScanResult]) {
    let found: usize = results.iter().map(ScanResult::len).sum();
    let errors: usize = results.iter().map(|r| r.errors().len()).sum();
    let clean = results.iter().filter(|r| r.is_clean()).count();

    println!("📋 Batch: {} domain(s), {} clean, {} URL(s) found, {} error(s)", results.len(), clean, found, errors);
}

// Shortens long URLs for the table. Works on chars, not bytes, so a
// multi-byte character is never cut in half.
fn truncate(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &value[..idx]),
        None => value.to_string(),
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why println! for output but tracing for logs?
//    - println! writes the results the user asked for to stdout
//    - tracing events (info!, warn!, ...) go to stderr through the subscriber
//    - Keeping them apart means `--json > out.json` never picks up log lines
//
// 2. What is a CancellationToken?
//    - A shared flag from tokio-util that many tasks can check or wait on
//    - cancel() on any clone is seen by every other clone
//
// 3. Why std::process::exit instead of returning from main?
//    - It lets us pick the exit code (0, 1 or 2) explicitly
//    - Everything worth flushing has been printed by then
//
// 4. What does `?` do?
//    - On Err it returns early from the function with that error
//    - anyhow converts the error (io, serde_json, ...) into anyhow::Error
// -----------------------------------------------------------------------------
