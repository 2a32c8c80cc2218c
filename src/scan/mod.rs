// src/scan/mod.rs
// =============================================================================
// Runs one DomainJob end to end.
//
// Pipeline:
// 1. Discover: stream the domain's captures, filtered by extension. Failed
//    listing pages become error entries; the listing keeps going.
// 2. Verify (optional): a VerifyTask per URL through the WorkerPool. Only
//    URLs with an available capture move on.
// 3. Download (optional): a DownloadTask per surviving URL, fetching the
//    verified capture when there is one.
//
// A stop signal never loses discovered URLs: records whose verification or
// download was skipped stay in the result, just without a verified
// timestamp or a saved file.
//
// The scan itself only fails for configuration problems caught before any
// request is made (a pool with zero workers). Everything else ends up in
// the returned ScanResult.
// =============================================================================

mod job;
mod result;

pub use job::{normalize_domain, parse_domain_list, DomainJob};
pub use result::{ScanResult, NO_EXTENSION};

use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::archive::ArchiveClient;
use crate::discover::SnapshotDiscoverer;
use crate::error::ErrorKind;
use crate::pool::{plan_downloads, DownloadTask, VerifyTask, WorkerPool};

pub async fn scan_domain(
    client: Arc<ArchiveClient>,
    job: &DomainJob,
    stop: CancellationToken,
) -> Result<ScanResult, ErrorKind> {
    let pool = WorkerPool::new(job.max_concurrency)?.with_stop(stop.clone());
    let mut result = ScanResult::new(&job.domain);

    // Step 1: discovery, deduplicated to one capture per URL
    let mut listed = ScanResult::new(&job.domain);
    {
        let discoverer = SnapshotDiscoverer::new(&client);
        let mut snapshots = discoverer.discover(job);
        while let Some(item) = snapshots.next().await {
            match item {
                Ok(record) => listed.insert_record(record),
                Err(failure) => result.record_error(failure.location, failure.kind),
            }
            if stop.is_cancelled() {
                warn!(domain = %job.domain, "stop requested, listing cut short");
                break;
            }
        }
    }
    let mut candidates = listed.into_records();
    info!(domain = %job.domain, matches = candidates.len(), "discovery finished");

    // Step 2: verification
    if job.verify && !candidates.is_empty() {
        info!(domain = %job.domain, urls = candidates.len(), workers = pool.concurrency(), "verifying captures");
        let tasks: Vec<VerifyTask> = candidates
            .into_iter()
            .map(|record| VerifyTask::new(Arc::clone(&client), record))
            .collect();
        let stage = pool.run(&job.domain, tasks).await;
        candidates = result.merge_stage(stage);
    }

    // Step 3: downloads
    if let Some(dir) = &job.download_dir {
        if !candidates.is_empty() {
            let target = dir.join(&job.domain).join("downloads");
            info!(domain = %job.domain, files = candidates.len(), dir = %target.display(), "downloading captures");
            let tasks: Vec<DownloadTask> = plan_downloads(candidates, &target)
                .into_iter()
                .map(|(record, path)| {
                    // Fetch the capture verification settled on, if any
                    let capture = result.verified_timestamp(&record.url).map(str::to_string);
                    DownloadTask::new(Arc::clone(&client), record, path).with_capture(capture)
                })
                .collect();
            let stage = pool.run(&job.domain, tasks).await;
            candidates = result.merge_stage(stage);
        }
    }

    for record in candidates {
        result.insert_record(record);
    }

    info!(
        domain = %job.domain,
        records = result.len(),
        errors = result.errors().len(),
        skipped = result.skipped(),
        "scan finished"
    );
    Ok(result)
}
