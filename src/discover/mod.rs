// src/discover/mod.rs
// =============================================================================
// Snapshot discovery for a domain job.
//
// Wraps ArchiveClient::list_snapshots with the job's extension filter. The
// result is still a lazy stream: pages are only requested as the consumer
// pulls, so stopping early costs nothing beyond the page already in flight.
// Listing errors pass through the filter untouched so they can be reported.
// =============================================================================

mod filter;

pub use filter::ExtensionFilter;

use futures::future;
use futures::stream::{BoxStream, StreamExt};

use crate::archive::{ArchiveClient, ListingError, SnapshotRecord};
use crate::scan::DomainJob;

pub struct SnapshotDiscoverer<'a> {
    client: &'a ArchiveClient,
}

impl<'a> SnapshotDiscoverer<'a> {
    pub fn new(client: &'a ArchiveClient) -> Self {
        Self { client }
    }

    pub fn discover(&self, job: &DomainJob) -> BoxStream<'a, Result<SnapshotRecord, ListingError>> {
        let filter = job.extensions.clone();
        self.client
            .list_snapshots(job.query())
            .filter(move |item| {
                future::ready(match item {
                    Ok(record) => filter.matches(record),
                    Err(_) => true,
                })
            })
            .boxed()
    }
}
