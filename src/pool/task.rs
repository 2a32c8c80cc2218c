// src/pool/task.rs
// =============================================================================
// Units of work executed by the WorkerPool.
//
// Two kinds exist:
// - VerifyTask: asks the availability API whether a usable capture exists
// - DownloadTask: fetches the archived payload and writes it to disk
//
// Tasks never retry themselves; transient failures are already retried
// inside ArchiveClient, so whatever error reaches a task is final.
// =============================================================================

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::archive::{ArchiveClient, SnapshotRecord};
use crate::error::ErrorKind;

// What a successful task hands back to the pool
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    pub record: SnapshotRecord,
    /// Timestamp of the closest available capture (verification only)
    pub closest_timestamp: Option<String>,
    /// Where the payload was written (downloads only)
    pub saved_to: Option<PathBuf>,
}

impl TaskOutput {
    pub fn new(record: SnapshotRecord) -> Self {
        Self {
            record,
            closest_timestamp: None,
            saved_to: None,
        }
    }
}

// Lifecycle of a task inside the pool. Completed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

// #[async_trait] lets a trait have async methods; the pool only needs to
// know which record a task is about and how to run it
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// The snapshot this task works on. Its URL keys the outcome, and the
    /// record itself is handed back if the task is skipped.
    fn record(&self) -> &SnapshotRecord;

    async fn execute(&self) -> Result<TaskOutput, ErrorKind>;
}

pub struct VerifyTask {
    client: Arc<ArchiveClient>,
    record: SnapshotRecord,
}

impl VerifyTask {
    pub fn new(client: Arc<ArchiveClient>, record: SnapshotRecord) -> Self {
        Self { client, record }
    }
}

#[async_trait]
impl Task for VerifyTask {
    fn record(&self) -> &SnapshotRecord {
        &self.record
    }

    async fn execute(&self) -> Result<TaskOutput, ErrorKind> {
        match self.client.closest_snapshot(&self.record.url).await? {
            Some(closest) => Ok(TaskOutput {
                closest_timestamp: Some(closest.timestamp),
                ..TaskOutput::new(self.record.clone())
            }),
            None => Err(ErrorKind::NotArchived),
        }
    }
}

pub struct DownloadTask {
    client: Arc<ArchiveClient>,
    record: SnapshotRecord,
    destination: PathBuf,
    /// Capture to fetch instead of the listed one, once verification found it
    capture: Option<String>,
}

impl DownloadTask {
    pub fn new(client: Arc<ArchiveClient>, record: SnapshotRecord, destination: PathBuf) -> Self {
        Self {
            client,
            record,
            destination,
            capture: None,
        }
    }

    /// Downloads the given capture (e.g. the closest available one) rather
    /// than the timestamp from the listing.
    pub fn with_capture(mut self, timestamp: Option<String>) -> Self {
        self.capture = timestamp;
        self
    }
}

#[async_trait]
impl Task for DownloadTask {
    fn record(&self) -> &SnapshotRecord {
        &self.record
    }

    async fn execute(&self) -> Result<TaskOutput, ErrorKind> {
        let timestamp = self.capture.as_deref().unwrap_or(&self.record.timestamp);
        let content = self.client.fetch_content(&self.record.url, timestamp).await?;

        if let Some(parent) = self.destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.destination, &content.bytes).await?;

        debug!(
            url = %self.record.url,
            timestamp = %timestamp,
            path = %self.destination.display(),
            bytes = content.bytes.len(),
            content_type = content.content_type.as_deref().unwrap_or("unknown"),
            "saved archived file"
        );

        Ok(TaskOutput {
            saved_to: Some(self.destination.clone()),
            ..TaskOutput::new(self.record.clone())
        })
    }
}

// Assigns every record a distinct file name inside `dir`.
//
// The last path segment is used, with unsafe characters replaced. When two
// URLs share a name the capture timestamp is prepended, then a counter.
pub fn plan_downloads(records: Vec<SnapshotRecord>, dir: &std::path::Path) -> Vec<(SnapshotRecord, PathBuf)> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut planned = Vec::with_capacity(records.len());

    for record in records {
        let base = file_name_for(&record.url);
        let mut name = base.clone();
        if taken.contains(&name) {
            name = format!("{}_{}", record.timestamp, base);
        }
        let mut counter = 2;
        while taken.contains(&name) {
            name = format!("{}_{}_{}", record.timestamp, counter, base);
            counter += 1;
        }
        taken.insert(name.clone());
        planned.push((record, dir.join(name)));
    }

    planned
}

fn file_name_for(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or("").to_string(),
    };
    let segment = path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("");

    let cleaned: String = segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "index".to_string()
    } else {
        cleaned.to_string()
    }
}
