// src/archive/mod.rs
// =============================================================================
// Everything that talks to the Internet Archive.
//
// Submodules:
// - rate_limit: one token bucket shared by every request
// - retry: backoff schedule and Retry-After handling
// - cdx: listing query parameters and response parsing
// - client: the HTTP client tying the three together
// =============================================================================

mod cdx;
mod client;
mod rate_limit;
mod retry;

pub use cdx::{CdxQuery, MatchType, SnapshotRecord};
pub use client::{ArchiveClient, ListingError};
pub use rate_limit::period_for;
pub use retry::{RetryPolicy, DEFAULT_MAX_RETRIES};

#[cfg(test)]
pub(crate) use client::tests as testing;
