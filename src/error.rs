// src/error.rs
// =============================================================================
// Typed errors recorded by a scan.
//
// A scan never aborts on the first failure. Every failed page, verification
// or download becomes an (url, ErrorKind) entry in the ScanResult, so the
// kinds must be cheap to clone and serializable into reports.
//
// Classification:
// - Transient (retried inside ArchiveClient): timeouts, connection failures,
//   HTTP 429 and HTTP 5xx
// - Permanent (recorded immediately): other HTTP 4xx, malformed bodies,
//   missing captures, local I/O failures, panicking tasks
// - Fatal (rejected before any task runs): PoolExhausted
// =============================================================================

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request did not complete within the configured timeout
    #[error("request timed out")]
    NetworkTimeout,

    /// Connect failure or connection reset
    #[error("connection failed: {0}")]
    Connection(String),

    /// HTTP 429 from the archive
    #[error("rate limit exceeded (HTTP 429)")]
    RateLimitExceeded,

    /// HTTP 4xx other than 429
    #[error("client error (HTTP {0})")]
    ClientError(u16),

    /// HTTP 5xx
    #[error("server error (HTTP {0})")]
    ServerError(u16),

    /// Response body could not be understood
    #[error("malformed response: {0}")]
    ParseError(String),

    /// The availability API has no usable capture for the URL
    #[error("no archived capture available")]
    NotArchived,

    /// Writing a downloaded payload failed
    #[error("I/O error: {0}")]
    Io(String),

    /// A verification or download task panicked instead of returning
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// Worker pool configured with fewer than one worker
    #[error("worker pool needs at least one worker (got {0})")]
    PoolExhausted(usize),
}

impl ErrorKind {
    /// Whether ArchiveClient should try the request again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkTimeout
                | ErrorKind::Connection(_)
                | ErrorKind::RateLimitExceeded
                | ErrorKind::ServerError(_)
        )
    }

    /// Maps a non-success HTTP status onto an error kind.
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        let code = status.as_u16();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ErrorKind::RateLimitExceeded
        } else if status.is_server_error() {
            ErrorKind::ServerError(code)
        } else {
            // Anything else that isn't a success is treated as permanent.
            ErrorKind::ClientError(code)
        }
    }
}

impl ErrorKind {
    /// Classifies a failure while reading a response body.
    ///
    /// The client is built without compression support, so a body that
    /// stops early is a transport failure (reset, truncated payload), never
    /// a malformed one.
    pub fn from_body_error(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ErrorKind::NetworkTimeout
        } else {
            ErrorKind::Connection(error.to_string())
        }
    }
}

impl From<reqwest::Error> for ErrorKind {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ErrorKind::NetworkTimeout
        } else if error.is_decode() {
            ErrorKind::ParseError(error.to_string())
        } else if error.is_connect() || error.is_request() || error.is_body() {
            ErrorKind::Connection(error.to_string())
        } else if let Some(status) = error.status() {
            ErrorKind::from_status(status)
        } else {
            ErrorKind::Connection(error.to_string())
        }
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(error: std::io::Error) -> Self {
        ErrorKind::Io(error.to_string())
    }
}
