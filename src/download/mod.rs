//! Download execution module
//!
//! This module contains the bounded-concurrency download scheduler, the
//! retry policy driving its backoff behavior, and filename handling for
//! safe on-disk destinations.

mod filename;
mod retry;
mod scheduler;

pub use filename::{
    derive_filename, extension_from_content_type, parse_content_disposition, resolve_collision,
    sanitize_filename,
};
pub use retry::{classify_error, FailureType, RetryDecision, RetryPolicy};
pub use scheduler::{DownloadScheduler, SchedulerConfig};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while downloading a single file
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Network error for {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("Truncated body for {url}: received {received} of {expected} bytes")]
    Truncated {
        url: String,
        received: u64,
        expected: u64,
    },

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Anonymity transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Download cancelled")]
    Cancelled,
}

impl DownloadError {
    pub fn http_status(url: &str, status: u16) -> Self {
        Self::HttpStatus {
            url: url.to_string(),
            status,
        }
    }

    pub fn timeout(url: &str) -> Self {
        Self::Timeout {
            url: url.to_string(),
        }
    }

    pub fn network(url: &str, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.to_string(),
            source,
        }
    }

    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// The immutable record of one candidate's final download result
///
/// Written exactly once by the scheduler after all retries succeed or
/// exhaust. The delivery pipeline later attaches the content hash and any
/// integrity/sink warnings; the download verdict itself never changes.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// The file URL (normalized form)
    pub url: String,

    /// Whether the download completed
    pub success: bool,

    /// Final filename within the download directory
    pub filename: Option<String>,

    /// Full path of the downloaded file
    pub local_path: Option<PathBuf>,

    /// Size on disk in bytes
    pub byte_size: u64,

    /// Hex-encoded SHA-256 of the file content, filled by the delivery
    /// pipeline
    pub sha256: Option<String>,

    /// Number of attempts made (always >= 1)
    pub attempts: u32,

    /// Description of the final error when `success` is false
    pub final_error: Option<String>,

    /// Integrity/sink warnings that do not affect the download verdict
    pub warnings: Vec<String>,
}

impl DownloadOutcome {
    /// Creates a successful outcome
    pub fn succeeded(url: String, path: PathBuf, byte_size: u64, attempts: u32) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Self {
            url,
            success: true,
            filename,
            local_path: Some(path),
            byte_size,
            sha256: None,
            attempts,
            final_error: None,
            warnings: Vec::new(),
        }
    }

    /// Creates a failed outcome
    pub fn failed(url: String, error: &DownloadError, attempts: u32) -> Self {
        Self {
            url,
            success: false,
            filename: None,
            local_path: None,
            byte_size: 0,
            sha256: None,
            attempts: attempts.max(1),
            final_error: Some(error.to_string()),
            warnings: Vec::new(),
        }
    }
}
