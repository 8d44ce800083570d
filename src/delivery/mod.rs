//! Integrity hashing and delivery fan-out
//!
//! Every successful download gets a streaming SHA-256 computed over the
//! file on disk, then is offered to each configured delivery sink. Sink
//! and hashing failures are downgraded to warnings attached to the
//! outcome: a successful download never becomes a failure because a sink
//! misbehaved, and one file's sink trouble never halts the next file.

mod notify;

pub use notify::NotifySink;

use crate::download::DownloadOutcome;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Read-buffer size for streaming hash computation
const HASH_BUF_SIZE: usize = 64 * 1024;

/// Metadata handed to delivery sinks for each completed file
#[derive(Debug, Clone)]
pub struct FileMeta {
    /// Path of the file on disk
    pub path: std::path::PathBuf,

    /// Hex-encoded SHA-256 of the content (empty when hashing failed)
    pub sha256: String,

    /// The URL the file was downloaded from
    pub origin_url: String,

    /// Final filename within the download directory
    pub filename: String,
}

/// A delivery target invoked after a successful download
///
/// Implementations must not panic; any failure is returned as an error
/// string and recorded as a warning on the outcome. Sinks are invoked
/// at most once per file per run — retrying is the sink's own business.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Short name used in logs and warnings
    fn name(&self) -> &str;

    /// Delivers one file's metadata
    async fn deliver(&self, meta: &FileMeta) -> Result<(), String>;
}

/// Computes a streaming SHA-256 over a file
///
/// Reads the file in fixed-size chunks so memory use is bounded
/// regardless of file size.
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Runs the integrity and delivery pipeline over download outcomes
///
/// For each successful outcome: compute and attach the content hash,
/// then invoke every sink with the file's metadata. Failed outcomes pass
/// through untouched. Mutates outcomes in place (hash and warnings only;
/// the success verdict is never changed).
pub async fn process_outcomes(outcomes: &mut [DownloadOutcome], sinks: &[Box<dyn DeliverySink>]) {
    for outcome in outcomes.iter_mut() {
        if !outcome.success {
            continue;
        }

        let Some(path) = outcome.local_path.clone() else {
            continue;
        };

        match hash_file(&path).await {
            Ok(digest) => outcome.sha256 = Some(digest),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "integrity hash failed");
                outcome
                    .warnings
                    .push(format!("integrity hash failed: {}", e));
            }
        }

        if sinks.is_empty() {
            continue;
        }

        let meta = FileMeta {
            path: path.clone(),
            sha256: outcome.sha256.clone().unwrap_or_default(),
            origin_url: outcome.url.clone(),
            filename: outcome.filename.clone().unwrap_or_default(),
        };

        for sink in sinks {
            if let Err(reason) = sink.deliver(&meta).await {
                tracing::warn!(
                    sink = sink.name(),
                    file = %meta.filename,
                    %reason,
                    "delivery sink failed"
                );
                outcome
                    .warnings
                    .push(format!("sink '{}' failed: {}", sink.name(), reason));
            } else {
                tracing::debug!(sink = sink.name(), file = %meta.filename, "delivered");
            }
        }
    }
}
