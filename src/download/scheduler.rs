//! Bounded-concurrency download scheduler
//!
//! This module executes file downloads with a hard concurrency ceiling,
//! retrying transient failures with exponential backoff. Each download
//! streams its body in chunks to a `.part` file and is atomically renamed
//! into place on success, so a partially-written file is never visible
//! under its final name.

use crate::classify::FileCandidate;
use crate::download::{
    classify_error, derive_filename, resolve_collision, DownloadError, DownloadOutcome,
    RetryDecision, RetryPolicy,
};
use crate::transport::TransportSelector;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::filename::part_path as filename_part_path;

/// Settings for the download scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Destination directory for completed files
    pub download_dir: PathBuf,

    /// Hard ceiling on concurrently in-flight downloads
    pub max_concurrent_downloads: usize,

    /// Write-buffer chunk size in bytes
    pub chunk_size: usize,

    /// Maximum attempts per candidate (including the first)
    pub max_attempts: u32,

    /// Base delay for retry backoff (doubles per attempt, capped)
    pub retry_base_delay: std::time::Duration,
}

/// Executes file downloads with bounded parallelism and retry
///
/// The concurrency limit is enforced by a counting semaphore shared for
/// the whole run: a permit is acquired before each download task spawns
/// and released when the task finishes, so at no point do more than the
/// configured number of downloads hold an open connection.
pub struct DownloadScheduler {
    transports: Arc<TransportSelector>,
    policy: RetryPolicy,
    semaphore: Arc<Semaphore>,
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl DownloadScheduler {
    /// Creates a scheduler
    ///
    /// The download directory must already exist; the coordinator
    /// validates it before any network work starts.
    pub fn new(
        transports: Arc<TransportSelector>,
        config: SchedulerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1)));
        let policy = RetryPolicy::new(
            config.max_attempts,
            config.retry_base_delay,
            std::time::Duration::from_secs(32),
        );

        Self {
            transports,
            policy,
            semaphore,
            config,
            cancel,
        }
    }

    /// Downloads all candidates, returning one outcome per candidate
    ///
    /// Individual failures never abort the batch; every candidate gets an
    /// outcome. Outcomes are returned in completion order.
    pub async fn run(&self, candidates: Vec<FileCandidate>) -> Vec<DownloadOutcome> {
        let mut handles = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            if self.cancel.is_cancelled() {
                tracing::info!("Cancellation requested, skipping remaining candidates");
                break;
            }

            // Acquire a concurrency slot before spawning; this blocks the
            // scheduling loop, not in-flight downloads
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break, // semaphore closed, run is shutting down
            };

            let transports = Arc::clone(&self.transports);
            let policy = self.policy.clone();
            let config = self.config.clone();
            let cancel = self.cancel.clone();

            handles.push(tokio::spawn(async move {
                // Permit released when this task exits (RAII)
                let _permit = permit;
                download_with_retry(&transports, &candidate, &config, &policy, &cancel).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::warn!("Download task panicked: {}", e),
            }
        }

        outcomes
    }
}

/// Downloads one candidate with retry, producing its final outcome
async fn download_with_retry(
    transports: &TransportSelector,
    candidate: &FileCandidate,
    config: &SchedulerConfig,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> DownloadOutcome {
    let url_str = candidate.url.to_string();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if cancel.is_cancelled() {
            return DownloadOutcome::failed(url_str, &DownloadError::Cancelled, attempt);
        }

        tracing::debug!(url = %url_str, attempt, "attempting download");

        match attempt_download(transports, &candidate.url, config, cancel).await {
            Ok((path, bytes)) => {
                tracing::info!(url = %url_str, path = %path.display(), bytes, "download completed");
                return DownloadOutcome::succeeded(url_str, path, bytes, attempt);
            }
            Err(error) => {
                let failure_type = classify_error(&error);

                match policy.should_retry(failure_type, attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next_attempt,
                    } => {
                        tracing::info!(
                            url = %url_str,
                            attempt = next_attempt,
                            max_attempts = policy.max_attempts(),
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "retrying download"
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = cancel.cancelled() => {
                                return DownloadOutcome::failed(
                                    url_str,
                                    &DownloadError::Cancelled,
                                    attempt,
                                );
                            }
                        }
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        tracing::warn!(url = %url_str, error = %error, %reason, "download failed");
                        return DownloadOutcome::failed(url_str, &error, attempt);
                    }
                }
            }
        }
    }
}

/// Performs a single download attempt: fetch, stream to a temp file, and
/// atomically rename into place
async fn attempt_download(
    transports: &TransportSelector,
    url: &Url,
    config: &SchedulerConfig,
    cancel: &CancellationToken,
) -> Result<(PathBuf, u64), DownloadError> {
    let transport = transports
        .transport_for(url)
        .await
        .map_err(|e| DownloadError::TransportUnavailable(e.to_string()))?;

    let response = transport
        .fetch(url)
        .await
        .map_err(|e| map_request_error(url.as_str(), e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
    }

    // Derive the destination from the live response headers
    let content_disposition = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let expected_len = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let filename = derive_filename(
        url,
        content_disposition.as_deref(),
        content_type.as_deref(),
    );
    let (destination, temp, file) = claim_destination(&config.download_dir, &filename).await?;

    let result = stream_to_temp(file, response, url, &temp, config.chunk_size, cancel).await;

    let bytes_written = match result {
        Ok(bytes) => bytes,
        Err(error) => {
            // Never leave a partial file behind
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(error);
        }
    };

    // A body shorter than Content-Length means the stream was cut off
    if let Some(expected) = expected_len {
        if bytes_written != expected {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(DownloadError::Truncated {
                url: url.to_string(),
                received: bytes_written,
                expected,
            });
        }
    }

    // Atomic rename: the file only becomes visible under its final name
    // once fully written
    tokio::fs::rename(&temp, &destination)
        .await
        .map_err(|e| DownloadError::io(&destination, e))?;

    Ok((destination, bytes_written))
}

/// Claims a collision-free destination and its `.part` temp file
///
/// `create_new` makes the claim atomic: if another in-flight download
/// grabbed the same name between the collision check and the open, the
/// open fails and the next disambiguated name is tried.
async fn claim_destination(
    dir: &Path,
    filename: &str,
) -> Result<(PathBuf, PathBuf, tokio::fs::File), DownloadError> {
    loop {
        let destination = resolve_collision(dir, filename);
        let temp = filename_part_path(&destination);

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)
            .await
        {
            Ok(file) => return Ok((destination, temp, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(DownloadError::io(&temp, e)),
        }
    }
}

/// Streams a response body to the temp path in chunks
async fn stream_to_temp(
    file: tokio::fs::File,
    response: reqwest::Response,
    url: &Url,
    temp: &Path,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<u64, DownloadError> {
    let mut writer = tokio::io::BufWriter::with_capacity(chunk_size.max(1024), file);

    let mut stream = response.bytes_stream();
    let mut bytes_written = 0u64;

    while let Some(chunk_result) = stream.next().await {
        // Cancellation is observed at the chunk boundary
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let chunk = chunk_result.map_err(|e| map_request_error(url.as_str(), e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(temp, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(temp, e))?;

    Ok(bytes_written)
}

/// Maps a reqwest error to the download error taxonomy
fn map_request_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Category, DetectionMethod};
    use crate::transport::{TransportConfig, TransportSelector};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn selector() -> Arc<TransportSelector> {
        Arc::new(
            TransportSelector::new(TransportConfig {
                user_agent: "trawl-test/1.0".to_string(),
                request_timeout: Duration::from_secs(5),
                use_anonymity_transport: false,
                anonymity_proxy_port: 9050,
                anonymity_suffixes: vec![".onion".to_string()],
            })
            .unwrap(),
        )
    }

    fn candidate(url: &str) -> FileCandidate {
        FileCandidate {
            url: Url::parse(url).unwrap(),
            category: Category::Documents,
            source_page: "https://example.com/".to_string(),
            detection: DetectionMethod::Extension,
        }
    }

    fn scheduler(dir: &Path, max_attempts: u32) -> DownloadScheduler {
        DownloadScheduler::new(
            selector(),
            SchedulerConfig {
                download_dir: dir.to_path_buf(),
                max_concurrent_downloads: 4,
                chunk_size: 8192,
                max_attempts,
                retry_base_delay: Duration::from_millis(10),
            },
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_successful_download_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/report.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pdf-bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let sched = scheduler(dir.path(), 3);

        let outcomes = sched
            .run(vec![candidate(&format!("{}/report.pdf", server.uri()))])
            .await;

        assert_eq!(outcomes.len(), 1);
        let outcome = &outcomes[0];
        assert!(outcome.success, "error: {:?}", outcome.final_error);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.byte_size, 9);

        let path = outcome.local_path.as_ref().unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read(path).unwrap(), b"pdf-bytes");
    }

    #[tokio::test]
    async fn test_404_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let sched = scheduler(dir.path(), 3);

        let outcomes = sched
            .run(vec![candidate(&format!("{}/missing.pdf", server.uri()))])
            .await;

        let outcome = &outcomes[0];
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.final_error.as_deref().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_no_partial_file_left_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let sched = scheduler(dir.path(), 1);

        sched
            .run(vec![candidate(&format!("{}/gone.pdf", server.uri()))])
            .await;

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "leftover files: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_collision_gets_disambiguated_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/report.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"second".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"first").unwrap();

        let sched = scheduler(dir.path(), 3);
        let outcomes = sched
            .run(vec![candidate(&format!("{}/report.pdf", server.uri()))])
            .await;

        let outcome = &outcomes[0];
        assert!(outcome.success);
        assert_eq!(outcome.filename.as_deref(), Some("report_1.pdf"));

        // The prior download is untouched
        assert_eq!(
            std::fs::read(dir.path().join("report.pdf")).unwrap(),
            b"first"
        );
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let sched = DownloadScheduler::new(
            selector(),
            SchedulerConfig {
                download_dir: dir.path().to_path_buf(),
                max_concurrent_downloads: 2,
                chunk_size: 8192,
                max_attempts: 3,
                retry_base_delay: Duration::from_millis(10),
            },
            cancel,
        );

        let outcomes = sched
            .run(vec![candidate(&format!("{}/a.pdf", server.uri()))])
            .await;
        assert!(outcomes.is_empty());
    }
}
