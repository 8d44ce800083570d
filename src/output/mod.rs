//! Run statistics, the final report, and the metadata artifact
//!
//! [`CrawlStats`] is the process-wide accumulator, mutated only through
//! its narrow synchronized API. [`CrawlReport`] is the assembled result
//! of a run: counts, per-category discovered links, and every download
//! outcome. The report serializes to the metadata JSON artifact written
//! into the download directory.

use crate::classify::Category;
use crate::download::DownloadOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Process-wide crawl statistics accumulator
///
/// All updates go through the record_* methods; the mutex keeps each
/// update O(1) so it never bottlenecks concurrent fetches.
#[derive(Debug)]
pub struct CrawlStats {
    inner: Mutex<StatsInner>,
    started: Instant,
}

#[derive(Debug, Default)]
struct StatsInner {
    urls_crawled: u64,
    crawl_errors: u64,
    files_found_by_category: BTreeMap<Category, u64>,
    files_downloaded: u64,
    downloads_failed: u64,
    bytes_downloaded: u64,
}

/// Point-in-time copy of the accumulated statistics
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub urls_crawled: u64,
    pub crawl_errors: u64,
    pub files_found: u64,
    pub files_found_by_category: BTreeMap<Category, u64>,
    pub files_downloaded: u64,
    pub downloads_failed: u64,
    pub bytes_downloaded: u64,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl Default for CrawlStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlStats {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatsInner::default()),
            started: Instant::now(),
        }
    }

    /// Records one successfully fetched page
    pub fn record_page_crawled(&self) {
        self.lock().urls_crawled += 1;
    }

    /// Records one failed page fetch
    pub fn record_crawl_error(&self) {
        self.lock().crawl_errors += 1;
    }

    /// Records one discovered file candidate
    pub fn record_file_found(&self, category: Category) {
        *self
            .lock()
            .files_found_by_category
            .entry(category)
            .or_insert(0) += 1;
    }

    /// Records one finished download
    pub fn record_download_result(&self, outcome: &DownloadOutcome) {
        let mut inner = self.lock();
        if outcome.success {
            inner.files_downloaded += 1;
            inner.bytes_downloaded += outcome.byte_size;
        } else {
            inner.downloads_failed += 1;
        }
    }

    /// Takes a snapshot of the current counters
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.lock();
        StatsSnapshot {
            urls_crawled: inner.urls_crawled,
            crawl_errors: inner.crawl_errors,
            files_found: inner.files_found_by_category.values().sum(),
            files_found_by_category: inner.files_found_by_category.clone(),
            files_downloaded: inner.files_downloaded,
            downloads_failed: inner.downloads_failed,
            bytes_downloaded: inner.bytes_downloaded,
            elapsed: self.started.elapsed(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatsInner> {
        self.inner.lock().expect("stats lock poisoned")
    }
}

/// One download result as it appears in the metadata artifact
#[derive(Debug, Clone, Serialize)]
pub struct DownloadResultEntry {
    pub url: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&DownloadOutcome> for DownloadResultEntry {
    fn from(outcome: &DownloadOutcome) -> Self {
        Self {
            url: outcome.url.clone(),
            success: outcome.success,
            filename: outcome.filename.clone(),
            size: outcome.byte_size,
            sha256: outcome.sha256.clone(),
            error: outcome.final_error.clone(),
        }
    }
}

/// Stats section of the metadata artifact
#[derive(Debug, Clone, Serialize)]
struct ArtifactStats {
    urls_crawled: u64,
    files_found: u64,
    files_downloaded: u64,
}

/// The serialized metadata artifact
#[derive(Debug, Clone, Serialize)]
struct MetadataArtifact<'a> {
    timestamp: DateTime<Utc>,
    stats: ArtifactStats,
    found_links: &'a BTreeMap<Category, Vec<String>>,
    download_results: Vec<DownloadResultEntry>,
}

/// The assembled result of a run
#[derive(Debug)]
pub struct CrawlReport {
    /// When the run finished
    pub timestamp: DateTime<Utc>,

    /// Final statistics
    pub stats: StatsSnapshot,

    /// Discovered file URLs per category
    pub found_links: BTreeMap<Category, Vec<String>>,

    /// Every download outcome, one per file candidate
    pub outcomes: Vec<DownloadOutcome>,

    /// Whether the run was cut short by cancellation
    pub cancelled: bool,
}

impl CrawlReport {
    /// Serializes the metadata artifact as pretty JSON
    pub fn to_metadata_json(&self) -> serde_json::Result<String> {
        let artifact = MetadataArtifact {
            timestamp: self.timestamp,
            stats: ArtifactStats {
                urls_crawled: self.stats.urls_crawled,
                files_found: self.stats.files_found,
                files_downloaded: self.stats.files_downloaded,
            },
            found_links: &self.found_links,
            download_results: self.outcomes.iter().map(DownloadResultEntry::from).collect(),
        };
        serde_json::to_string_pretty(&artifact)
    }

    /// Writes the metadata artifact to the given path
    pub async fn save_metadata(&self, path: &Path) -> crate::Result<()> {
        let json = self
            .to_metadata_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(path, json).await?;
        tracing::info!("Metadata written to {}", path.display());
        Ok(())
    }

    /// Logs a human-readable run summary
    pub fn log_summary(&self) {
        let stats = &self.stats;
        tracing::info!(
            "Crawl summary: {} pages crawled, {} files found, {} downloaded, {} failed, {} in {:.2}s",
            stats.urls_crawled,
            stats.files_found,
            stats.files_downloaded,
            stats.downloads_failed,
            format_size(stats.bytes_downloaded),
            stats.elapsed.as_secs_f64(),
        );

        for (category, urls) in &self.found_links {
            if !urls.is_empty() {
                tracing::info!("  {}: {} found", category, urls.len());
            }
        }

        if self.cancelled {
            tracing::warn!("Run was cancelled; results are partial");
        }
    }
}

/// Formats a byte count as a human-readable size
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} PB", size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_outcome(success: bool) -> DownloadOutcome {
        if success {
            DownloadOutcome::succeeded(
                "https://example.com/a.pdf".to_string(),
                PathBuf::from("/downloads/a.pdf"),
                100,
                1,
            )
        } else {
            let error = crate::download::DownloadError::http_status("https://example.com/b.pdf", 404);
            DownloadOutcome::failed("https://example.com/b.pdf".to_string(), &error, 1)
        }
    }

    #[test]
    fn test_stats_accumulate() {
        let stats = CrawlStats::new();
        stats.record_page_crawled();
        stats.record_page_crawled();
        stats.record_crawl_error();
        stats.record_file_found(Category::Documents);
        stats.record_file_found(Category::Documents);
        stats.record_file_found(Category::Images);
        stats.record_download_result(&sample_outcome(true));
        stats.record_download_result(&sample_outcome(false));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.urls_crawled, 2);
        assert_eq!(snapshot.crawl_errors, 1);
        assert_eq!(snapshot.files_found, 3);
        assert_eq!(
            snapshot.files_found_by_category.get(&Category::Documents),
            Some(&2)
        );
        assert_eq!(snapshot.files_downloaded, 1);
        assert_eq!(snapshot.downloads_failed, 1);
        assert_eq!(snapshot.bytes_downloaded, 100);
    }

    #[test]
    fn test_metadata_artifact_shape() {
        let stats = CrawlStats::new();
        stats.record_page_crawled();
        stats.record_file_found(Category::Documents);
        stats.record_download_result(&sample_outcome(true));

        let mut found_links = BTreeMap::new();
        found_links.insert(
            Category::Documents,
            vec!["https://example.com/a.pdf".to_string()],
        );

        let report = CrawlReport {
            timestamp: Utc::now(),
            stats: stats.snapshot(),
            found_links,
            outcomes: vec![sample_outcome(true), sample_outcome(false)],
            cancelled: false,
        };

        let json = report.to_metadata_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value["timestamp"].is_string());
        assert_eq!(value["stats"]["urls_crawled"], 1);
        assert_eq!(value["stats"]["files_found"], 1);
        assert_eq!(value["stats"]["files_downloaded"], 1);
        assert_eq!(
            value["found_links"]["documents"][0],
            "https://example.com/a.pdf"
        );
        assert_eq!(value["download_results"].as_array().unwrap().len(), 2);
        assert_eq!(value["download_results"][0]["success"], true);
        // Failed entries carry an error string, successful ones omit it
        assert!(value["download_results"][1]["error"].is_string());
        assert!(value["download_results"][0].get("error").is_none());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512.0 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[tokio::test]
    async fn test_save_metadata_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl_metadata.json");

        let report = CrawlReport {
            timestamp: Utc::now(),
            stats: CrawlStats::new().snapshot(),
            found_links: BTreeMap::new(),
            outcomes: vec![],
            cancelled: false,
        };

        report.save_metadata(&path).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"download_results\""));
    }
}
