//! Run coordinator
//!
//! Drives frontier expansion level by level, classifies discovered links,
//! hands file candidates to the download scheduler, pipes successes
//! through the delivery pipeline, and assembles the final report.
//! Failures local to one URL never propagate to siblings; only
//! cancellation or an unusable download directory is fatal.

use crate::classify::{Classification, Classifier, DetectionMethod, FileCandidate, ProbeCache};
use crate::config::Config;
use crate::crawler::fetcher::{fetch_page, PageFetch};
use crate::crawler::frontier::{CrawlTask, Frontier};
use crate::crawler::parser::parse_html;
use crate::delivery::{process_outcomes, DeliverySink, NotifySink};
use crate::download::{DownloadScheduler, SchedulerConfig};
use crate::output::{CrawlReport, CrawlStats};
use crate::transport::{TransportConfig, TransportSelector};
use crate::url::{extract_host, matches_wildcard, normalize_url, same_site};
use crate::{Category, ConfigError, Result, TrawlError};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

/// What one page fetch reported back to the coordinator
enum PageResult {
    /// Links extracted from an HTML page (resolved against the final URL)
    Links(Vec<String>),

    /// The URL served non-HTML content of the given type
    NotHtml(String),

    /// The fetch failed
    Failed(String),
}

/// Main coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    classifier: Classifier,
    transports: Arc<TransportSelector>,
    frontier: Frontier,
    stats: Arc<CrawlStats>,
    probe_cache: ProbeCache,
    cancel: CancellationToken,
    sinks: Vec<Box<dyn DeliverySink>>,
    found_links: BTreeMap<Category, Vec<String>>,
    candidates: Vec<FileCandidate>,
}

impl Coordinator {
    /// Creates a coordinator and seeds the frontier
    ///
    /// # Errors
    ///
    /// Fails when no seed URLs are configured, a seed URL is malformed,
    /// or the HTTP client cannot be built.
    pub fn new(config: Config, cancel: CancellationToken) -> Result<Self> {
        if config.seeds.is_empty() {
            return Err(ConfigError::Validation(
                "at least one seed URL is required".to_string(),
            )
            .into());
        }

        let transports = Arc::new(TransportSelector::new(TransportConfig {
            user_agent: config.crawler.user_agent.clone(),
            request_timeout: config.crawler.request_timeout(),
            use_anonymity_transport: config.anonymity.enabled,
            anonymity_proxy_port: config.anonymity.proxy_port,
            anonymity_suffixes: config.anonymity.suffixes.clone(),
        })?);

        let classifier = Classifier::new(
            &config.filters.custom_extensions,
            &config.filters.download_endpoint_patterns,
        );

        let mut frontier = Frontier::new();

        for seed in &config.seeds {
            let normalized = normalize_url(seed)?;
            let host = extract_host(&normalized).ok_or(crate::UrlError::MissingHost)?;

            frontier.try_enqueue(CrawlTask {
                url: normalized,
                depth: 0,
                origin_host: host,
            });
        }

        let sinks = build_sinks(&config)?;

        Ok(Self {
            config: Arc::new(config),
            classifier,
            transports,
            frontier,
            stats: Arc::new(CrawlStats::new()),
            probe_cache: ProbeCache::new(),
            cancel,
            sinks,
            found_links: BTreeMap::new(),
            candidates: Vec::new(),
        })
    }

    /// Runs the full pipeline: crawl, download, deliver, report
    ///
    /// Per-URL failures are recorded in the report; the run itself only
    /// fails for an unusable download directory or when every seed URL
    /// was unreachable.
    pub async fn run(mut self) -> Result<CrawlReport> {
        let download_dir = self.prepare_download_dir().await?;

        self.crawl().await;

        if self.stats.snapshot().urls_crawled == 0 && self.candidates.is_empty() {
            return Err(TrawlError::PageFetchFailed {
                url: self.config.seeds.join(", "),
                reason: "every seed URL was unreachable".to_string(),
            });
        }

        let candidates = std::mem::take(&mut self.candidates);
        tracing::info!("Scheduling {} file downloads", candidates.len());

        let scheduler = DownloadScheduler::new(
            Arc::clone(&self.transports),
            SchedulerConfig {
                download_dir: download_dir.clone(),
                max_concurrent_downloads: self.config.crawler.max_concurrent_downloads,
                chunk_size: self.config.crawler.chunk_size,
                max_attempts: self.config.crawler.max_retries.max(1),
                retry_base_delay: std::time::Duration::from_secs(1),
            },
            self.cancel.clone(),
        );

        let mut outcomes = scheduler.run(candidates).await;

        for outcome in &outcomes {
            self.stats.record_download_result(outcome);
        }

        process_outcomes(&mut outcomes, &self.sinks).await;

        let report = CrawlReport {
            timestamp: Utc::now(),
            stats: self.stats.snapshot(),
            found_links: self.found_links,
            outcomes,
            cancelled: self.cancel.is_cancelled(),
        };

        if !self.config.output.metadata_file.trim().is_empty() {
            let metadata_path = download_dir.join(&self.config.output.metadata_file);
            if let Err(e) = report.save_metadata(&metadata_path).await {
                tracing::warn!("Failed to write metadata artifact: {}", e);
            }
        }

        report.log_summary();

        Ok(report)
    }

    /// Runs discovery only: crawl and classify, skip downloads entirely
    pub async fn discover(mut self) -> Result<BTreeMap<Category, Vec<String>>> {
        self.crawl().await;
        Ok(self.found_links)
    }

    /// Ensures the download directory exists and is writable
    async fn prepare_download_dir(&self) -> Result<PathBuf> {
        let dir = PathBuf::from(&self.config.output.download_dir);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| TrawlError::DownloadDirUnusable {
                path: dir.display().to_string(),
                source: e,
            })?;

        // Probe writability up front so the failure is fatal before any
        // network work starts
        let probe = dir.join(".trawl-write-probe");
        tokio::fs::write(&probe, b"")
            .await
            .map_err(|e| TrawlError::DownloadDirUnusable {
                path: dir.display().to_string(),
                source: e,
            })?;
        let _ = tokio::fs::remove_file(&probe).await;

        Ok(dir)
    }

    /// Expands the frontier to exhaustion (or budget/cancellation)
    async fn crawl(&mut self) {
        let started = Instant::now();
        let deadline = self.config.crawler.runtime_budget().map(|d| started + d);
        let page_budget = self.config.crawler.page_budget();
        let page_semaphore = Arc::new(Semaphore::new(self.config.crawler.max_concurrent_pages));

        let mut pages_dispatched: u64 = 0;
        eprintln!("DEBUG crawl start, queue_len={} concurrent_pages={}", self.frontier.queue_len(), self.config.crawler.max_concurrent_pages);

        while let Some((depth, mut level)) = self.frontier.pop_level() {
            eprintln!("DEBUG popped level depth={} size={}", depth, level.len());
            if self.cancel.is_cancelled() {
                tracing::info!("Cancellation requested, stopping crawl");
                break;
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    tracing::info!("Runtime budget reached, stopping crawl");
                    break;
                }
            }

            if let Some(budget) = page_budget {
                let remaining = budget.saturating_sub(pages_dispatched);
                if remaining == 0 {
                    tracing::info!("Page budget reached, stopping crawl");
                    break;
                }
                level.truncate(remaining as usize);
            }

            tracing::debug!(
                depth,
                pages = level.len(),
                queued = self.frontier.queue_len(),
                "expanding frontier level"
            );

            pages_dispatched += level.len() as u64;
            let results = self.fetch_level(&level, &page_semaphore).await;
            eprintln!("DEBUG fetch_level returned {} results", results.len());

            for (task, result) in level.iter().zip(results) {
                match result {
                    PageResult::Links(links) => {
                        self.stats.record_page_crawled();
                        self.handle_discovered_links(task, links).await;
                    }
                    PageResult::NotHtml(content_type) => {
                        // The queued page turned out to be a file; salvage
                        // it as a candidate using the live content type
                        self.stats.record_page_crawled();
                        self.handle_non_html_page(task, &content_type);
                    }
                    PageResult::Failed(reason) => {
                        tracing::warn!(url = %task.url, %reason, "page fetch failed");
                        self.stats.record_crawl_error();
                    }
                }
            }

            // Politeness delay between expansion waves
            if let Some(delay) = self.config.crawler.request_delay() {
                if !self.frontier.is_empty() && !self.cancel.is_cancelled() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        tracing::info!(
            pages = self.stats.snapshot().urls_crawled,
            candidates = self.candidates.len(),
            "crawl phase complete in {:.2}s",
            started.elapsed().as_secs_f64()
        );
    }

    /// Fetches one frontier level concurrently under the page semaphore
    ///
    /// Results are returned in task order; fetches within the level
    /// complete in any order.
    async fn fetch_level(
        &self,
        level: &[CrawlTask],
        semaphore: &Arc<Semaphore>,
    ) -> Vec<PageResult> {
        let mut handles = Vec::with_capacity(level.len());

        for task in level {
            let transports = Arc::clone(&self.transports);
            let cancel = self.cancel.clone();
            let semaphore = Arc::clone(semaphore);
            let url = task.url.clone();

            handles.push(tokio::spawn(async move {
                eprintln!("DEBUG spawned task for {}", url);
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return PageResult::Failed("shutting down".to_string()),
                };

                eprintln!("DEBUG got permit for {}, cancelled={}", url, cancel.is_cancelled());
                tokio::select! {
                    result = fetch_one_page(&transports, &url) => result,
                    _ = cancel.cancelled() => PageResult::Failed("cancelled".to_string()),
                }
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => { eprintln!("DEBUG join error: {}", e); results.push(PageResult::Failed(format!("task panicked: {}", e))); }
            }
        }
        results
    }

    /// Classifies and routes the links discovered on one page
    async fn handle_discovered_links(&mut self, task: &CrawlTask, links: Vec<String>) {
        for link in links {
            let normalized = match normalize_url(&link) {
                Ok(n) => n,
                Err(e) => {
                    tracing::trace!(%link, error = %e, "skipping unparseable link");
                    continue;
                }
            };

            if self.frontier.is_visited(normalized.as_str()) {
                continue;
            }

            let Some(host) = extract_host(&normalized) else {
                continue;
            };

            if !self.in_scope(task, &host) {
                tracing::trace!(url = %normalized, "link outside crawl scope");
                continue;
            }

            match self.classify_link(&normalized).await {
                Classification::File(category) => {
                    let detection = self.detection_for(&normalized);
                    self.accept_candidate(normalized, category, task.url.as_str(), detection);
                }
                Classification::NotAFile => {
                    let child_depth = task.depth + 1;
                    if child_depth > self.config.crawler.max_crawl_depth {
                        continue;
                    }
                    self.frontier.try_enqueue(CrawlTask {
                        url: normalized,
                        depth: child_depth,
                        origin_host: task.origin_host.clone(),
                    });
                }
            }
        }
    }

    /// Handles a queued page that served non-HTML content
    fn handle_non_html_page(&mut self, task: &CrawlTask, content_type: &str) {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(CONTENT_TYPE, value);
        }

        // The URL is already claimed (it was enqueued as a page), so the
        // candidate is added directly
        if let Classification::File(category) = self.classifier.classify(&task.url, Some(&headers))
        {
            if self.category_enabled(category) {
                self.record_candidate(FileCandidate {
                    url: task.url.clone(),
                    category,
                    source_page: task.url.to_string(),
                    detection: DetectionMethod::ResponseHeader,
                });
            }
        }
    }

    /// Scope filter: same site as the task's seed, or explicitly allowed
    fn in_scope(&self, task: &CrawlTask, host: &str) -> bool {
        if !self.config.crawler.same_domain_only {
            return true;
        }

        if same_site(&task.origin_host, host) {
            return true;
        }

        self.config
            .filters
            .allowed_hosts
            .iter()
            .any(|pattern| matches_wildcard(pattern, host))
    }

    /// Classifies a link, probing headers for ambiguous endpoint matches
    async fn classify_link(&self, url: &Url) -> Classification {
        let (syntactic, method) = self.classifier.classify_syntactic(url);

        // Only tentative endpoint matches need header confirmation
        if method != Some(DetectionMethod::EndpointPattern) {
            return syntactic;
        }

        if let Some(cached) = self.probe_cache.get(url.as_str()) {
            return cached;
        }

        let classification = match self.probe_headers(url).await {
            Some(headers) => self.classifier.classify(url, Some(&headers)),
            // An unreachable endpoint is treated as not-a-file; the page
            // fetch path will surface the real error if it recurses
            None => Classification::NotAFile,
        };

        self.probe_cache.insert(url.as_str(), classification);
        classification
    }

    /// Issues the lightweight HEAD probe for header-based classification
    async fn probe_headers(&self, url: &Url) -> Option<HeaderMap> {
        let transport = match self.transports.transport_for(url).await {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "probe transport unavailable");
                return None;
            }
        };

        match transport.probe(url).await {
            Ok(response) if response.status().is_success() => Some(response.headers().clone()),
            Ok(response) => {
                tracing::debug!(url = %url, status = %response.status(), "probe non-2xx");
                None
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "probe failed");
                None
            }
        }
    }

    /// The detection method a directly-linked candidate was found by
    fn detection_for(&self, url: &Url) -> DetectionMethod {
        match self.classifier.classify_syntactic(url) {
            (_, Some(method)) => method,
            // Syntactic pass was inconclusive, so headers decided
            _ => DetectionMethod::ResponseHeader,
        }
    }

    /// Claims and records a new file candidate
    fn accept_candidate(
        &mut self,
        url: Url,
        category: Category,
        source_page: &str,
        detection: DetectionMethod,
    ) {
        if !self.category_enabled(category) {
            return;
        }

        // Claiming here is what guarantees exactly one candidate (and one
        // outcome) per normalized URL, however many pages link to it
        if !self.frontier.claim(url.as_str()) {
            return;
        }

        self.record_candidate(FileCandidate {
            url,
            category,
            source_page: source_page.to_string(),
            detection,
        });
    }

    fn record_candidate(&mut self, candidate: FileCandidate) {
        tracing::debug!(
            url = %candidate.url,
            category = %candidate.category,
            "file candidate found"
        );
        self.stats.record_file_found(candidate.category);
        self.found_links
            .entry(candidate.category)
            .or_default()
            .push(candidate.url.to_string());
        self.candidates.push(candidate);
    }

    fn category_enabled(&self, category: Category) -> bool {
        self.config
            .filters
            .enabled_categories
            .contains(&category)
    }
}

/// Fetches and parses one page, mapping everything to a PageResult
async fn fetch_one_page(transports: &TransportSelector, url: &Url) -> PageResult {
    eprintln!("DEBUG fetch_one_page entry {}", url);
    let transport = match transports.transport_for(url).await {
        Ok(t) => t,
        Err(e) => {
            eprintln!("DEBUG transport_for failed {}: {}", url, e);
            return PageResult::Failed(e.to_string());
        }
    };

    match fetch_page(&transport, url).await {
        Ok(PageFetch::Html {
            final_url, body, ..
        }) => {
            let parsed = parse_html(&body, &final_url);
            eprintln!("DEBUG fetched {} -> {} links", url, parsed.links.len());
            PageResult::Links(parsed.links)
        }
        Ok(PageFetch::NotHtml { content_type }) => { eprintln!("DEBUG NotHtml {} ct={}", url, content_type); PageResult::NotHtml(content_type) }
        Err(e) => {
            eprintln!("DEBUG fetch failed {}: {}", url, e);
            PageResult::Failed(e.to_string())
        }
    }
}

/// Builds the configured delivery sinks
fn build_sinks(config: &Config) -> Result<Vec<Box<dyn DeliverySink>>> {
    let mut sinks: Vec<Box<dyn DeliverySink>> = Vec::new();

    if let Some(notify) = &config.notify {
        let sink = NotifySink::new(
            notify.url.clone(),
            notify.auth_header.clone(),
            config.crawler.request_timeout(),
        )?;
        sinks.push(Box::new(sink));
    }

    Ok(sinks)
}

/// Runs a complete crawl-and-download operation
///
/// This is the main library entry point for the full pipeline.
///
/// # Example
///
/// ```no_run
/// use trawl::config::Config;
/// use trawl::crawler::run_crawl;
///
/// # async fn example() -> trawl::Result<()> {
/// let config = Config {
///     seeds: vec!["https://example.com/".to_string()],
///     ..Config::default()
/// };
/// let report = run_crawl(config).await?;
/// println!("downloaded {}", report.stats.files_downloaded);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config) -> Result<CrawlReport> {
    let coordinator = Coordinator::new(config, CancellationToken::new())?;
    coordinator.run().await
}

/// Runs discovery only, returning discovered file URLs per category
pub async fn run_discovery(config: Config) -> Result<BTreeMap<Category, Vec<String>>> {
    let coordinator = Coordinator::new(config, CancellationToken::new())?;
    coordinator.discover().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_seeds(seeds: Vec<String>) -> Config {
        Config {
            seeds,
            ..Config::default()
        }
    }

    #[test]
    fn test_coordinator_requires_seeds() {
        let result = Coordinator::new(config_with_seeds(vec![]), CancellationToken::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_coordinator_rejects_bad_seed() {
        let result = Coordinator::new(
            config_with_seeds(vec!["not a url".to_string()]),
            CancellationToken::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_seeds_collapse() {
        let coordinator = Coordinator::new(
            config_with_seeds(vec![
                "https://example.com/".to_string(),
                "https://example.com/#frag".to_string(),
            ]),
            CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(coordinator.frontier.queue_len(), 1);
    }

    #[test]
    fn test_scope_same_site() {
        let coordinator = Coordinator::new(
            config_with_seeds(vec!["https://example.com/".to_string()]),
            CancellationToken::new(),
        )
        .unwrap();

        let task = CrawlTask {
            url: Url::parse("https://example.com/").unwrap(),
            depth: 0,
            origin_host: "example.com".to_string(),
        };

        assert!(coordinator.in_scope(&task, "example.com"));
        assert!(coordinator.in_scope(&task, "cdn.example.com"));
        assert!(!coordinator.in_scope(&task, "other.org"));
    }

    #[test]
    fn test_scope_allowed_hosts() {
        let mut config = config_with_seeds(vec!["https://example.com/".to_string()]);
        config.filters.allowed_hosts = vec!["*.trusted.org".to_string()];

        let coordinator = Coordinator::new(config, CancellationToken::new()).unwrap();
        let task = CrawlTask {
            url: Url::parse("https://example.com/").unwrap(),
            depth: 0,
            origin_host: "example.com".to_string(),
        };

        assert!(coordinator.in_scope(&task, "files.trusted.org"));
        assert!(!coordinator.in_scope(&task, "other.org"));
    }

    #[test]
    fn test_scope_disabled() {
        let mut config = config_with_seeds(vec!["https://example.com/".to_string()]);
        config.crawler.same_domain_only = false;

        let coordinator = Coordinator::new(config, CancellationToken::new()).unwrap();
        let task = CrawlTask {
            url: Url::parse("https://example.com/").unwrap(),
            depth: 0,
            origin_host: "example.com".to_string(),
        };

        assert!(coordinator.in_scope(&task, "anything.example"));
    }

    // End-to-end crawl behavior is covered by the wiremock integration
    // tests in tests/
}
