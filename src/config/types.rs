use crate::classify::Category;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Seed URLs to start crawling from (may also come from the CLI)
    #[serde(default)]
    pub seeds: Vec<String>,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub anonymity: AnonymityConfig,

    /// Optional HTTP event-notification sink
    #[serde(default)]
    pub notify: Option<NotifyConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            crawler: CrawlerConfig::default(),
            output: OutputConfig::default(),
            filters: FilterConfig::default(),
            anonymity: AnonymityConfig::default(),
            notify: None,
        }
    }
}

/// Crawl and download behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CrawlerConfig {
    /// Maximum crawl depth from seed URLs (0 = seed pages only)
    #[serde(default = "default_max_crawl_depth")]
    pub max_crawl_depth: u32,

    /// Hard ceiling on concurrently in-flight file downloads
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// Independent ceiling on concurrent page fetches
    #[serde(default = "default_max_concurrent_pages")]
    pub max_concurrent_pages: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: f64,

    /// Maximum download attempts per file (minimum 1 is always made)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Download write-buffer chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Restrict discovered links to the seed's site
    #[serde(default = "default_same_domain_only")]
    pub same_domain_only: bool,

    /// Politeness delay between page-fetch waves, in seconds
    #[serde(default)]
    pub delay_between_requests_secs: f64,

    /// Stop expanding the frontier after this many pages (0 = unlimited)
    #[serde(default)]
    pub max_pages: u64,

    /// Stop expanding the frontier after this many seconds (0 = unlimited)
    #[serde(default)]
    pub max_runtime_secs: f64,

    /// User-Agent header sent on every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_crawl_depth: default_max_crawl_depth(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            max_concurrent_pages: default_max_concurrent_pages(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            chunk_size: default_chunk_size(),
            same_domain_only: default_same_domain_only(),
            delay_between_requests_secs: 0.0,
            max_pages: 0,
            max_runtime_secs: 0.0,
            user_agent: default_user_agent(),
        }
    }
}

impl CrawlerConfig {
    /// Per-request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }

    /// Politeness delay as a Duration (None when zero)
    pub fn request_delay(&self) -> Option<Duration> {
        if self.delay_between_requests_secs > 0.0 {
            Some(Duration::from_secs_f64(self.delay_between_requests_secs))
        } else {
            None
        }
    }

    /// Page budget (None when unlimited)
    pub fn page_budget(&self) -> Option<u64> {
        (self.max_pages > 0).then_some(self.max_pages)
    }

    /// Runtime budget (None when unlimited)
    pub fn runtime_budget(&self) -> Option<Duration> {
        (self.max_runtime_secs > 0.0).then(|| Duration::from_secs_f64(self.max_runtime_secs))
    }
}

/// Output locations configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory completed downloads land in
    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    /// Name of the metadata JSON artifact written into the download
    /// directory (empty = don't write one)
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            metadata_file: default_metadata_file(),
        }
    }
}

/// Classification and scope filter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FilterConfig {
    /// Categories whose candidates are downloaded (default: all)
    #[serde(default = "default_enabled_categories")]
    pub enabled_categories: Vec<Category>,

    /// Custom extension → category mappings (keys with or without dot)
    #[serde(default)]
    pub custom_extensions: HashMap<String, Category>,

    /// Host patterns allowed beyond the seed's site (wildcards supported)
    #[serde(default)]
    pub allowed_hosts: Vec<String>,

    /// Substring patterns marking extensionless download endpoints
    #[serde(default = "default_endpoint_patterns")]
    pub download_endpoint_patterns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled_categories: default_enabled_categories(),
            custom_extensions: HashMap::new(),
            allowed_hosts: Vec::new(),
            download_endpoint_patterns: default_endpoint_patterns(),
        }
    }
}

/// Anonymity-network transport configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AnonymityConfig {
    /// Whether anonymity-network hosts may be fetched at all
    #[serde(default)]
    pub enabled: bool,

    /// SOCKS proxy port on localhost
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,

    /// Host suffixes routed over the proxy
    #[serde(default = "default_anonymity_suffixes")]
    pub suffixes: Vec<String>,
}

impl Default for AnonymityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            proxy_port: default_proxy_port(),
            suffixes: default_anonymity_suffixes(),
        }
    }
}

/// HTTP event-notification sink configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NotifyConfig {
    /// Endpoint URL events are POSTed to
    pub url: String,

    /// Optional Authorization header value
    #[serde(default)]
    pub auth_header: Option<String>,
}

fn default_max_crawl_depth() -> u32 {
    1
}

fn default_max_concurrent_downloads() -> usize {
    5
}

fn default_max_concurrent_pages() -> usize {
    3
}

fn default_request_timeout_secs() -> f64 {
    30.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_chunk_size() -> usize {
    8192
}

fn default_same_domain_only() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("trawl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_download_dir() -> String {
    "./downloads".to_string()
}

fn default_metadata_file() -> String {
    "crawl_metadata.json".to_string()
}

fn default_enabled_categories() -> Vec<Category> {
    Category::ALL.to_vec()
}

fn default_endpoint_patterns() -> Vec<String> {
    crate::classify::DEFAULT_ENDPOINT_PATTERNS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_proxy_port() -> u16 {
    9050
}

fn default_anonymity_suffixes() -> Vec<String> {
    vec![".onion".to_string()]
}
