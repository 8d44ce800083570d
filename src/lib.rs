//! Trawl: a file-harvesting web crawler
//!
//! This crate discovers downloadable-file links on a seed set of pages,
//! retrieves them concurrently with retry/backoff, optionally routes
//! anonymity-network hosts through a SOCKS proxy, and hands completed
//! files to configured delivery sinks.

pub mod classify;
pub mod config;
pub mod crawler;
pub mod delivery;
pub mod download;
pub mod output;
pub mod transport;
pub mod url;

use thiserror::Error;

/// Main error type for trawl operations
#[derive(Debug, Error)]
pub enum TrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Page fetch failed for {url}: {reason}")]
    PageFetchFailed { url: String, reason: String },

    #[error("Download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Anonymity transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Integrity computation failed for {path}: {source}")]
    IntegrityComputeFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Delivery sink '{sink}' failed: {reason}")]
    SinkFailed { sink: String, reason: String },

    #[error("Download directory {path} is not writable: {source}")]
    DownloadDirUnusable {
        path: String,
        source: std::io::Error,
    },

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for trawl operations
pub type Result<T> = std::result::Result<T, TrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use classify::{Category, Classification, DetectionMethod, FileCandidate};
pub use config::Config;
pub use crawler::{run_crawl, run_discovery, Coordinator};
pub use download::DownloadOutcome;
pub use output::{CrawlReport, CrawlStats};
pub use url::{extract_host, normalize_url};
