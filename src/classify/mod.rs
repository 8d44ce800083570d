//! File-category classification
//!
//! This module decides whether a URL refers to a downloadable file and, if
//! so, which category it belongs to. Classification is two-phase:
//!
//! 1. A cheap syntactic pass over the URL path (extension tables and
//!    download-endpoint patterns) that needs no network access
//! 2. An optional confirmatory pass over live response headers
//!    (Content-Disposition and Content-Type) for URLs the syntactic pass
//!    could not settle
//!
//! `classify` itself is pure; the [`ProbeCache`] memoizes header-probe
//! outcomes per URL so a run never probes the same URL twice.

use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

/// File categories recognized by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Documents,
    Images,
    Videos,
    Audio,
    Archives,
    Data,
    Executables,
    DownloadsEndpoint,
    Others,
}

impl Category {
    /// All categories, in report order
    pub const ALL: [Category; 9] = [
        Category::Documents,
        Category::Images,
        Category::Videos,
        Category::Audio,
        Category::Archives,
        Category::Data,
        Category::Executables,
        Category::DownloadsEndpoint,
        Category::Others,
    ];

    /// The kebab-case name used in config files and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Documents => "documents",
            Category::Images => "images",
            Category::Videos => "videos",
            Category::Audio => "audio",
            Category::Archives => "archives",
            Category::Data => "data",
            Category::Executables => "executables",
            Category::DownloadsEndpoint => "downloads-endpoint",
            Category::Others => "others",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The URL refers to a downloadable file of the given category
    File(Category),

    /// The URL is a page to recurse into (or nothing downloadable)
    NotAFile,
}

/// How a file candidate was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    /// The URL path carried a known file extension
    Extension,

    /// The URL path matched a download-endpoint pattern
    EndpointPattern,

    /// Live response headers confirmed file-ness
    ResponseHeader,
}

/// A URL classified as referring to a downloadable file
///
/// Ownership passes from the classifier to the download scheduler;
/// candidates are immutable once created.
#[derive(Debug, Clone)]
pub struct FileCandidate {
    /// The file URL (normalized form)
    pub url: Url,

    /// The inferred category
    pub category: Category,

    /// The page the link was discovered on
    pub source_page: String,

    /// How the candidate was detected
    pub detection: DetectionMethod,
}

/// Built-in extension tables per category
const EXTENSION_TABLE: &[(Category, &[&str])] = &[
    (
        Category::Documents,
        &["pdf", "doc", "docx", "txt", "rtf", "odt"],
    ),
    (
        Category::Images,
        &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp"],
    ),
    (
        Category::Videos,
        &["mp4", "avi", "mov", "wmv", "flv", "webm", "mkv"],
    ),
    (
        Category::Audio,
        &["mp3", "wav", "flac", "aac", "ogg", "wma"],
    ),
    (
        Category::Archives,
        &["zip", "rar", "tar", "gz", "7z", "bz2"],
    ),
    (Category::Data, &["json", "xml", "csv", "xls", "xlsx"]),
    (
        Category::Executables,
        &["exe", "msi", "dmg", "deb", "rpm"],
    ),
    (Category::Others, &["iso", "torrent", "apk"]),
];

/// Default download-endpoint substring patterns
pub const DEFAULT_ENDPOINT_PATTERNS: &[&str] = &["/download/", "/file/", "/attachment/"];

/// Looks up the built-in category for a file extension (without dot)
fn builtin_category(ext: &str) -> Option<Category> {
    for (category, extensions) in EXTENSION_TABLE {
        if extensions.contains(&ext) {
            return Some(*category);
        }
    }
    None
}

/// Maps a Content-Type value to a file category
///
/// Returns None for types that indicate a page (HTML) or that carry no
/// file-ness signal.
fn category_for_content_type(content_type: &str) -> Option<Category> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if mime.starts_with("image/") {
        return Some(Category::Images);
    }
    if mime.starts_with("video/") {
        return Some(Category::Videos);
    }
    if mime.starts_with("audio/") {
        return Some(Category::Audio);
    }

    match mime.as_str() {
        "application/pdf"
        | "application/msword"
        | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        | "application/rtf"
        | "application/vnd.oasis.opendocument.text" => Some(Category::Documents),
        "application/zip"
        | "application/gzip"
        | "application/x-tar"
        | "application/x-7z-compressed"
        | "application/x-rar-compressed"
        | "application/x-bzip2" => Some(Category::Archives),
        "application/json"
        | "application/xml"
        | "text/xml"
        | "text/csv"
        | "application/vnd.ms-excel"
        | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
            Some(Category::Data)
        }
        "application/x-msdownload"
        | "application/x-msi"
        | "application/x-apple-diskimage"
        | "application/x-debian-package"
        | "application/x-rpm" => Some(Category::Executables),
        "application/x-iso9660-image"
        | "application/x-bittorrent"
        | "application/vnd.android.package-archive" => Some(Category::Others),
        // Generic binary: a file, but with no better category
        "application/octet-stream" => Some(Category::DownloadsEndpoint),
        _ => None,
    }
}

/// Classifier with run-scoped configuration
///
/// Holds the custom extension mappings and endpoint patterns supplied at
/// configuration time. The classify functions are pure; all state lives
/// in the caller-owned [`ProbeCache`].
#[derive(Debug, Clone)]
pub struct Classifier {
    /// Custom extension → category mappings (extension without dot, lowercase)
    custom_extensions: HashMap<String, Category>,

    /// Download-endpoint substring patterns
    endpoint_patterns: Vec<String>,
}

impl Classifier {
    /// Creates a classifier from configuration values
    ///
    /// Extensions may be given with or without a leading dot; they are
    /// stored lowercase without the dot. Custom mappings take precedence
    /// over the built-in tables.
    pub fn new(
        custom_extensions: &HashMap<String, Category>,
        endpoint_patterns: &[String],
    ) -> Self {
        let custom_extensions = custom_extensions
            .iter()
            .map(|(ext, cat)| (ext.trim_start_matches('.').to_lowercase(), *cat))
            .collect();

        Self {
            custom_extensions,
            endpoint_patterns: endpoint_patterns.to_vec(),
        }
    }

    /// Extracts the lowercase extension from a URL path, if any
    fn path_extension(url: &Url) -> Option<String> {
        let last_segment = url.path_segments()?.last()?;
        let dot_index = last_segment.rfind('.')?;
        let ext = &last_segment[dot_index + 1..];
        if ext.is_empty() || ext.len() > 11 {
            return None;
        }
        Some(ext.to_lowercase())
    }

    /// Syntactic classification pass (no network access)
    ///
    /// Returns `File` when the URL path carries a known extension,
    /// `File(DownloadsEndpoint)` tentatively when an extensionless path
    /// matches an endpoint pattern, and `NotAFile` otherwise. The
    /// tentative endpoint result should be confirmed with
    /// [`Classifier::classify`] once headers are available.
    pub fn classify_syntactic(&self, url: &Url) -> (Classification, Option<DetectionMethod>) {
        let extension = Self::path_extension(url);

        if let Some(ext) = &extension {
            if let Some(category) = self.custom_extensions.get(ext) {
                return (
                    Classification::File(*category),
                    Some(DetectionMethod::Extension),
                );
            }
            if let Some(category) = builtin_category(ext) {
                return (
                    Classification::File(category),
                    Some(DetectionMethod::Extension),
                );
            }
        }

        // Endpoint patterns only apply to extensionless paths
        if extension.is_none() {
            let path = url.path().to_lowercase();
            if self.endpoint_patterns.iter().any(|p| path.contains(p)) {
                return (
                    Classification::File(Category::DownloadsEndpoint),
                    Some(DetectionMethod::EndpointPattern),
                );
            }
        }

        (Classification::NotAFile, None)
    }

    /// Full classification with optional response headers
    ///
    /// Decision order:
    /// (a) extension match — authoritative, headers ignored
    /// (b) endpoint-pattern match — tentative `downloads-endpoint`
    /// (c) header confirmation — Content-Disposition attachment forces
    ///     file-ness, mapped Content-Type families override the tentative
    ///     category
    /// (d) otherwise NotAFile (a page to recurse into)
    ///
    /// Deterministic: the same URL and headers always yield the same
    /// classification.
    pub fn classify(&self, url: &Url, headers: Option<&HeaderMap>) -> Classification {
        let (syntactic, method) = self.classify_syntactic(url);

        // Extension matches skip header inspection entirely
        if matches!(method, Some(DetectionMethod::Extension)) {
            return syntactic;
        }

        let Some(headers) = headers else {
            // Without headers a tentative endpoint match stays unconfirmed
            return match syntactic {
                Classification::File(_) => syntactic,
                Classification::NotAFile => Classification::NotAFile,
            };
        };

        let disposition = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let type_category = category_for_content_type(content_type);

        if disposition.to_lowercase().contains("attachment") {
            // An attachment is always a file; prefer the filename's
            // extension, then the Content-Type family
            if let Some(category) = attachment_filename_category(disposition, self) {
                return Classification::File(category);
            }
            return Classification::File(type_category.unwrap_or(Category::DownloadsEndpoint));
        }

        if let Some(category) = type_category {
            return Classification::File(category);
        }

        // Headers did not confirm file-ness; an HTML content type means
        // the tentative endpoint guess was wrong
        match syntactic {
            Classification::File(_) if content_type.contains("text/html") => {
                Classification::NotAFile
            }
            other => other,
        }
    }
}

/// Derives a category from the filename parameter of a Content-Disposition
/// attachment header
fn attachment_filename_category(disposition: &str, classifier: &Classifier) -> Option<Category> {
    let filename = crate::download::parse_content_disposition(disposition)?;
    let dot_index = filename.rfind('.')?;
    let ext = filename[dot_index + 1..].to_lowercase();
    classifier
        .custom_extensions
        .get(&ext)
        .copied()
        .or_else(|| builtin_category(&ext))
}

/// Per-run cache of header-probe classification outcomes
///
/// Keyed by normalized URL string. Shared across the run so a URL that is
/// ambiguous on several pages is probed at most once.
#[derive(Debug, Default)]
pub struct ProbeCache {
    inner: Mutex<HashMap<String, Classification>>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached classification for a URL, if probed before
    pub fn get(&self, url: &str) -> Option<Classification> {
        self.inner
            .lock()
            .expect("probe cache lock poisoned")
            .get(url)
            .copied()
    }

    /// Records a probe outcome for a URL
    pub fn insert(&self, url: &str, classification: Classification) {
        self.inner
            .lock()
            .expect("probe cache lock poisoned")
            .insert(url.to_string(), classification);
    }

    /// Number of cached probe outcomes
    pub fn len(&self) -> usize {
        self.inner.lock().expect("probe cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
