//! URL handling module
//!
//! This module provides URL normalization, host extraction, wildcard
//! matching, and the same-site check used by the crawl scope filter.

mod domain;
mod matcher;
mod normalize;

// Re-export main functions
pub use domain::extract_host;
pub use matcher::matches_wildcard;
pub use normalize::normalize_url;

/// Checks whether two hosts belong to the same site
///
/// Two hosts are considered the same site when they are equal, or when one
/// is a subdomain of the other (e.g. `files.example.com` is the same site
/// as `example.com`). A leading `www.` is ignored on both sides.
///
/// # Arguments
///
/// * `seed_host` - The host of the seed URL (lowercase)
/// * `candidate_host` - The host of a discovered link (lowercase)
///
/// # Examples
///
/// ```
/// use trawl::url::same_site;
///
/// assert!(same_site("example.com", "example.com"));
/// assert!(same_site("example.com", "files.example.com"));
/// assert!(same_site("www.example.com", "example.com"));
/// assert!(!same_site("example.com", "example.org"));
/// ```
pub fn same_site(seed_host: &str, candidate_host: &str) -> bool {
    let seed = seed_host.strip_prefix("www.").unwrap_or(seed_host);
    let candidate = candidate_host
        .strip_prefix("www.")
        .unwrap_or(candidate_host);

    candidate == seed
        || candidate.ends_with(&format!(".{}", seed))
        || seed.ends_with(&format!(".{}", candidate))
}
