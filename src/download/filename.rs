//! Filename derivation, sanitization, and collision avoidance
//!
//! Filenames are derived in priority order: the Content-Disposition
//! filename parameter, the last URL path segment, and finally a name
//! synthesized from a hash of the URL. Names are sanitized against path
//! traversal and filesystem-unsafe characters, and collisions with
//! existing files get a numeric disambiguator instead of overwriting.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use url::Url;

/// Maximum filename length after sanitization
const MAX_FILENAME_LEN: usize = 200;

/// Parses a Content-Disposition header to extract the filename
///
/// Handles:
/// - `attachment; filename="example.pdf"`
/// - `attachment; filename=example.pdf`
/// - `attachment; filename*=UTF-8''example.pdf` (RFC 5987)
pub fn parse_content_disposition(header: &str) -> Option<String> {
    // Try filename*= first (RFC 5987 encoded)
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        // Format: charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            let encoded_name = encoded[..end].trim();
            if let Ok(decoded) = urlencoding::decode(encoded_name) {
                let name = decoded.trim().to_string();
                if !name.is_empty() {
                    return Some(name);
                }
            }
        }
    }

    // Plain filename=
    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();
        let end = value.find(';').unwrap_or(value.len());
        let name = value[..end].trim().trim_matches(['"', '\'']).trim();
        if !name.is_empty() {
            let decoded = urlencoding::decode(name)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| name.to_string());
            return Some(decoded);
        }
    }

    None
}

/// Guesses a file extension (with dot) from a Content-Type header value
pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    let ext = match mime.as_str() {
        "application/pdf" => ".pdf",
        "application/zip" => ".zip",
        "application/gzip" => ".gz",
        "application/x-tar" => ".tar",
        "application/json" => ".json",
        "application/xml" | "text/xml" => ".xml",
        "text/csv" => ".csv",
        "text/plain" => ".txt",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/svg+xml" => ".svg",
        "image/webp" => ".webp",
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        "audio/mpeg" => ".mp3",
        "audio/ogg" => ".ogg",
        "application/octet-stream" => ".bin",
        _ => return None,
    };
    Some(ext)
}

/// Sanitizes a filename for safe use in the download directory
///
/// Strips any path components (only the final component survives),
/// replaces filesystem-unsafe and control characters with underscores,
/// and caps the length while preserving the extension.
pub fn sanitize_filename(name: &str) -> String {
    // Path traversal: keep only the final path component
    let name = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .trim_matches('.');

    let mut sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.len() > MAX_FILENAME_LEN {
        let (stem, ext) = split_extension(&sanitized);
        let keep = MAX_FILENAME_LEN.saturating_sub(ext.len());
        let truncated: String = stem.chars().take(keep).collect();
        sanitized = format!("{}{}", truncated, ext);
    }

    sanitized
}

/// Splits a filename into (stem, extension-with-dot)
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

/// Derives the filename for a download
///
/// Priority order:
/// 1. Content-Disposition filename parameter
/// 2. Last URL path segment (percent-decoded)
/// 3. `file_<8-hex-digest-of-url>`
///
/// When the derived name has no extension and a Content-Type is known, an
/// extension is appended from the MIME type.
pub fn derive_filename(
    url: &Url,
    content_disposition: Option<&str>,
    content_type: Option<&str>,
) -> String {
    let mut filename = content_disposition
        .and_then(parse_content_disposition)
        .or_else(|| {
            url.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(|segment| {
                    urlencoding::decode(segment)
                        .map(|d| d.into_owned())
                        .unwrap_or_else(|_| segment.to_string())
                })
        })
        .map(|name| sanitize_filename(&name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("file_{}", short_url_hash(url)));

    // Append an extension from the content type if the name has none
    if split_extension(&filename).1.is_empty() {
        if let Some(ext) = content_type.and_then(extension_from_content_type) {
            filename.push_str(ext);
        }
    }

    filename
}

/// First 8 hex characters of the URL's SHA-256, for synthesized names
fn short_url_hash(url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

/// Resolves a collision-free destination path in the download directory
///
/// Appends `_1`, `_2`, … before the extension until neither the final
/// path nor its in-progress `.part` sibling exists.
pub fn resolve_collision(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() && !part_path(&candidate).exists() {
        return candidate;
    }

    let (stem, ext) = split_extension(filename);
    let mut counter = 1;
    loop {
        let candidate = dir.join(format!("{}_{}{}", stem, counter, ext));
        if !candidate.exists() && !part_path(&candidate).exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// The temporary in-progress path for a destination path
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".part");
    destination.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_quoted_filename() {
        let result = parse_content_disposition("attachment; filename=\"report.pdf\"");
        assert_eq!(result, Some("report.pdf".to_string()));
    }

    #[test]
    fn test_parse_unquoted_filename() {
        let result = parse_content_disposition("attachment; filename=report.pdf");
        assert_eq!(result, Some("report.pdf".to_string()));
    }

    #[test]
    fn test_parse_rfc5987_filename() {
        let result = parse_content_disposition("attachment; filename*=UTF-8''na%C3%AFve.pdf");
        assert_eq!(result, Some("naïve.pdf".to_string()));
    }

    #[test]
    fn test_parse_no_filename() {
        assert_eq!(parse_content_disposition("attachment"), None);
        assert_eq!(parse_content_disposition("inline"), None);
    }

    #[test]
    fn test_sanitize_removes_unsafe_chars() {
        assert_eq!(sanitize_filename("a<b>c:d.txt"), "a_b_c_d.txt");
        assert_eq!(sanitize_filename("he|llo?.pdf"), "he_llo_.pdf");
    }

    #[test]
    fn test_sanitize_strips_path_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\evil.exe"), "evil.exe");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = format!("{}.pdf", "a".repeat(300));
        let sanitized = sanitize_filename(&long);
        assert!(sanitized.len() <= MAX_FILENAME_LEN);
        assert!(sanitized.ends_with(".pdf"));
    }

    #[test]
    fn test_derive_prefers_content_disposition() {
        let name = derive_filename(
            &url("https://example.com/download/42"),
            Some("attachment; filename=\"setup.exe\""),
            None,
        );
        assert_eq!(name, "setup.exe");
    }

    #[test]
    fn test_derive_falls_back_to_path_segment() {
        let name = derive_filename(&url("https://example.com/files/report.pdf"), None, None);
        assert_eq!(name, "report.pdf");
    }

    #[test]
    fn test_derive_decodes_path_segment() {
        let name = derive_filename(&url("https://example.com/files/my%20doc.pdf"), None, None);
        assert_eq!(name, "my doc.pdf");
    }

    #[test]
    fn test_derive_synthesizes_when_no_segment() {
        let name = derive_filename(&url("https://example.com/"), None, None);
        assert!(name.starts_with("file_"));
        assert_eq!(name.len(), "file_".len() + 8);
    }

    #[test]
    fn test_derive_synthesized_name_is_stable() {
        let a = derive_filename(&url("https://example.com/"), None, None);
        let b = derive_filename(&url("https://example.com/"), None, None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_appends_extension_from_content_type() {
        let name = derive_filename(
            &url("https://example.com/download/42"),
            None,
            Some("application/pdf"),
        );
        assert_eq!(name, "42.pdf");
    }

    #[test]
    fn test_resolve_collision_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"x").unwrap();

        let resolved = resolve_collision(dir.path(), "report.pdf");
        assert_eq!(resolved, dir.path().join("report_1.pdf"));

        std::fs::write(dir.path().join("report_1.pdf"), b"x").unwrap();
        let resolved = resolve_collision(dir.path(), "report.pdf");
        assert_eq!(resolved, dir.path().join("report_2.pdf"));
    }

    #[test]
    fn test_resolve_collision_avoids_in_progress_part() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf.part"), b"x").unwrap();

        let resolved = resolve_collision(dir.path(), "report.pdf");
        assert_eq!(resolved, dir.path().join("report_1.pdf"));
    }

    #[test]
    fn test_part_path() {
        let p = part_path(Path::new("/tmp/downloads/report.pdf"));
        assert_eq!(p, Path::new("/tmp/downloads/report.pdf.part"));
    }
}
