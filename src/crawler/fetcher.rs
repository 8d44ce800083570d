//! Page fetcher
//!
//! Fetches crawl pages through the routed transport, verifies the
//! response looks like HTML, and decodes the body using the header
//! charset with content sniffing as the fallback. Redirects are followed
//! by the transport up to its fixed hop limit; the final URL after
//! redirects is reported so relative links resolve correctly.

use crate::transport::Transport;
use crate::{Result, TrawlError};
use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use reqwest::header::CONTENT_TYPE;
use url::Url;

/// Result of fetching a crawl page
#[derive(Debug)]
pub enum PageFetch {
    /// An HTML page, decoded and ready for link extraction
    Html {
        /// Final URL after redirects
        final_url: Url,
        /// HTTP status code
        status_code: u16,
        /// Decoded page body
        body: String,
    },

    /// The URL served something other than HTML; nothing to recurse into
    NotHtml {
        /// The Content-Type received
        content_type: String,
    },
}

/// Fetches a page through the given transport
///
/// # Errors
///
/// Returns [`TrawlError::PageFetchFailed`] for network errors, timeouts,
/// and non-2xx responses. Page failures are recorded by the caller and
/// never abort the run.
pub async fn fetch_page(transport: &Transport, url: &Url) -> Result<PageFetch> {
    let response = transport.fetch(url).await.map_err(|e| {
        let reason = if e.is_timeout() {
            "request timeout".to_string()
        } else {
            e.to_string()
        };
        TrawlError::PageFetchFailed {
            url: url.to_string(),
            reason,
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(TrawlError::PageFetchFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", status.as_u16()),
        });
    }

    let final_url = response.url().clone();

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    // A page we intended to recurse into turned out to be something else;
    // that's terminal for this branch, not an error
    if !content_type.is_empty()
        && !content_type.contains("text/html")
        && !content_type.contains("application/xhtml")
    {
        return Ok(PageFetch::NotHtml { content_type });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| TrawlError::PageFetchFailed {
            url: url.to_string(),
            reason: format!("body read failed: {}", e),
        })?;

    let body = decode_body(&bytes, &content_type);

    Ok(PageFetch::Html {
        final_url,
        status_code: status.as_u16(),
        body,
    })
}

/// Decodes page bytes using the header charset, sniffing as fallback
///
/// The Content-Type charset parameter wins when present and recognized;
/// otherwise the bytes are sniffed. UTF-8 input passes through losslessly
/// either way.
fn decode_body(bytes: &[u8], content_type: &str) -> String {
    if let Some(charset) = charset_from_content_type(content_type) {
        if let Some(encoding) = Encoding::for_label(charset.as_bytes()) {
            let (text, _, _) = encoding.decode(bytes);
            return text.into_owned();
        }
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    encoding.decode(bytes).0.into_owned()
}

/// Extracts the charset parameter from a Content-Type value
fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .find_map(|param| {
            let param = param.trim();
            param
                .strip_prefix("charset=")
                .or_else(|| param.strip_prefix("CHARSET="))
        })
        .map(|charset| charset.trim_matches('"').trim().to_string())
        .filter(|charset| !charset.is_empty())
}
