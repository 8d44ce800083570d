//! HTTP event-notification sink
//!
//! Posts a JSON event for each delivered file to a configured endpoint.
//! This is the reference `DeliverySink` implementation; heavier delivery
//! transports (remote upload and the like) live outside the crate behind
//! the same trait.

use super::{DeliverySink, FileMeta};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// JSON payload posted per file
#[derive(Debug, Serialize)]
struct FileEvent<'a> {
    url: &'a str,
    filename: &'a str,
    sha256: &'a str,
    size: u64,
}

/// Delivery sink that POSTs a per-file JSON event
pub struct NotifySink {
    endpoint: String,
    auth_header: Option<String>,
    client: reqwest::Client,
}

impl NotifySink {
    /// Creates a notify sink for the given endpoint URL
    ///
    /// `auth_header` is sent verbatim as the `Authorization` header when
    /// present.
    pub fn new(
        endpoint: String,
        auth_header: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint,
            auth_header,
            client,
        })
    }
}

#[async_trait]
impl DeliverySink for NotifySink {
    fn name(&self) -> &str {
        "notify"
    }

    async fn deliver(&self, meta: &FileMeta) -> Result<(), String> {
        let size = tokio::fs::metadata(&meta.path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        let event = FileEvent {
            url: &meta.origin_url,
            filename: &meta.filename,
            sha256: &meta.sha256,
            size,
        };

        let mut request = self.client.post(&self.endpoint).json(&event);
        if let Some(auth) = &self.auth_header {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("endpoint returned HTTP {}", response.status()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn meta(dir: &std::path::Path) -> FileMeta {
        let file = dir.join("a.bin");
        std::fs::write(&file, b"abc").unwrap();
        FileMeta {
            path: file,
            sha256: "deadbeef".to_string(),
            origin_url: "https://example.com/a.bin".to_string(),
            filename: "a.bin".to_string(),
        }
    }

    #[tokio::test]
    async fn test_posts_file_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .and(body_json_string(
                r#"{"url":"https://example.com/a.bin","filename":"a.bin","sha256":"deadbeef","size":3}"#,
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let sink = NotifySink::new(
            format!("{}/events", server.uri()),
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        let result = sink.deliver(&meta(dir.path())).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_non_2xx_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let sink = NotifySink::new(server.uri(), None, Duration::from_secs(5)).unwrap();

        let result = sink.deliver(&meta(dir.path())).await;
        assert!(result.is_err());
    }
}
