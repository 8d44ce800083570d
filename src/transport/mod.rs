//! Dual-route HTTP transports
//!
//! This module owns the two HTTP clients a run can use:
//! - a direct client for ordinary hosts
//! - a SOCKS-proxied client for anonymity-network hosts
//!
//! Routing is a pure function of the host string (suffix match against a
//! configurable set, `.onion` by default). Both transports share the same
//! timeout and redirect contract so downstream code never cares which one
//! it got. The proxied client is built lazily on first use; a failure to
//! build it surfaces as [`TrawlError::TransportUnavailable`] so the
//! download scheduler can fail fast instead of burning retry budget.

use crate::{Result, TrawlError};
use reqwest::redirect::Policy;
use reqwest::{Client, Proxy, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

/// Maximum redirect hops either transport will follow
const REDIRECT_LIMIT: usize = 5;

/// Which connection path a host is routed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Ordinary host, direct connection
    Direct,

    /// Anonymity-network host, SOCKS-proxied connection
    Proxied,
}

/// A single transport: a pooled HTTP client plus its route kind
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    route: Route,
}

impl Transport {
    /// Issues a GET request, returning the (possibly redirected) response
    ///
    /// The response body has not been consumed; callers stream it.
    pub async fn fetch(&self, url: &Url) -> reqwest::Result<Response> {
        self.client.get(url.as_str()).send().await
    }

    /// Issues a HEAD request for header inspection
    pub async fn probe(&self, url: &Url) -> reqwest::Result<Response> {
        self.client.head(url.as_str()).send().await
    }

    /// The route this transport serves
    pub fn route(&self) -> Route {
        self.route
    }
}

/// Settings needed to construct transports
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// User-Agent header sent on every request
    pub user_agent: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Whether the proxied route is enabled at all
    pub use_anonymity_transport: bool,

    /// SOCKS proxy port on localhost
    pub anonymity_proxy_port: u16,

    /// Host suffixes routed over the proxy (e.g. ".onion")
    pub anonymity_suffixes: Vec<String>,
}

/// Chooses and caches the transport for each host
///
/// The direct client is built eagerly (a run that cannot build a plain
/// HTTP client cannot do anything). The proxied client is built on first
/// use so runs that never touch an anonymity-network host pay nothing.
pub struct TransportSelector {
    config: TransportConfig,
    direct: Transport,
    proxied: Mutex<Option<Arc<Transport>>>,
}

impl TransportSelector {
    /// Creates a selector, building the direct client
    pub fn new(config: TransportConfig) -> Result<Self> {
        let direct = Transport {
            client: build_client(&config, None)?,
            route: Route::Direct,
        };

        Ok(Self {
            config,
            direct,
            proxied: Mutex::new(None),
        })
    }

    /// Pure routing decision for a host
    ///
    /// A host routes over the proxy when the anonymity transport is
    /// enabled and the host ends with one of the configured suffixes.
    pub fn route_for(&self, host: &str) -> Route {
        if self.config.use_anonymity_transport
            && self
                .config
                .anonymity_suffixes
                .iter()
                .any(|suffix| host.ends_with(suffix.as_str()))
        {
            Route::Proxied
        } else {
            Route::Direct
        }
    }

    /// Returns the transport for a URL's host
    ///
    /// # Errors
    ///
    /// [`TrawlError::TransportUnavailable`] when the URL requires the
    /// proxied route and the proxy client cannot be established, or when
    /// the URL needs the proxy but the anonymity transport is disabled.
    pub async fn transport_for(&self, url: &Url) -> Result<Arc<Transport>> {
        let host = url.host_str().unwrap_or_default().to_lowercase();

        let needs_proxy = self
            .config
            .anonymity_suffixes
            .iter()
            .any(|suffix| host.ends_with(suffix.as_str()));

        if needs_proxy && !self.config.use_anonymity_transport {
            return Err(TrawlError::TransportUnavailable(format!(
                "host {} requires the anonymity transport, which is disabled",
                host
            )));
        }

        match self.route_for(&host) {
            Route::Direct => Ok(Arc::new(self.direct.clone())),
            Route::Proxied => self.proxied().await,
        }
    }

    /// Returns the proxied transport, building it on first use
    async fn proxied(&self) -> Result<Arc<Transport>> {
        let mut guard = self.proxied.lock().await;

        if let Some(transport) = guard.as_ref() {
            return Ok(Arc::clone(transport));
        }

        let proxy_url = format!("socks5h://127.0.0.1:{}", self.config.anonymity_proxy_port);
        tracing::info!("Establishing anonymity transport via {}", proxy_url);

        let proxy = Proxy::all(&proxy_url).map_err(|e| {
            TrawlError::TransportUnavailable(format!("invalid proxy {}: {}", proxy_url, e))
        })?;

        let client = build_client(&self.config, Some(proxy))
            .map_err(|e| TrawlError::TransportUnavailable(e.to_string()))?;

        let transport = Arc::new(Transport {
            client,
            route: Route::Proxied,
        });
        *guard = Some(Arc::clone(&transport));

        Ok(transport)
    }
}

/// Builds an HTTP client with the shared transport contract
///
/// Both routes get the same timeout, redirect limit, compression, and
/// connection-pool settings; the proxied route additionally carries the
/// SOCKS proxy. `socks5h` is used so hostname resolution happens at the
/// proxy, which anonymity-network hosts require.
fn build_client(config: &TransportConfig, proxy: Option<Proxy>) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.request_timeout)
        .connect_timeout(config.request_timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(REDIRECT_LIMIT))
        .gzip(true)
        .brotli(true)
        .pool_max_idle_per_host(8);

    if let Some(proxy) = proxy {
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(use_proxy: bool) -> TransportConfig {
        TransportConfig {
            user_agent: "trawl/1.0".to_string(),
            request_timeout: Duration::from_secs(30),
            use_anonymity_transport: use_proxy,
            anonymity_proxy_port: 9050,
            anonymity_suffixes: vec![".onion".to_string()],
        }
    }

    #[test]
    fn test_selector_builds_direct_client() {
        let selector = TransportSelector::new(test_config(false));
        assert!(selector.is_ok());
    }

    #[test]
    fn test_route_for_ordinary_host() {
        let selector = TransportSelector::new(test_config(true)).unwrap();
        assert_eq!(selector.route_for("example.com"), Route::Direct);
    }

    #[test]
    fn test_route_for_onion_host() {
        let selector = TransportSelector::new(test_config(true)).unwrap();
        assert_eq!(
            selector.route_for("dwkcmg5ewqvmuacu.onion"),
            Route::Proxied
        );
    }

    #[test]
    fn test_onion_routes_direct_when_transport_disabled() {
        let selector = TransportSelector::new(test_config(false)).unwrap();
        // route_for alone says Direct; transport_for rejects instead
        assert_eq!(selector.route_for("x.onion"), Route::Direct);
    }

    #[tokio::test]
    async fn test_transport_for_onion_fails_fast_when_disabled() {
        let selector = TransportSelector::new(test_config(false)).unwrap();
        let url = Url::parse("http://x.onion/file.pdf").unwrap();

        let result = selector.transport_for(&url).await;
        assert!(matches!(result, Err(TrawlError::TransportUnavailable(_))));
    }

    #[tokio::test]
    async fn test_transport_for_ordinary_host_is_direct() {
        let selector = TransportSelector::new(test_config(true)).unwrap();
        let url = Url::parse("https://example.com/file.pdf").unwrap();

        let transport = selector.transport_for(&url).await.unwrap();
        assert_eq!(transport.route(), Route::Direct);
    }

    #[test]
    fn test_custom_suffix_set() {
        let mut config = test_config(true);
        config.anonymity_suffixes = vec![".onion".to_string(), ".i2p".to_string()];
        let selector = TransportSelector::new(config).unwrap();

        assert_eq!(selector.route_for("site.i2p"), Route::Proxied);
        assert_eq!(selector.route_for("site.example"), Route::Direct);
    }
}
