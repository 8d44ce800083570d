//! Configuration validation
//!
//! Rejects configurations that would make a run misbehave before any
//! network work starts: out-of-range numeric options, malformed seed
//! URLs, and an enabled anonymity transport with no usable proxy port.

use crate::config::types::Config;
use crate::ConfigError;
use url::Url;

/// Validates a configuration
///
/// # Arguments
///
/// * `config` - The configuration to validate
///
/// # Returns
///
/// * `Ok(())` - Configuration is usable
/// * `Err(ConfigError)` - Validation failed with a description
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.crawler.max_concurrent_downloads == 0 {
        return Err(ConfigError::Validation(
            "max-concurrent-downloads must be greater than 0".to_string(),
        ));
    }

    if config.crawler.max_concurrent_pages == 0 {
        return Err(ConfigError::Validation(
            "max-concurrent-pages must be greater than 0".to_string(),
        ));
    }

    if config.crawler.request_timeout_secs <= 0.0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be greater than 0".to_string(),
        ));
    }

    if config.crawler.chunk_size == 0 {
        return Err(ConfigError::Validation(
            "chunk-size must be greater than 0".to_string(),
        ));
    }

    if config.crawler.delay_between_requests_secs < 0.0 {
        return Err(ConfigError::Validation(
            "delay-between-requests-secs must not be negative".to_string(),
        ));
    }

    if config.output.download_dir.trim().is_empty() {
        return Err(ConfigError::Validation(
            "download-dir must not be empty".to_string(),
        ));
    }

    if config.anonymity.enabled && config.anonymity.proxy_port == 0 {
        return Err(ConfigError::Validation(
            "anonymity.proxy-port must be set when the anonymity transport is enabled".to_string(),
        ));
    }

    for seed in &config.seeds {
        validate_seed_url(seed)?;
    }

    if let Some(notify) = &config.notify {
        Url::parse(&notify.url)
            .map_err(|_| ConfigError::InvalidUrl(format!("notify.url: {}", notify.url)))?;
    }

    Ok(())
}

/// Validates a single seed URL: absolute, http or https
pub fn validate_seed_url(seed: &str) -> Result<(), ConfigError> {
    let url = Url::parse(seed).map_err(|_| ConfigError::InvalidUrl(seed.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} (seed URLs must be http or https)",
            seed
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!("{} (missing host)", seed)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::Config;

    fn valid_config() -> Config {
        Config {
            seeds: vec!["https://example.com/".to_string()],
            ..Config::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_zero_concurrent_downloads_rejected() {
        let mut config = valid_config();
        config.crawler.max_concurrent_downloads = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = valid_config();
        config.crawler.request_timeout_secs = 0.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = valid_config();
        config.crawler.chunk_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_negative_delay_rejected() {
        let mut config = valid_config();
        config.crawler.delay_between_requests_secs = -1.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_download_dir_rejected() {
        let mut config = valid_config();
        config.output.download_dir = "  ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_seed_url_rejected() {
        let mut config = valid_config();
        config.seeds.push("not a url".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_ftp_seed_rejected() {
        let mut config = valid_config();
        config.seeds = vec!["ftp://example.com/".to_string()];
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_anonymity_enabled_requires_port() {
        let mut config = valid_config();
        config.anonymity.enabled = true;
        config.anonymity.proxy_port = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_retries_is_allowed() {
        let mut config = valid_config();
        config.crawler.max_retries = 0;
        assert!(validate(&config).is_ok());
    }
}
