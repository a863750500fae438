use crate::config::types::{
    BrowserConfig, CacheConfig, Config, FetchConfig, JobsConfig, ProxyConfig, RateLimitConfig,
    StorageConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_browser_config(&config.browser)?;
    validate_cache_config(&config.cache)?;
    validate_rate_limits(&config.rate_limits)?;
    validate_jobs_config(&config.jobs)?;
    validate_storage_config(&config.storage)?;
    validate_proxy_config(&config.proxy)?;
    Ok(())
}

/// Validates fetch escalation configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.sufficient_bytes == 0 {
        return Err(ConfigError::Validation(
            "sufficient-bytes must be > 0".to_string(),
        ));
    }

    if config.partial_bytes > config.sufficient_bytes {
        return Err(ConfigError::Validation(format!(
            "partial-bytes ({}) must not exceed sufficient-bytes ({})",
            config.partial_bytes, config.sufficient_bytes
        )));
    }

    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "timeout-ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    if config.robots_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "robots-timeout-ms must be > 0".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    for pattern in &config.hard_domains {
        validate_domain_pattern(pattern)?;
    }

    Ok(())
}

fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if config.pool_size < 1 || config.pool_size > 64 {
        return Err(ConfigError::Validation(format!(
            "browser pool-size must be between 1 and 64, got {}",
            config.pool_size
        )));
    }

    if let Some(service_url) = &config.service_url {
        let url = Url::parse(service_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid service-url: {}", e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "service-url must be http(s), got '{}'",
                service_url
            )));
        }
    }

    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.enabled && config.ttl_seconds == 0 {
        return Err(ConfigError::Validation(
            "cache ttl-seconds must be > 0 when the cache is enabled".to_string(),
        ));
    }
    Ok(())
}

fn validate_rate_limits(config: &RateLimitConfig) -> Result<(), ConfigError> {
    let limits = [
        ("scrape", config.scrape),
        ("crawl", config.crawl),
        ("batch", config.batch),
        ("search", config.search),
        ("map", config.map),
    ];

    for (name, limit) in limits {
        if limit == 0 {
            return Err(ConfigError::Validation(format!(
                "rate limit for {} must be >= 1 per minute",
                name
            )));
        }
    }

    Ok(())
}

fn validate_jobs_config(config: &JobsConfig) -> Result<(), ConfigError> {
    let workers = [
        ("scrape-workers", config.scrape_workers),
        ("crawl-workers", config.crawl_workers),
        ("batch-workers", config.batch_workers),
        ("search-workers", config.search_workers),
        ("map-workers", config.map_workers),
        ("queue-capacity", config.queue_capacity),
        ("max-batch-size", config.max_batch_size),
        ("max-batch-concurrency", config.max_batch_concurrency),
        ("max-search-results", config.max_search_results),
        ("max-crawl-concurrency", config.max_crawl_concurrency),
    ];

    for (name, value) in workers {
        if value == 0 {
            return Err(ConfigError::Validation(format!("{} must be >= 1", name)));
        }
    }

    if config.max_crawl_pages == 0 {
        return Err(ConfigError::Validation(
            "max-crawl-pages must be >= 1".to_string(),
        ));
    }

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "poll-interval-ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if let Some(path) = &config.database_path {
        if path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database-path cannot be empty".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    for proxy in &config.urls {
        let url = Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy URL '{}': {}", proxy, e)))?;

        if !matches!(url.scheme(), "http" | "https" | "socks5" | "socks5h") {
            return Err(ConfigError::InvalidUrl(format!(
                "Unsupported proxy scheme '{}' in '{}'",
                url.scheme(),
                proxy
            )));
        }

        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(format!(
                "Proxy URL '{}' has no host",
                proxy
            )));
        }
    }
    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)?;
    } else {
        validate_domain_string(pattern)?;
    }

    Ok(())
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}
