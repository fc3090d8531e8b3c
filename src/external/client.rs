use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};

use super::user_agent::random_user_agent;
use crate::config::ScraperConfig;

/// Build the outbound HTTP client for the parliamentary source.
///
/// One client is built per process and shared by every task, so connections
/// and cookies are reused across list and profile requests.
///
/// - Timeouts from `scraper.request_timeout_secs` / `connect_timeout_secs`
/// - gzip, deflate, brotli and zstd decoding
/// - Cookie store
/// - Fixed `scraper.user_agent`, or a random desktop User-Agent
pub fn build_http_client(config: &ScraperConfig) -> reqwest::Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-CA,en;q=0.8"));

    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| random_user_agent().to_string());

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .gzip(true)
        .deflate(true)
        .brotli(true)
        .zstd(true)
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::limited(5))
        .default_headers(headers)
        .user_agent(user_agent)
        .build()
}
