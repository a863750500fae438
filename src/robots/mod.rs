//! Robots.txt handling module
//!
//! Fetches, parses and caches robots.txt files. Any failure to obtain a
//! robots.txt file is treated as "allow everything".

mod cache;
mod parser;

pub use cache::RobotsCache;
pub use parser::RobotsRules;

use std::time::Duration;
use tracing::debug;

/// Builds the client used for robots.txt requests
pub fn robots_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
}

/// Fetches `{origin}/robots.txt`
///
/// Network errors, non-2xx responses and unreadable bodies all yield
/// [`RobotsRules::allow_all`].
pub async fn fetch_robots(client: &reqwest::Client, origin: &str) -> RobotsRules {
    let url = format!("{}/robots.txt", origin.trim_end_matches('/'));

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!("robots.txt unavailable at {}: {}", url, e);
            return RobotsRules::allow_all();
        }
    };

    if !response.status().is_success() {
        debug!("robots.txt at {} returned {}", url, response.status());
        return RobotsRules::allow_all();
    }

    match response.text().await {
        Ok(body) => RobotsRules::from_content(&body),
        Err(e) => {
            debug!("Failed to read robots.txt at {}: {}", url, e);
            RobotsRules::allow_all()
        }
    }
}
