//! Outbound proxy selection

use rand::seq::SliceRandom;
use serde::Serialize;
use url::Url;

use crate::ConfigError;

/// One outbound proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proxy {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Proxy {
    /// Parses `scheme://[user:pass@]host[:port]`; the port defaults to 8080
    pub fn from_url(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy URL '{}': {}", raw, e)))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::InvalidUrl(format!("Proxy URL '{}' has no host", raw)))?
            .to_string();

        let username = Some(url.username())
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        Ok(Self {
            protocol: url.scheme().to_string(),
            host,
            port: url.port().unwrap_or(8080),
            username,
            password: url.password().map(str::to_string),
        })
    }

    /// `scheme://host:port` without credentials, as browsers expect it
    pub fn server(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    /// Full proxy URL including credentials, as HTTP clients expect it
    pub fn to_url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!(
                "{}://{}:{}@{}:{}",
                self.protocol, user, pass, self.host, self.port
            ),
            _ => self.server(),
        }
    }

    /// Builds the reqwest proxy for this entry
    pub fn to_reqwest(&self) -> Result<reqwest::Proxy, reqwest::Error> {
        let proxy = reqwest::Proxy::all(self.server())?;
        Ok(match (&self.username, &self.password) {
            (Some(user), Some(pass)) => proxy.basic_auth(user, pass),
            _ => proxy,
        })
    }

    /// Proxy URL with the credentials masked, for logs
    pub fn masked(&self) -> String {
        match &self.username {
            Some(user) => {
                let prefix: String = user.chars().take(2).collect();
                format!(
                    "{}://{}***:***@{}:{}",
                    self.protocol, prefix, self.host, self.port
                )
            }
            None => self.server(),
        }
    }
}

/// A set of proxies picked from uniformly at random
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    proxies: Vec<Proxy>,
}

impl ProxyPool {
    pub fn new(proxies: Vec<Proxy>) -> Self {
        Self { proxies }
    }

    /// Builds a pool from proxy URLs, skipping blank entries
    pub fn from_urls(urls: &[String]) -> Result<Self, ConfigError> {
        let proxies = urls
            .iter()
            .filter(|u| !u.trim().is_empty())
            .map(|u| Proxy::from_url(u))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { proxies })
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn pick(&self) -> Option<&Proxy> {
        self.proxies.choose(&mut rand::thread_rng())
    }
}
