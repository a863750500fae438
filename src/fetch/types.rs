//! Types shared by every fetch strategy

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// The fetch strategies, ordered from cheapest to most expensive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// HTTP client presenting a rotating real-browser header profile
    ImpersonatedClient,
    /// Plain HTTP client
    GenericClient,
    /// Headless Chromium render
    BrowserStandard,
    /// Headless Firefox render
    BrowserAltEngine,
    /// Chromium with simulated interaction and a challenge-wait loop
    BrowserAggressive,
}

impl StrategyKind {
    /// Returns true for strategies that render in a headless browser
    pub fn is_browser(&self) -> bool {
        matches!(
            self,
            Self::BrowserStandard | Self::BrowserAltEngine | Self::BrowserAggressive
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImpersonatedClient => "impersonated_client",
            Self::GenericClient => "generic_client",
            Self::BrowserStandard => "browser_standard",
            Self::BrowserAltEngine => "browser_alt_engine",
            Self::BrowserAggressive => "browser_aggressive",
        }
    }

    /// The default escalation order
    pub fn escalation_order() -> [Self; 5] {
        [
            Self::ImpersonatedClient,
            Self::GenericClient,
            Self::BrowserStandard,
            Self::BrowserAltEngine,
            Self::BrowserAggressive,
        ]
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scripted browser interaction performed before the page is captured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserAction {
    Click { selector: String },
    Wait { milliseconds: u64 },
    Scroll { direction: ScrollDirection, amount: u32 },
    Type { selector: String, text: String },
    Press { key: String },
    Screenshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Per-request fetch parameters
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Upper bound for each individual strategy attempt
    pub timeout: Duration,
    pub actions: Vec<BrowserAction>,
    pub screenshot: bool,
    /// Extra settle time after load (milliseconds)
    pub wait_for_ms: u64,
    /// Route every attempt through one proxy from the pool
    pub use_proxy: bool,
}

impl FetchOptions {
    /// Returns true if only a real browser can satisfy the request
    pub fn needs_browser(&self) -> bool {
        !self.actions.is_empty() || self.screenshot || self.wait_for_ms > 0
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            actions: Vec::new(),
            screenshot: false,
            wait_for_ms: 0,
            use_proxy: false,
        }
    }
}

/// A fetched page before extraction
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub body: String,
    /// Lowercased response header names
    pub headers: HashMap<String, String>,
    /// Base64 PNG captured by the browser
    pub screenshot: Option<String>,
    /// Screenshots taken by `BrowserAction::Screenshot` steps
    pub action_screenshots: Vec<String>,
}

impl RawPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }
}
