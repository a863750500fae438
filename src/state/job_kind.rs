use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a job performs
///
/// Each kind has its own queue and worker budget, and doubles as the
/// operation class for rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Scrape,
    Crawl,
    Batch,
    Search,
    Map,
}

impl JobKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Scrape => "scrape",
            Self::Crawl => "crawl",
            Self::Batch => "batch",
            Self::Search => "search",
            Self::Map => "map",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "scrape" => Some(Self::Scrape),
            "crawl" => Some(Self::Crawl),
            "batch" => Some(Self::Batch),
            "search" => Some(Self::Search),
            "map" => Some(Self::Map),
            _ => None,
        }
    }

    pub fn all() -> [Self; 5] {
        [Self::Scrape, Self::Crawl, Self::Batch, Self::Search, Self::Map]
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
