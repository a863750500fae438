//! robots.txt rule matching on top of the robotstxt crate

use robotstxt::DefaultMatcher;

/// Rules from one site's robots.txt
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    /// Raw robots.txt body; None means everything is allowed
    content: Option<String>,
}

impl RobotsRules {
    pub fn from_content(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
        }
    }

    /// Rules that allow every URL, used whenever robots.txt is unavailable
    pub fn allow_all() -> Self {
        Self { content: None }
    }

    /// True when there are no rules at all, so matching can be skipped
    pub fn is_allow_all(&self) -> bool {
        self.content.as_deref().map_or(true, |c| c.trim().is_empty())
    }

    /// Checks whether `url` may be fetched by `user_agent`
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        match self.content.as_deref() {
            Some(content) if !self.is_allow_all() => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(content, user_agent, url)
            }
            _ => true,
        }
    }
}
