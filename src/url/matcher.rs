use regex::Regex;

use crate::ConfigError;

/// Checks if a domain matches a wildcard pattern
///
/// This function supports two types of patterns:
/// 1. Exact match: "example.com" matches only "example.com"
/// 2. Wildcard match: "*.example.com" matches:
///    - "example.com" (the bare domain)
///    - "blog.example.com" (single subdomain)
///    - "api.v2.example.com" (nested subdomains)
///
/// Comparison is case-insensitive.
///
/// # Examples
///
/// ```
/// use harvest_engine::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(!matches_wildcard("example.com", "other.com"));
///
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let candidate = candidate.to_ascii_lowercase();

    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Checks whether a host falls under any pattern of a domain list
///
/// Plain entries also cover their subdomains, so listing `linkedin.com`
/// matches `www.linkedin.com`.
pub fn matches_any_domain(patterns: &[String], host: &str) -> bool {
    patterns.iter().any(|pattern| {
        if pattern.starts_with("*.") {
            matches_wildcard(pattern, host)
        } else {
            matches_wildcard(&format!("*.{}", pattern), host)
        }
    })
}

/// A compiled shell-style glob matched against URL paths
///
/// `*` and `**` match any run of characters (slashes included), `?` matches
/// exactly one character. Everything else is literal. The whole path must
/// match.
#[derive(Debug, Clone)]
pub struct PathGlob {
    pattern: String,
    regex: Regex,
}

impl PathGlob {
    /// Compiles a glob pattern
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` if the translated expression
    /// does not compile
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let mut expr = String::with_capacity(pattern.len() * 2 + 2);
        expr.push('^');

        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    while chars.peek() == Some(&'*') {
                        chars.next();
                    }
                    expr.push_str(".*");
                }
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr)
            .map_err(|e| ConfigError::InvalidPattern(format!("{}: {}", pattern, e)))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Returns true if the path matches this glob
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// The source pattern
    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// Compiles a list of glob patterns
pub fn compile_globs(patterns: &[String]) -> Result<Vec<PathGlob>, ConfigError> {
    patterns.iter().map(|p| PathGlob::new(p)).collect()
}
