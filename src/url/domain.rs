use url::Url;

/// Strips a leading `www.` label so `www.example.com` and `example.com`
/// compare as the same site
pub fn site_host(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Checks whether `candidate` belongs to the same site as `base`
///
/// With `include_subdomains`, any subdomain of the base host also counts
/// (`docs.example.com` is on the same site as `example.com`). The `www.`
/// prefix is ignored on both sides.
///
/// # Arguments
///
/// * `base` - The host the crawl or map started from
/// * `candidate` - The host of a discovered link
/// * `include_subdomains` - Whether subdomains of `base` are accepted
pub fn is_same_site(base: &str, candidate: &str, include_subdomains: bool) -> bool {
    let base = site_host(base);
    let candidate = site_host(candidate);

    if base.eq_ignore_ascii_case(candidate) {
        return true;
    }

    include_subdomains
        && candidate.len() > base.len()
        && candidate.to_ascii_lowercase().ends_with(&format!(".{}", base.to_ascii_lowercase()))
}

/// Returns `scheme://host[:port]` for a URL
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}
