//! Sitemap discovery and `<loc>` extraction

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

/// Sub-sitemaps followed from one sitemap index
const MAX_CHILD_SITEMAPS: usize = 50;

/// Well-known sitemap locations relative to the origin
const SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml"];

/// The `<loc>` entries of one sitemap document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sitemap {
    /// True when the root element is `<sitemapindex>`
    pub is_index: bool,
    /// Entry URLs in document order
    pub locs: Vec<String>,
}

/// Parses a `<urlset>` or `<sitemapindex>` document
///
/// Element names are matched case-insensitively and without namespace
/// prefixes. Text may be plain, entity-escaped or CDATA. Parsing stops at
/// the first XML error, keeping the entries read so far.
pub fn parse_sitemap(xml: &str) -> Sitemap {
    let mut reader = Reader::from_str(xml);
    let mut sitemap = Sitemap::default();
    let mut seen_root = false;
    let mut loc: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if !seen_root {
                    seen_root = true;
                    sitemap.is_index = name.as_ref().eq_ignore_ascii_case(b"sitemapindex");
                }
                if name.as_ref().eq_ignore_ascii_case(b"loc") {
                    loc = Some(String::new());
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(loc) = loc.as_mut() {
                    match t.unescape() {
                        Ok(text) => loc.push_str(&text),
                        Err(e) => debug!("Bad escape in sitemap <loc>: {}", e),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(loc) = loc.as_mut() {
                    loc.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref().eq_ignore_ascii_case(b"loc") {
                    if let Some(value) = loc.take() {
                        let value = value.trim();
                        if !value.is_empty() {
                            sitemap.locs.push(value.to_string());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!(
                    "Malformed sitemap at byte {}: {}",
                    reader.buffer_position(),
                    e
                );
                break;
            }
            _ => {}
        }
    }

    sitemap
}

/// `Sitemap:` lines from a robots.txt body
pub fn robots_sitemaps(robots: &str) -> Vec<String> {
    robots
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("sitemap")
                .then(|| value.trim().to_string())
        })
        .filter(|url| !url.is_empty())
        .collect()
}

async fn fetch_text(client: &reqwest::Client, url: &str) -> Option<String> {
    let response = match client.get(url).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            debug!("{} returned {}", url, response.status());
            return None;
        }
        Err(e) => {
            debug!("Failed to fetch {}: {}", url, e);
            return None;
        }
    };
    response.text().await.ok()
}

/// Collects page URLs from an origin's sitemaps
///
/// Looks at the well-known locations plus any `Sitemap:` lines in
/// robots.txt, and follows one level of sitemap index. Unreachable or
/// malformed sitemaps are skipped. Every request goes through `client`.
pub async fn discover_sitemap_urls(client: &reqwest::Client, origin: &str) -> Vec<String> {
    let origin = origin.trim_end_matches('/');
    let mut sitemaps: Vec<String> = SITEMAP_PATHS
        .iter()
        .map(|path| format!("{}{}", origin, path))
        .collect();

    if let Some(robots) = fetch_text(client, &format!("{}/robots.txt", origin)).await {
        for sitemap in robots_sitemaps(&robots) {
            if !sitemaps.contains(&sitemap) {
                sitemaps.push(sitemap);
            }
        }
    }

    let mut urls = Vec::new();
    for sitemap in &sitemaps {
        let Some(xml) = fetch_text(client, sitemap).await else {
            continue;
        };

        let parsed = parse_sitemap(&xml);
        if !parsed.is_index {
            urls.extend(parsed.locs);
            continue;
        }

        for child in parsed.locs.into_iter().take(MAX_CHILD_SITEMAPS) {
            if let Some(child_xml) = fetch_text(client, &child).await {
                let child = parse_sitemap(&child_xml);
                // Only one level of nesting is followed
                if !child.is_index {
                    urls.extend(child.locs);
                }
            }
        }
    }

    debug!("Found {} sitemap URLs for {}", urls.len(), origin);
    urls
}
