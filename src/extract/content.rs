//! Content-region selection and per-format extraction helpers

use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use url::Url;

use crate::extract::types::{Heading, Image, StructuredData};

/// Elements that never carry readable content
const JUNK_SELECTOR: &str = "script, style, noscript, iframe, svg, template";

/// Containers tried in order when looking for the main content
const MAIN_CANDIDATES: &[&str] = &[
    "main",
    "article",
    "[role='main']",
    "#content",
    "#main-content",
    ".main-content",
];

/// A candidate region needs at least this much text to be chosen
const MIN_MAIN_TEXT: usize = 200;

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Removes every element matching one of `selectors` from the document
pub fn remove_matching(document: &mut Html, selectors: &[&str]) {
    for css in selectors {
        let Some(sel) = selector(css) else {
            continue;
        };

        let ids: Vec<_> = document.select(&sel).map(|e| e.id()).collect();
        for id in ids {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }
    }
}

/// Removes scripts, styles and similar non-content elements
pub fn strip_junk(document: &mut Html) {
    remove_matching(document, &[JUNK_SELECTOR]);
}

/// Returns the HTML of the main content region
///
/// Tries the usual semantic containers first, then falls back to `<body>`,
/// then to the whole document.
pub fn main_content_html(document: &Html) -> String {
    for css in MAIN_CANDIDATES {
        if let Some(sel) = selector(css) {
            if let Some(element) = document.select(&sel).next() {
                if element_text(element).len() >= MIN_MAIN_TEXT {
                    return element.html();
                }
            }
        }
    }

    body_html(document)
}

/// Returns the `<body>` HTML, or the whole document when there is none
pub fn body_html(document: &Html) -> String {
    selector("body")
        .and_then(|sel| document.select(&sel).next().map(|b| b.html()))
        .unwrap_or_else(|| document.root_element().html())
}

/// Collects the HTML of all elements matching the include selectors
///
/// Returns None when nothing matched so callers can fall back.
pub fn included_html(document: &Html, include_tags: &[String]) -> Option<String> {
    let parts: Vec<String> = include_tags
        .iter()
        .filter_map(|css| selector(css))
        .flat_map(|sel| {
            document
                .select(&sel)
                .map(|e| e.html())
                .collect::<Vec<_>>()
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// Converts HTML to Markdown and tidies blank lines
pub fn html_to_markdown(html: &str) -> Option<String> {
    let markdown = htmd::convert(html).ok()?;

    let mut cleaned = String::with_capacity(markdown.len());
    let mut blank_run = 0;
    for line in markdown.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        cleaned.push_str(line);
        cleaned.push('\n');
    }

    Some(cleaned.trim().to_string())
}

/// Visible text of the body, whitespace-collapsed
pub fn body_text(document: &Html) -> String {
    selector("body")
        .and_then(|sel| document.select(&sel).next())
        .map(element_text)
        .unwrap_or_default()
}

fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let sel = selector(css)?;
    document
        .select(&sel)
        .filter_map(|e| e.value().attr(attr))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// The trimmed `<title>` text
pub fn title(document: &Html) -> Option<String> {
    let sel = selector("title")?;
    document
        .select(&sel)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Meta description, falling back to `og:description`
pub fn description(document: &Html) -> Option<String> {
    first_attr(document, "meta[name='description']", "content")
        .or_else(|| first_attr(document, "meta[property='og:description']", "content"))
}

pub fn language(document: &Html) -> Option<String> {
    first_attr(document, "html", "lang")
}

pub fn canonical_url(document: &Html, base_url: &Url) -> Option<String> {
    first_attr(document, "link[rel='canonical']", "href")
        .and_then(|href| base_url.join(&href).ok())
        .map(|u| u.to_string())
}

pub fn og_image(document: &Html) -> Option<String> {
    first_attr(document, "meta[property='og:image']", "content")
}

pub fn favicon(document: &Html, base_url: &Url) -> Option<String> {
    ["link[rel='icon']", "link[rel='shortcut icon']", "link[rel='apple-touch-icon']"]
        .iter()
        .find_map(|css| first_attr(document, css, "href"))
        .and_then(|href| base_url.join(&href).ok())
        .map(|u| u.to_string())
}

pub fn robots_meta(document: &Html) -> Option<String> {
    first_attr(document, "meta[name='robots']", "content")
}

/// JSON-LD blocks plus OpenGraph, Twitter card and general meta tags
pub fn structured_data(document: &Html) -> StructuredData {
    let mut data = StructuredData::default();

    if let Some(sel) = selector("script[type='application/ld+json']") {
        for script in document.select(&sel) {
            let text: String = script.text().collect();
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim()) {
                data.json_ld.push(value);
            }
        }
    }

    if let Some(sel) = selector("meta") {
        for meta in document.select(&sel) {
            let attrs = meta.value();
            let content = attrs.attr("content").unwrap_or("").to_string();

            if let Some(key) = attrs.attr("property").and_then(|p| p.strip_prefix("og:")) {
                data.open_graph.insert(key.to_string(), content.clone());
            }

            if let Some(key) = attrs.attr("name").and_then(|n| n.strip_prefix("twitter:")) {
                data.twitter_card.insert(key.to_string(), content.clone());
            }

            let name = attrs
                .attr("name")
                .or_else(|| attrs.attr("property"))
                .or_else(|| attrs.attr("http-equiv"));
            if let Some(name) = name {
                if !content.is_empty() {
                    data.meta_tags.insert(name.to_string(), content);
                }
            }
        }
    }

    data
}

/// All non-empty `h1`-`h6` elements in document order
pub fn headings(document: &Html) -> Vec<Heading> {
    let Some(sel) = selector("h1, h2, h3, h4, h5, h6") else {
        return Vec::new();
    };

    document
        .select(&sel)
        .filter_map(|element| {
            let level = element.value().name().get(1..2)?.parse::<u8>().ok()?;
            let text = element_text(element);
            if text.is_empty() {
                return None;
            }
            Some(Heading {
                level,
                text,
                id: element.value().attr("id").map(str::to_string),
            })
        })
        .collect()
}

/// All images with a resolvable `src`
pub fn images(document: &Html, base_url: &Url) -> Vec<Image> {
    let Some(sel) = selector("img[src]") else {
        return Vec::new();
    };

    document
        .select(&sel)
        .filter_map(|img| {
            let attrs = img.value();
            let src = attrs.attr("src")?.trim();
            if src.is_empty() {
                return None;
            }
            let absolute = base_url.join(src).ok()?;
            Some(Image {
                src: absolute.to_string(),
                alt: attrs.attr("alt").unwrap_or("").to_string(),
                width: attrs.attr("width").map(str::to_string),
                height: attrs.attr("height").map(str::to_string),
            })
        })
        .collect()
}

/// Response headers worth keeping in metadata
pub fn useful_headers(headers: &std::collections::HashMap<String, String>) -> BTreeMap<String, String> {
    const KEEP: &[&str] = &[
        "content-type",
        "server",
        "x-powered-by",
        "cache-control",
        "x-robots-tag",
        "last-modified",
        "etag",
    ];

    KEEP.iter()
        .filter_map(|key| headers.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect()
}
