//! Content extraction
//!
//! Turns a fetched [`RawPage`] into a [`PageContent`] holding the requested
//! formats plus metadata that is always computed. Extraction is pure: no I/O.

mod content;
mod links;
mod types;

use scraper::Html;
use url::Url;

use crate::fetch::RawPage;

pub use links::{extract_links, extract_links_from_html, resolve_link};
pub use types::{Format, Heading, Image, PageContent, PageMetadata, StructuredData};

/// Words per minute used for reading-time estimates
const WORDS_PER_MINUTE: usize = 200;

/// Knobs that shape which part of the page is extracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Restrict html/markdown to the main content region
    pub only_main_content: bool,
    /// CSS selectors whose matches alone form the content
    pub include_tags: Vec<String>,
    /// CSS selectors removed before extraction
    pub exclude_tags: Vec<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            only_main_content: true,
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
        }
    }
}

/// Extracts `formats` from `page` using default tag filters
pub fn extract(page: &RawPage, formats: &[Format], only_main_content: bool) -> PageContent {
    let options = ExtractOptions {
        only_main_content,
        ..ExtractOptions::default()
    };
    extract_with(page, formats, &options)
}

/// Extracts `formats` from `page`
///
/// Metadata is filled regardless of the requested formats. A missing
/// screenshot simply leaves the field empty.
pub fn extract_with(page: &RawPage, formats: &[Format], options: &ExtractOptions) -> PageContent {
    let wants = |format: Format| formats.contains(&format);

    let base_url = Url::parse(&page.url).ok();
    let mut document = Html::parse_document(&page.body);

    let mut result = PageContent {
        metadata: build_metadata(page, &document, base_url.as_ref()),
        ..PageContent::default()
    };

    // Link, image and structured-data extraction look at the untouched document
    if wants(Format::Links) {
        result.links = Some(
            base_url
                .as_ref()
                .map(|base| extract_links(&document, base))
                .unwrap_or_default(),
        );
    }
    if wants(Format::StructuredData) {
        result.structured_data = Some(content::structured_data(&document));
    }
    if wants(Format::Headings) {
        result.headings = Some(content::headings(&document));
    }
    if wants(Format::Images) {
        result.images = Some(
            base_url
                .as_ref()
                .map(|base| content::images(&document, base))
                .unwrap_or_default(),
        );
    }
    if wants(Format::RawHtml) {
        result.raw_html = Some(page.body.clone());
    }
    if wants(Format::Screenshot) {
        result.screenshot = page
            .screenshot
            .clone()
            .or_else(|| page.action_screenshots.last().cloned());
    }

    if wants(Format::Html) || wants(Format::Markdown) {
        let cleaned = cleaned_html(&mut document, options);
        if wants(Format::Markdown) {
            result.markdown = content::html_to_markdown(&cleaned);
        }
        if wants(Format::Html) {
            result.html = Some(cleaned);
        }
    }

    result
}

fn cleaned_html(document: &mut Html, options: &ExtractOptions) -> String {
    content::strip_junk(document);

    let excluded: Vec<&str> = options.exclude_tags.iter().map(String::as_str).collect();
    content::remove_matching(document, &excluded);

    if !options.include_tags.is_empty() {
        if let Some(html) = content::included_html(document, &options.include_tags) {
            return html;
        }
    }

    if options.only_main_content {
        content::main_content_html(document)
    } else {
        content::body_html(document)
    }
}

fn build_metadata(page: &RawPage, document: &Html, base_url: Option<&Url>) -> PageMetadata {
    let text = content::body_text(document);
    let word_count = text.split_whitespace().count();

    PageMetadata {
        source_url: page.url.clone(),
        status_code: page.status,
        title: content::title(document),
        description: content::description(document),
        language: content::language(document),
        canonical_url: base_url.and_then(|base| content::canonical_url(document, base)),
        og_image: content::og_image(document),
        favicon: base_url.and_then(|base| content::favicon(document, base)),
        robots: content::robots_meta(document),
        word_count,
        reading_time_seconds: reading_time_seconds(word_count),
        content_length: page.body.len(),
        strategy: None,
        elapsed_ms: None,
        response_headers: content::useful_headers(&page.headers),
    }
}

/// Minutes of reading at 200 wpm, rounded up, in seconds
pub fn reading_time_seconds(word_count: usize) -> u64 {
    (word_count.div_ceil(WORDS_PER_MINUTE) * 60) as u64
}
