//! URL handling module
//!
//! This module provides URL normalization, same-site checks, wildcard
//! domain matching and path glob matching.

mod domain;
mod matcher;
mod normalize;

pub use domain::{is_same_site, origin_of, site_host};
pub use matcher::{compile_globs, matches_any_domain, matches_wildcard, PathGlob};
pub use normalize::normalize_url;

/// File extensions that never lead to an HTML page
const NON_PAGE_EXTENSIONS: &[&str] = &[
    // images
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".bmp", ".tiff", ".avif",
    // stylesheets and scripts
    ".css", ".js", ".mjs", ".map",
    // documents and archives
    ".pdf", ".zip", ".tar", ".gz", ".tgz", ".bz2", ".7z", ".rar", ".dmg", ".exe",
    // media
    ".mp3", ".mp4", ".wav", ".ogg", ".webm", ".avi", ".mov", ".flac", ".m4a",
    // fonts
    ".woff", ".woff2", ".ttf", ".otf", ".eot",
];

/// Returns true if the path ends in an extension that is not a web page
///
/// # Examples
///
/// ```
/// use harvest_engine::url::has_non_page_extension;
///
/// assert!(has_non_page_extension("/static/logo.PNG"));
/// assert!(!has_non_page_extension("/blog/post"));
/// ```
pub fn has_non_page_extension(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    NON_PAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}
