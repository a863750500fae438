//! Non-HTML documents: detection, download and text extraction
//!
//! PDFs go through poppler's `pdftotext`/`pdfinfo`; DOCX files are read
//! directly from their zip container. Both end up as a [`Document`] with a
//! markdown rendering.

mod docx;
mod pdf;

pub use docx::extract_docx;
pub use pdf::extract_pdf;

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::fetch::{build_http_client, classify_error, Proxy};
use crate::FetchError;

/// Largest document body accepted for extraction
pub const MAX_DOCUMENT_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    /// Detects a document from the URL path's extension alone
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        if path.ends_with(".pdf") {
            Some(Self::Pdf)
        } else if path.ends_with(".docx") || path.ends_with(".doc") {
            Some(Self::Docx)
        } else {
            None
        }
    }

    fn from_content_type(content_type: &str) -> Option<Self> {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.contains("application/pdf") {
            Some(Self::Pdf)
        } else if content_type
            .contains("application/vnd.openxmlformats-officedocument.wordprocessingml")
            || content_type.contains("application/msword")
        {
            Some(Self::Docx)
        } else {
            None
        }
    }

    fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            Some(Self::Pdf)
        } else if bytes.starts_with(b"PK\x03\x04") {
            Some(Self::Docx)
        } else {
            None
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether a response is a document, and which kind
///
/// The URL extension wins, then the content type, then magic bytes. An
/// explicit HTML content type rules out the magic-byte check.
pub fn detect_document(url: &str, content_type: Option<&str>, bytes: &[u8]) -> Option<DocumentKind> {
    if let Some(kind) = DocumentKind::from_url(url) {
        return Some(kind);
    }
    if let Some(content_type) = content_type {
        if let Some(kind) = DocumentKind::from_content_type(content_type) {
            return Some(kind);
        }
        let lowered = content_type.to_ascii_lowercase();
        if lowered.contains("text/html") || lowered.contains("application/xhtml") {
            return None;
        }
    }
    DocumentKind::from_magic(bytes)
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("{tool} is not available (install poppler-utils)")]
    ToolMissing { tool: &'static str },

    #[error("{tool} failed: {message}")]
    ToolFailed { tool: &'static str, message: String },

    #[error("Corrupt {kind} document: {message}")]
    Corrupt { kind: DocumentKind, message: String },

    #[error("Document is {size} bytes, above the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Text and properties pulled out of a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub title: Option<String>,
    pub author: Option<String>,
    pub text: String,
    pub markdown: String,
    pub page_count: usize,
    pub word_count: usize,
    /// Document properties such as subject, creator or dates
    pub properties: BTreeMap<String, String>,
}

/// Extracts `bytes` as a document of `kind`
pub async fn extract_document(kind: DocumentKind, bytes: Vec<u8>) -> Result<Document, DocumentError> {
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(DocumentError::TooLarge {
            size: bytes.len(),
            limit: MAX_DOCUMENT_BYTES,
        });
    }

    match kind {
        DocumentKind::Pdf => extract_pdf(&bytes).await,
        DocumentKind::Docx => tokio::task::spawn_blocking(move || extract_docx(&bytes))
            .await
            .map_err(|e| DocumentError::Corrupt {
                kind,
                message: e.to_string(),
            })?,
    }
}

/// A downloaded response body, kept as bytes
#[derive(Debug, Clone)]
pub struct DownloadedBody {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl DownloadedBody {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Downloads `url` as raw bytes, through `proxy` when given
pub async fn download(
    url: &str,
    timeout: Duration,
    user_agent: Option<&str>,
    proxy: Option<&Proxy>,
) -> Result<DownloadedBody, FetchError> {
    let client = build_http_client(timeout, false, user_agent, proxy)
        .map_err(|e| classify_error(url, timeout, e))?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify_error(url, timeout, e))?;

    let final_url = response.url().to_string();
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| classify_error(url, timeout, e))?;

    Ok(DownloadedBody {
        url: final_url,
        status,
        content_type,
        bytes: bytes.to_vec(),
    })
}

/// Renders the shared markdown preamble: title, byline and counts
fn markdown_header(title: &str, author: Option<&str>, counts: Option<String>) -> Vec<String> {
    let mut parts = vec![format!("# {}", title)];
    if let Some(author) = author {
        parts.push(format!("**Author:** {}", author));
    }
    if let Some(counts) = counts {
        parts.push(counts);
    }
    parts.push("---".to_string());
    parts
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
