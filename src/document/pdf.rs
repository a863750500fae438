//! PDF text via poppler's command-line tools

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

use super::{markdown_header, non_empty, Document, DocumentError};

/// Page separator emitted by `pdftotext`
const FORM_FEED: char = '\u{c}';

fn command_output(tool: &'static str, output: std::io::Result<Output>) -> Result<String, DocumentError> {
    match output {
        Ok(output) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(output) => Err(DocumentError::ToolFailed {
            tool,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(DocumentError::ToolMissing { tool }),
        Err(e) => Err(DocumentError::Io(e)),
    }
}

/// Parses `Key: value` lines from `pdfinfo`
fn parse_pdfinfo(info: &str) -> BTreeMap<String, String> {
    info.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let value = value.trim();
            (!value.is_empty()).then(|| (key.trim().to_ascii_lowercase().replace(' ', "_"), value.to_string()))
        })
        .collect()
}

/// Splits `pdftotext` output into the text of each non-blank page
fn split_pages(text: &str) -> Vec<String> {
    text.split(FORM_FEED)
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builds a [`Document`] from `pdftotext` output and `pdfinfo` fields
fn build_document(text: &str, mut info: BTreeMap<String, String>) -> Document {
    let pages = split_pages(text);
    let full_text = pages.join("\n\n");
    let word_count = full_text.split_whitespace().count();
    let page_count = info
        .get("pages")
        .and_then(|pages| pages.parse().ok())
        .unwrap_or(pages.len());

    let title = info.remove("title").and_then(non_empty);
    let author = info.remove("author").and_then(non_empty);

    let mut parts = markdown_header(
        title.as_deref().unwrap_or("PDF Document"),
        author.as_deref(),
        Some(format!("**Pages:** {} | **Words:** {}", page_count, word_count)),
    );
    for (i, page) in pages.iter().enumerate() {
        parts.push(format!("## Page {}", i + 1));
        parts.push(page.clone());
    }

    info.insert("page_count".to_string(), page_count.to_string());
    info.remove("pages");

    Document {
        title,
        author,
        text: full_text,
        markdown: parts.join("\n\n"),
        page_count,
        word_count,
        properties: info,
    }
}

/// Extracts text and document info from PDF bytes
///
/// The bytes are written to a temporary file for `pdftotext` and `pdfinfo`.
/// A missing `pdfinfo` only loses the metadata; a missing `pdftotext` is an
/// error.
pub async fn extract_pdf(bytes: &[u8]) -> Result<Document, DocumentError> {
    let file = tempfile::Builder::new().suffix(".pdf").tempfile()?;
    tokio::fs::write(file.path(), bytes).await?;

    let text = command_output(
        "pdftotext",
        Command::new("pdftotext")
            .args(["-layout", "-enc", "UTF-8"])
            .arg(file.path())
            .arg("-")
            .output()
            .await,
    )?;

    let info = match command_output("pdfinfo", Command::new("pdfinfo").arg(file.path()).output().await) {
        Ok(info) => parse_pdfinfo(&info),
        Err(e) => {
            debug!("No PDF metadata: {}", e);
            BTreeMap::new()
        }
    };

    Ok(build_document(&text, info))
}
