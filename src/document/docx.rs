//! DOCX text straight from the OOXML parts

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

use super::{markdown_header, non_empty, Document, DocumentError, DocumentKind};

const BODY_PART: &str = "word/document.xml";
const CORE_PART: &str = "docProps/core.xml";

#[derive(Debug, Clone, PartialEq)]
enum Block {
    Paragraph { style: Option<String>, text: String },
    Table(Vec<Vec<String>>),
}

fn corrupt(message: impl ToString) -> DocumentError {
    DocumentError::Corrupt {
        kind: DocumentKind::Docx,
        message: message.to_string(),
    }
}

fn style_value(element: &BytesStart) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == b"val")
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Walks `word/document.xml` into paragraphs and tables, in body order
///
/// Nested tables are flattened into the text of the enclosing cell.
fn parse_body(xml: &str) -> Result<Vec<Block>, DocumentError> {
    let mut reader = Reader::from_str(xml);
    let mut blocks = Vec::new();

    let mut paragraph = String::new();
    let mut style: Option<String> = None;
    let mut in_text = false;

    let mut table_depth = 0usize;
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();

    loop {
        match reader.read_event().map_err(corrupt)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => {
                    paragraph.clear();
                    style = None;
                }
                b"pStyle" => style = style_value(&e),
                b"t" => in_text = true,
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        rows.clear();
                    }
                }
                b"tr" if table_depth == 1 => row.clear(),
                b"tc" if table_depth == 1 => cell.clear(),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"pStyle" => style = style_value(&e),
                b"tab" => paragraph.push('\t'),
                b"br" | b"cr" => paragraph.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                paragraph.push_str(&t.unescape().map_err(corrupt)?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = paragraph.trim().to_string();
                    if table_depth > 0 {
                        if !text.is_empty() {
                            if !cell.is_empty() {
                                cell.push(' ');
                            }
                            cell.push_str(&text);
                        }
                    } else if !text.is_empty() {
                        blocks.push(Block::Paragraph {
                            style: style.take(),
                            text,
                        });
                    }
                }
                b"tc" if table_depth == 1 => row.push(std::mem::take(&mut cell)),
                b"tr" if table_depth == 1 => rows.push(std::mem::take(&mut row)),
                b"tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 && !rows.is_empty() {
                        blocks.push(Block::Table(std::mem::take(&mut rows)));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(blocks)
}

/// Reads Dublin Core properties from `docProps/core.xml`
fn parse_core(xml: &str) -> Result<BTreeMap<String, String>, DocumentError> {
    let mut reader = Reader::from_str(xml);
    let mut properties = BTreeMap::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event().map_err(corrupt)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                current = match name.as_str() {
                    "title" | "subject" | "creator" | "created" | "modified" | "lastModifiedBy"
                    | "revision" | "keywords" => Some(name),
                    _ => None,
                };
            }
            Event::Text(t) => {
                if let Some(key) = &current {
                    if let Some(value) = non_empty(t.unescape().map_err(corrupt)?.into_owned()) {
                        properties.insert(key.clone(), value);
                    }
                }
            }
            Event::End(_) => current = None,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(properties)
}

/// Markdown prefix for a paragraph style id such as `Heading2` or `ListBullet`
fn style_prefix(style: Option<&str>) -> &'static str {
    let Some(style) = style else { return "" };
    let style = style.to_ascii_lowercase().replace(' ', "");
    match style.as_str() {
        "heading1" => "# ",
        "heading2" => "## ",
        "heading3" => "### ",
        "heading4" => "#### ",
        "listbullet" => "- ",
        "listnumber" => "1. ",
        _ => "",
    }
}

fn render_table(rows: &[Vec<String>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (i, row) in rows.iter().enumerate() {
        lines.push(format!("| {} |", row.join(" | ")));
        if i == 0 {
            lines.push(format!("| {} |", vec!["---"; row.len()].join(" | ")));
        }
    }
    lines.join("\n")
}

fn read_part(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Option<String>, DocumentError> {
    let mut part = match archive.by_name(name) {
        Ok(part) => part,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(corrupt(e)),
    };
    let mut xml = String::new();
    part.read_to_string(&mut xml).map_err(corrupt)?;
    Ok(Some(xml))
}

/// Extracts paragraphs, headings, lists and tables from DOCX bytes
///
/// Blocking; run it off the async executor.
pub fn extract_docx(bytes: &[u8]) -> Result<Document, DocumentError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(corrupt)?;

    let body = read_part(&mut archive, BODY_PART)?
        .ok_or_else(|| corrupt(format!("missing {}", BODY_PART)))?;
    let blocks = parse_body(&body)?;
    let mut properties = match read_part(&mut archive, CORE_PART)? {
        Some(core) => parse_core(&core)?,
        None => BTreeMap::new(),
    };

    let title = properties.remove("title");
    let author = properties.remove("creator");

    let mut text_parts = Vec::new();
    let mut parts = markdown_header(title.as_deref().unwrap_or("Document"), author.as_deref(), None);
    let mut paragraph_count = 0;
    let mut table_count = 0;

    for block in &blocks {
        match block {
            Block::Paragraph { style, text } => {
                paragraph_count += 1;
                text_parts.push(text.clone());
                parts.push(format!("{}{}", style_prefix(style.as_deref()), text));
            }
            Block::Table(rows) => {
                table_count += 1;
                text_parts.extend(rows.iter().flatten().filter(|c| !c.is_empty()).cloned());
                parts.push(render_table(rows));
            }
        }
    }

    let text = text_parts.join("\n");
    let word_count = text.split_whitespace().count();
    properties.insert("paragraph_count".to_string(), paragraph_count.to_string());
    properties.insert("table_count".to_string(), table_count.to_string());

    Ok(Document {
        title,
        author,
        text,
        markdown: parts.join("\n\n"),
        page_count: 1,
        word_count,
        properties,
    })
}
