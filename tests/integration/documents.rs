//! PDF and DOCX URLs through the scraper

use crate::common::{http_escalator, page, policy, ScriptedStrategy};
use harvest_engine::extract::Format;
use harvest_engine::fetch::{FetchEscalator, FetchStrategy, StrategyKind};
use harvest_engine::scrape::{ScrapeOptions, Scraper};
use std::io::{Cursor, Write};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

const DOCX_TYPE: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

fn docx() -> Vec<u8> {
    let body = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
        <w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t>Budget</w:t></w:r></w:p>
        <w:p><w:r><w:t>Spending stayed flat this year.</w:t></w:r></w:p>
        </w:body></w:document>"#;
    let core = r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/">
        <dc:title>Council Minutes</dc:title><dc:creator>City Clerk</dc:creator></cp:coreProperties>"#;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in [("word/document.xml", body), ("docProps/core.xml", core)] {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[tokio::test]
async fn test_docx_url_is_extracted_without_escalation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/minutes.docx"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(docx())
                .insert_header("content-type", DOCX_TYPE),
        )
        .mount(&server)
        .await;

    let html_strategy = ScriptedStrategy::serving(StrategyKind::GenericClient, page("html", &[]));
    let escalator = Arc::new(FetchEscalator::new(
        vec![Arc::clone(&html_strategy) as Arc<dyn FetchStrategy>],
        policy(),
    ));
    let scraper = Scraper::new(escalator);
    let options = ScrapeOptions::default().with_format(Format::StructuredData);

    let result = scraper
        .scrape(&format!("{}/files/minutes.docx", server.uri()), &options, None)
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(html_strategy.calls(), 0);

    let content = result.content.unwrap();
    let markdown = content.markdown.unwrap();
    assert!(markdown.starts_with("# Council Minutes\n\n**Author:** City Clerk"));
    assert!(markdown.contains("## Budget\n\nSpending stayed flat this year."));
    assert_eq!(content.metadata.title.as_deref(), Some("Council Minutes"));
    assert_eq!(content.metadata.word_count, 6);
    assert_eq!(
        content.structured_data.unwrap().meta_tags.get("document_type").map(String::as_str),
        Some("docx")
    );
}

#[tokio::test]
async fn test_missing_document_is_a_failed_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let scraper = Scraper::new(http_escalator());
    let result = scraper
        .scrape(&format!("{}/report.pdf", server.uri()), &ScrapeOptions::default(), None)
        .await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("HTTP 404"));
}

#[tokio::test]
async fn test_corrupt_docx_is_a_failed_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"definitely not a zip".to_vec())
                .insert_header("content-type", DOCX_TYPE),
        )
        .mount(&server)
        .await;

    let scraper = Scraper::new(http_escalator());
    let result = scraper
        .scrape(&format!("{}/broken.docx", server.uri()), &ScrapeOptions::default(), None)
        .await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("Corrupt docx"));
}
