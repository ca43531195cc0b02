//! Source → markdown conversion (sec 4.6 step 2). PDF via `pdf-extract`,
//! HTML/URL via `scraper` main-content extraction. URL fetches pass an
//! SSRF guard before any request is issued.

use base64::Engine;
use scraper::{Html, Selector};

use crate::error::{AppError, AppResult};
use crate::models::DocumentType;
use crate::services::connector_service::guard_endpoint;

const STRIPPED_TAGS: &[&str] = &["nav", "script", "style", "img", "svg", "noscript"];
const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// Converts `content` (as stored on the `Document`) to markdown according
/// to `doc_type`. For `Pdf`, `content` is the base64-encoded source bytes.
pub async fn to_markdown(doc_type: DocumentType, content: &str, http: &reqwest::Client) -> AppResult<String> {
    match doc_type {
        DocumentType::Text | DocumentType::Markdown => Ok(content.to_string()),
        DocumentType::Html => Ok(html_to_markdown(content)),
        DocumentType::Pdf => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(content.trim())
                .map_err(|e| AppError::IndexingFailed(format!("invalid base64 pdf content: {e}")))?;
            pdf_to_text(&bytes)
        }
        DocumentType::Url => {
            guard_endpoint(content).await?;
            let html = http
                .get(content)
                .send()
                .await
                .map_err(|e| AppError::IndexingFailed(format!("url fetch failed: {e}")))?
                .text()
                .await
                .map_err(|e| AppError::IndexingFailed(format!("url fetch body failed: {e}")))?;
            Ok(html_to_markdown(&html))
        }
    }
}

fn pdf_to_text(bytes: &[u8]) -> AppResult<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| AppError::IndexingFailed(format!("pdf extraction failed: {e}")))
}

/// Strips nav/script/style/image elements, prefers `<main>` over `<body>`,
/// and flattens headings/paragraphs/lists into a markdown-ish text: heading
/// tags become `#`-prefixed lines, everything else becomes plain
/// paragraphs. This is a lossy, structure-preserving extraction, not a
/// full HTML-to-markdown transpiler.
pub fn html_to_markdown(html: &str) -> String {
    let document = Html::parse_document(html);

    let root_selector = Selector::parse("main").ok().filter(|s| !document.select(s).next().is_none());
    let root = root_selector
        .and_then(|s| document.select(&s).next())
        .or_else(|| Selector::parse("body").ok().and_then(|s| document.select(&s).next()));

    let Some(root) = root else {
        return strip_all_tags(html);
    };

    let mut lines = Vec::new();
    walk(root, &mut lines);
    lines.join("\n\n")
}

fn walk(element: scraper::ElementRef, lines: &mut Vec<String>) {
    for child in element.children() {
        let Some(child_el) = scraper::ElementRef::wrap(child) else { continue };
        let tag = child_el.value().name();
        if STRIPPED_TAGS.contains(&tag) {
            continue;
        }
        if let Some(depth) = HEADING_TAGS.iter().position(|h| *h == tag) {
            let text: String = child_el.text().collect::<Vec<_>>().join(" ");
            let text = text.trim();
            if !text.is_empty() {
                lines.push(format!("{} {}", "#".repeat(depth + 1), text));
            }
            continue;
        }
        if child_el.children().next().is_some() {
            walk(child_el, lines);
        }
        let text: String = child_el
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if !text.is_empty() && child_el.children().all(|c| scraper::ElementRef::wrap(c).is_none()) {
            lines.push(text);
        }
    }
}

fn strip_all_tags(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_markdown_keeps_headings_and_drops_scripts() {
        let html = "<html><body><h1>Title</h1><script>evil()</script><p>Hello world</p></body></html>";
        let markdown = html_to_markdown(html);
        assert!(markdown.contains("# Title"));
        assert!(markdown.contains("Hello world"));
        assert!(!markdown.contains("evil"));
    }

    #[test]
    fn html_to_markdown_prefers_main_over_body() {
        let html = "<html><body><p>outside</p><main><h2>In Main</h2></main></body></html>";
        let markdown = html_to_markdown(html);
        assert!(markdown.contains("## In Main"));
    }
}
