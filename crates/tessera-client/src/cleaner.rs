use std::sync::Arc;

use htmd::HtmlToMarkdown;
use scraper::{Html, Selector};
use tessera_core::error::AppError;

/// Converts fetched pages to Markdown, dropping page chrome and scripts.
#[derive(Clone)]
pub struct HtmdCleaner {
    converter: Arc<HtmlToMarkdown>,
}

impl HtmdCleaner {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe", "svg",
                "form",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
        }
    }

    pub fn to_markdown(&self, html: &str) -> Result<String, AppError> {
        self.converter
            .convert(html)
            .map(|md| md.trim().to_string())
            .map_err(|e| AppError::Generic(format!("Failed to convert page to markdown: {e}")))
    }
}

impl Default for HtmdCleaner {
    fn default() -> Self {
        Self::new()
    }
}

/// Text of the document's `<title>`, whitespace-collapsed.
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let element = document.select(&selector).next()?;

    let title = element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}
