//! HTML-to-text cleanup of entry text fields.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use super::value::FeedValue;

/// Inputs above this size are not converted (2MB).
const MAX_HTML_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum HtmlCleanupError {
    #[error("HTML too large to convert: {0} bytes")]
    TooLarge(usize),
    #[error("HTML conversion failed: {0}")]
    Conversion(String),
}

/// Converts an HTML fragment into readable plain text.
pub trait HtmlConverter: Send + Sync {
    fn convert(&self, html: &str) -> Result<String, HtmlCleanupError>;
}

/// Tag-stripping converter that keeps paragraph and list structure.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextConverter;

struct Patterns {
    hidden: Regex,
    line_break: Regex,
    block: Regex,
    list_item: Regex,
    tag: Regex,
    trailing_space: Regex,
    blank_lines: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        hidden: Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>")
            .expect("valid regex"),
        line_break: Regex::new(r"(?i)<br\s*/?>").expect("valid regex"),
        block: Regex::new(r"(?i)</?(p|div|h[1-6]|tr|blockquote|ul|ol|pre|table)\b[^>]*>")
            .expect("valid regex"),
        list_item: Regex::new(r"(?i)<li\b[^>]*>").expect("valid regex"),
        tag: Regex::new(r"(?s)<[^>]*>").expect("valid regex"),
        trailing_space: Regex::new(r"[ \t]+\n").expect("valid regex"),
        blank_lines: Regex::new(r"\n{3,}").expect("valid regex"),
    })
}

impl HtmlConverter for PlainTextConverter {
    fn convert(&self, html: &str) -> Result<String, HtmlCleanupError> {
        if html.len() > MAX_HTML_SIZE {
            return Err(HtmlCleanupError::TooLarge(html.len()));
        }

        let p = patterns();
        let text = p.hidden.replace_all(html, "");
        let text = p.line_break.replace_all(&text, "\n");
        let text = p.block.replace_all(&text, "\n\n");
        let text = p.list_item.replace_all(&text, "\n* ");
        let text = p.tag.replace_all(&text, "");
        // Entities last, so decoded `&lt;` is never mistaken for markup.
        let text = html_escape::decode_html_entities(&text);
        let text = text.replace('\u{a0}', " ");
        let text = p.trailing_space.replace_all(&text, "\n");
        let text = p.blank_lines.replace_all(&text, "\n\n");

        Ok(text.trim().to_string())
    }
}

fn is_html(detail: &FeedValue) -> bool {
    detail
        .get("type")
        .and_then(FeedValue::as_str)
        .map_or(true, |t| t == "text/html")
}

/// Replace the HTML text fields of `entry` with plain text.
///
/// Touches `content[].value`, `summary` and `summary_detail.value`. A field
/// that fails to convert keeps its original value.
pub fn clean_entry(entry: &mut FeedValue, converter: &dyn HtmlConverter) {
    let Some(map) = entry.as_mapping_mut() else {
        return;
    };

    if let Some(FeedValue::Sequence(items)) = map.get_mut("content") {
        for item in items.iter_mut() {
            if is_html(item) {
                if let Some(map) = item.as_mapping_mut() {
                    convert_field(map.get_mut("value"), converter, "content");
                }
            }
        }
    }

    convert_field(map.get_mut("summary"), converter, "summary");

    if let Some(detail) = map.get_mut("summary_detail") {
        if is_html(detail) {
            if let Some(map) = detail.as_mapping_mut() {
                convert_field(map.get_mut("value"), converter, "summary_detail");
            }
        }
    }
}

fn convert_field(slot: Option<&mut FeedValue>, converter: &dyn HtmlConverter, field: &str) {
    let Some(FeedValue::Scalar(value)) = slot else {
        return;
    };
    if value.is_empty() {
        return;
    }

    match converter.convert(value) {
        Ok(text) => *value = text,
        Err(e) => {
            tracing::warn!(field = field, error = %e, "Unable to convert the HTML content");
        }
    }
}
