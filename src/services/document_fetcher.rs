use std::sync::{Arc, LazyLock};

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::external::filing_source::FilingSource;

/// Elements whose text never belongs to the filing body
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "noscript", "template", "head", "title",
];

/// Elements that start a new line in the extracted text
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "tr", "li", "table", "h1", "h2", "h3", "h4", "h5", "h6", "section",
    "article", "ul", "ol", "blockquote", "pre", "hr",
];

static INLINE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\x0B\x0C]+").expect("valid whitespace regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank line regex"));

/// Downloads a filing document and reduces it to normalized plain text
pub struct DocumentFetcher {
    source: Arc<dyn FilingSource>,
    min_chars: usize,
}

impl DocumentFetcher {
    pub fn new(source: Arc<dyn FilingSource>, min_chars: usize) -> Self {
        Self { source, min_chars }
    }

    pub async fn fetch_normalized_text(&self, url: &str) -> Result<String, AppError> {
        let bytes = self.source.fetch_document(url).await?;
        let raw = String::from_utf8_lossy(&bytes);

        let text = if looks_like_markup(&raw) {
            extract_body_text(&raw)
        } else {
            raw.into_owned()
        };
        let normalized = normalize_text(&text);

        let chars = normalized.chars().count();
        info!("📄 Normalized document to {} chars", chars);
        ensure_min_length(&normalized, self.min_chars)?;

        Ok(normalized)
    }
}

/// Markup if the first non-blank character opens a tag, declaration or
/// processing instruction (`<TABLE>`, `<!DOCTYPE`, `<?xml`, `<SEC-DOCUMENT>`).
pub fn looks_like_markup(raw: &str) -> bool {
    let mut chars = raw.trim_start_matches('\u{feff}').trim_start().chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('<'), Some(c)) if c.is_ascii_alphabetic() || c == '!' || c == '?'
    )
}

/// Text content of `<body>` with non-content elements removed
pub fn extract_body_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = Selector::parse("body")
        .ok()
        .and_then(|body| document.select(&body).next())
        .unwrap_or_else(|| document.root_element());

    let mut out = String::with_capacity(html.len() / 4);
    collect_text(root, &mut out);
    out
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return;
    }
    let is_block = BLOCK_ELEMENTS.contains(&name);
    if is_block {
        out.push('\n');
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
            }
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
            }
            _ => {}
        }
    }

    if is_block {
        out.push('\n');
    } else if name == "td" || name == "th" {
        out.push(' ');
    }
}

/// Strips carriage returns, converts non-breaking spaces, collapses runs of
/// whitespace and blank lines, trims.
pub fn normalize_text(text: &str) -> String {
    let text = text.replace('\r', "").replace(['\u{a0}', '\u{202f}'], " ");
    let text = INLINE_WHITESPACE.replace_all(&text, " ");

    let lines: Vec<&str> = text.split('\n').map(str::trim).collect();
    let joined = lines.join("\n");

    BLANK_LINES.replace_all(&joined, "\n\n").trim().to_string()
}

pub fn ensure_min_length(text: &str, min_chars: usize) -> Result<(), AppError> {
    let chars = text.chars().count();
    if chars < min_chars {
        warn!("Document below minimum length: {} < {}", chars, min_chars);
        return Err(AppError::TooShort {
            chars,
            min: min_chars,
        });
    }
    Ok(())
}
