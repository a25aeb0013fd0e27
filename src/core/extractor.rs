//! Raw page content to normalized [`Document`].
//!
//! Parsing is best effort. The HTML tree builder repairs unterminated and
//! misnested markup the way browsers do, undecodable bytes are dropped, and
//! only empty or binary input is rejected.
//!
//! Text block heuristic:
//! 1. walk `<body>` in document order;
//! 2. skip the subtrees listed in [`SKIPPED_TAGS`] and hidden elements;
//! 3. block-level tags and `<br>` end the current block;
//! 4. keep a block when it has at least `min_block_chars` characters and at
//!    least one letter or digit.

use crate::core::text::collapse_whitespace;
use crate::domain::model::{Document, FetchResult, PageMeta};
use crate::utils::error::ExtractionError;
use chrono::{DateTime, Utc};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use url::Url;

pub const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "svg", "canvas", "head", "nav", "header",
    "footer", "aside", "form", "button", "select", "option", "textarea",
];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "blockquote", "caption", "dd", "details", "dialog", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "li", "main",
    "ol", "p", "pre", "section", "summary", "table", "tbody", "td", "tfoot", "th", "thead", "tr",
    "ul",
];

const BINARY_CONTENT_TYPES: &[&str] = &[
    "image/",
    "audio/",
    "video/",
    "font/",
    "application/octet-stream",
    "application/pdf",
    "application/zip",
    "application/gzip",
];

const SNIFF_LEN: usize = 1024;
const MAX_DEPTH: usize = 512;

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]*?charset\s*=\s*["']?\s*([a-z0-9_:.\-]+)"#).expect("static pattern")
});

static MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<(!doctype|html|head|body|title|meta|div|p|a|span|br|h[1-6]|ul|ol|li|table|article|section|main|script|style)[\s/>]",
    )
    .expect("static pattern")
});

static BLANK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r\f]*\n").expect("static pattern"));

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub min_block_chars: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { min_block_chars: 2 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Extractor {
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn extract(&self, fetched: FetchResult) -> Result<Document, ExtractionError> {
        self.extract_at(fetched, Utc::now())
    }

    /// Same as [`extract`](Self::extract) with a fixed extraction timestamp.
    pub fn extract_at(
        &self,
        fetched: FetchResult,
        extracted_at: DateTime<Utc>,
    ) -> Result<Document, ExtractionError> {
        let source_url = fetched.effective_url().map(str::to_string);
        let content_type = fetched
            .content_type
            .as_deref()
            .map(|c| c.to_ascii_lowercase());
        let body = fetched.body.unwrap_or_default();

        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ExtractionError::Empty);
        }
        if let Some(ct) = content_type.as_deref() {
            if BINARY_CONTENT_TYPES.iter().any(|b| ct.starts_with(b)) {
                return Err(ExtractionError::NonTextual(format!("content type {}", ct)));
            }
        }
        check_textual(&body)?;

        let (text, encoding) = decode_body(&body, &fetched.encoding);
        if text.trim().is_empty() {
            return Err(ExtractionError::Empty);
        }

        let is_html = match content_type.as_deref() {
            Some(ct) if ct.contains("html") || ct.contains("xml") => true,
            Some(ct) if ct.starts_with("text/plain") => false,
            _ => MARKUP.is_match(&text),
        };

        let base = source_url.as_deref().and_then(|u| Url::parse(u).ok());
        let document = if is_html {
            let page = self.parse_html(&text, base.as_ref());
            Document {
                source_url,
                title: page.title,
                text_blocks: page.blocks,
                links: page.links,
                meta: page.meta,
                language: page.language,
                encoding,
                extracted_at,
            }
        } else {
            Document {
                source_url,
                title: None,
                text_blocks: self.plain_blocks(&text),
                links: BTreeSet::new(),
                meta: PageMeta::default(),
                language: None,
                encoding,
                extracted_at,
            }
        };

        tracing::debug!(
            "Extracted {} block(s), {} link(s) from {} ({})",
            document.text_blocks.len(),
            document.links.len(),
            document.source_url.as_deref().unwrap_or("raw input"),
            document.encoding
        );
        Ok(document)
    }

    fn plain_blocks(&self, text: &str) -> Vec<String> {
        BLANK_LINE
            .split(text)
            .map(collapse_whitespace)
            .filter(|b| keep_block(b, self.options.min_block_chars))
            .collect()
    }

    fn parse_html(&self, html: &str, source: Option<&Url>) -> ParsedPage {
        let document = Html::parse_document(html);

        let meta = page_meta(&document);
        let title = first_text(&document, "title")
            .or_else(|| meta_property(&document, "og:title"))
            .or_else(|| first_text(&document, "h1"));

        let language = document
            .root_element()
            .value()
            .attr("lang")
            .map(|l| l.trim().to_ascii_lowercase())
            .filter(|l| !l.is_empty())
            .or_else(|| meta_http_equiv(&document, "content-language"));

        let root = selector("body")
            .and_then(|s| document.select(&s).next())
            .unwrap_or_else(|| document.root_element());
        let mut collector = BlockCollector {
            blocks: Vec::new(),
            current: String::new(),
            min_chars: self.options.min_block_chars,
        };
        collector.walk(root, 0);
        collector.flush();

        let base = base_url(&document, source);
        let links = collect_links(&document, base.as_ref());

        ParsedPage {
            title,
            blocks: collector.blocks,
            links,
            meta,
            language,
        }
    }
}

struct ParsedPage {
    title: Option<String>,
    blocks: Vec<String>,
    links: BTreeSet<String>,
    meta: PageMeta,
    language: Option<String>,
}

struct BlockCollector {
    blocks: Vec<String>,
    current: String,
    min_chars: usize,
}

impl BlockCollector {
    fn walk(&mut self, element: ElementRef, depth: usize) {
        if depth > MAX_DEPTH {
            return;
        }
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.current.push_str(text),
                Node::Element(el) => {
                    let name = el.name();
                    if SKIPPED_TAGS.contains(&name) || is_hidden(el) {
                        continue;
                    }
                    if name == "br" {
                        self.flush();
                        continue;
                    }
                    let is_block = BLOCK_TAGS.contains(&name);
                    if is_block {
                        self.flush();
                    }
                    if let Some(child_element) = ElementRef::wrap(child) {
                        self.walk(child_element, depth + 1);
                    }
                    if is_block {
                        self.flush();
                    }
                }
                _ => {}
            }
        }
    }

    fn flush(&mut self) {
        let block = collapse_whitespace(&self.current);
        self.current.clear();
        if keep_block(&block, self.min_chars) {
            self.blocks.push(block);
        }
    }
}

fn keep_block(block: &str, min_chars: usize) -> bool {
    block.chars().count() >= min_chars.max(1) && block.chars().any(char::is_alphanumeric)
}

fn is_hidden(el: &scraper::node::Element) -> bool {
    if el.attr("hidden").is_some() {
        return true;
    }
    if el
        .attr("aria-hidden")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    {
        return true;
    }
    el.attr("style").is_some_and(|style| {
        let compact: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        compact.contains("display:none") || compact.contains("visibility:hidden")
    })
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = selector(css)?;
    document
        .select(&selector)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn meta_content<F>(document: &Html, mut matches: F) -> Option<String>
where
    F: FnMut(&scraper::node::Element) -> bool,
{
    let selector = selector("meta[content]")?;
    document
        .select(&selector)
        .filter(|el| matches(el.value()))
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .find(|c| !c.is_empty())
}

fn meta_named(document: &Html, name: &str) -> Option<String> {
    meta_content(document, |el| {
        el.attr("name")
            .is_some_and(|n| n.trim().eq_ignore_ascii_case(name))
    })
}

fn meta_property(document: &Html, property: &str) -> Option<String> {
    meta_content(document, |el| {
        el.attr("property")
            .is_some_and(|p| p.trim().eq_ignore_ascii_case(property))
    })
}

fn meta_http_equiv(document: &Html, header: &str) -> Option<String> {
    meta_content(document, |el| {
        el.attr("http-equiv")
            .is_some_and(|h| h.trim().eq_ignore_ascii_case(header))
    })
    .map(|v| v.to_ascii_lowercase())
}

fn page_meta(document: &Html) -> PageMeta {
    PageMeta {
        description: meta_named(document, "description"),
        keywords: meta_named(document, "keywords"),
    }
}

fn base_url(document: &Html, source: Option<&Url>) -> Option<Url> {
    let declared = selector("base[href]")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| match source {
            Some(src) => src.join(href.trim()).ok(),
            None => Url::parse(href.trim()).ok(),
        });
    declared.or_else(|| source.cloned())
}

/// Resolves a link target to an absolute http(s) URL without fragment.
pub fn resolve_link(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let mut url = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

fn collect_links(document: &Html, base: Option<&Url>) -> BTreeSet<String> {
    let Some(selector) = selector("a[href], area[href]") else {
        return BTreeSet::new();
    };
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| resolve_link(base, href))
        .collect()
}

fn check_textual(body: &[u8]) -> Result<(), ExtractionError> {
    // UTF-16 text legitimately contains NUL bytes.
    if Encoding::for_bom(body).is_some() {
        return Ok(());
    }
    let head = &body[..body.len().min(SNIFF_LEN)];
    if head.contains(&0) {
        return Err(ExtractionError::NonTextual("NUL bytes in content".to_string()));
    }
    let control = head
        .iter()
        .filter(|&&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c))
        .count();
    if control * 10 > head.len() {
        return Err(ExtractionError::NonTextual(
            "too many control characters".to_string(),
        ));
    }
    Ok(())
}

/// Decodes `body` and returns the text with the lowercase encoding name.
///
/// Order: BOM, transport charset, `<meta>` charset, valid UTF-8,
/// windows-1252.
pub fn decode_body(body: &[u8], transport_charset: &str) -> (String, String) {
    let encoding = Encoding::for_bom(body)
        .map(|(enc, _)| enc)
        .or_else(|| Encoding::for_label(transport_charset.trim().as_bytes()))
        .or_else(|| {
            let head = String::from_utf8_lossy(&body[..body.len().min(SNIFF_LEN)]);
            META_CHARSET
                .captures(&head)
                .and_then(|caps| Encoding::for_label(caps[1].as_bytes()))
        })
        .unwrap_or_else(|| {
            if std::str::from_utf8(body).is_ok() {
                UTF_8
            } else {
                WINDOWS_1252
            }
        });

    let (text, used, had_errors) = encoding.decode(body);
    let text = if had_errors {
        tracing::debug!("Dropping undecodable bytes while decoding as {}", used.name());
        text.replace('\u{FFFD}', "")
    } else {
        text.into_owned()
    };
    (text, used.name().to_ascii_lowercase())
}
