//! Text extraction from the catalog page and the metadata block.
//!
//! The catalog page is scanned with a small tag walker: opening tags are
//! located with a regex, and the matching close tag is found by counting
//! nested tags of the same name. This is enough for the two blocks we need
//! (the `font_big` title and the first `font.status` author list) without a
//! full DOM. Comments, scripts and styles are cut out first, since markup
//! inside them is not part of the document.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Class carried by the series title element.
pub const TITLE_CLASS: &str = "font_big";

/// Class carried by the `<font>` element that lists the authors.
pub const STATUS_CLASS: &str = "status";

static OPEN_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<([a-z][a-z0-9]*)\b([^>]*)>"));
static CLASS_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)\bclass\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
});
static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<a\b[^>]*>(.*?)</a\s*>"));
static HIDDEN_MARKUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"(?is)<!--.*?(?:-->|\z)|<script\b[^>]*>.*?(?:</script\s*>|\z)|<style\b[^>]*>.*?(?:</style\s*>|\z)",
    )
});
static ANY_TAG_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?s)<[^>]*>"));
static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"&#([xX][0-9a-fA-F]+|[0-9]+);"));
static BOOK_DATA_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"book_data\.php\?h=\w+"));
static VOLINFO_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#""volinfo=(.+?)""#));

/// Compiles a regex at static init; panics on invalid pattern.
fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// An element found by [`elements_with_class`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct Element<'a> {
    /// Lowercased tag name.
    tag: String,
    /// Raw markup between the opening and the matching closing tag.
    inner: &'a str,
}

/// Returns the series title: the text of every `font_big` element,
/// concatenated in document order with no separator.
#[must_use]
pub fn extract_title(html: &str) -> String {
    let visible = strip_hidden_markup(html);
    elements_with_class(&visible, TITLE_CLASS)
        .iter()
        .map(|element| text_content(element.inner))
        .collect()
}

/// Returns the text of each anchor inside the first `<font class="status">`.
///
/// Anchors without text are skipped.
#[must_use]
pub fn extract_authors(html: &str) -> Vec<String> {
    let visible = strip_hidden_markup(html);
    elements_with_class(&visible, STATUS_CLASS)
        .into_iter()
        .find(|element| element.tag == "font")
        .map(|element| {
            ANCHOR_RE
                .captures_iter(element.inner)
                .map(|caps| text_content(&caps[1]))
                .filter(|text| !text.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Returns the first relative `book_data.php?h=...` reference in the page.
#[must_use]
pub fn find_book_data_path(html: &str) -> Option<&str> {
    BOOK_DATA_RE.find(html).map(|m| m.as_str())
}

/// Returns every `"volinfo=..."` record in the metadata body, in order.
#[must_use]
pub fn extract_volinfo_records(body: &str) -> Vec<&str> {
    VOLINFO_RE
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Strips tags, decodes entities and collapses whitespace.
#[must_use]
pub fn text_content(fragment: &str) -> String {
    let without_tags = ANY_TAG_RE.replace_all(fragment, "");
    decode_entities(&without_tags)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decodes numeric character references and the common named entities.
#[must_use]
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let numeric = NUMERIC_ENTITY_RE.replace_all(text, |caps: &Captures<'_>| {
        let raw = &caps[1];
        let code = match raw.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map_or_else(|| caps[0].to_string(), |ch| ch.to_string())
    });

    // `&amp;` goes last so `&amp;lt;` stays `&lt;`.
    Cow::Owned(
        numeric
            .replace("&nbsp;", "\u{a0}")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&"),
    )
}

/// Removes comments and `<script>`/`<style>` elements, unterminated ones
/// running to the end of the document.
fn strip_hidden_markup(html: &str) -> Cow<'_, str> {
    HIDDEN_MARKUP_RE.replace_all(html, "")
}

fn elements_with_class<'a>(html: &'a str, class: &str) -> Vec<Element<'a>> {
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();

    OPEN_TAG_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let attrs = caps.get(2)?.as_str();
            if !has_class(attrs, class) {
                return None;
            }
            let tag = caps[1].to_ascii_lowercase();
            let inner = if attrs.trim_end().ends_with('/') {
                ""
            } else {
                inner_html(html, &lower, whole.end(), &tag)
            };
            Some(Element { tag, inner })
        })
        .collect()
}

fn has_class(attrs: &str, class: &str) -> bool {
    CLASS_ATTR_RE
        .captures(attrs)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .is_some_and(|value| value.as_str().split_whitespace().any(|c| c == class))
}

fn inner_html<'a>(html: &'a str, lower: &str, start: usize, tag: &str) -> &'a str {
    let open = format!("<{tag}");
    let close = format!("</{tag}");
    let mut depth = 1usize;
    let mut cursor = start;

    while let Some(next_close) = find_tag(lower, cursor, &close) {
        match find_tag(lower, cursor, &open) {
            Some(next_open) if next_open < next_close => {
                depth += 1;
                cursor = next_open + open.len();
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return &html[start..next_close];
                }
                cursor = next_close + close.len();
            }
        }
    }

    // Unclosed element: everything up to the end of the document.
    &html[start..]
}

/// Finds `needle` (e.g. `<font`) at or after `from`, rejecting matches that
/// are only a prefix of a longer tag name such as `<fontx`.
fn find_tag(lower: &str, from: usize, needle: &str) -> Option<usize> {
    let mut from = from;
    while let Some(relative) = lower.get(from..)?.find(needle) {
        let at = from + relative;
        let next = lower.as_bytes().get(at + needle.len());
        if next.is_none_or(|b| !b.is_ascii_alphanumeric()) {
            return Some(at);
        }
        from = at + needle.len();
    }
    None
}
