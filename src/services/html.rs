//! HTML to markdown conversion.
//!
//! Regex-driven: handles headings, links, emphasis, list items, paragraphs
//! and line breaks, drops scripts/styles/comments and strips anything else.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static DROPPED_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|head|template)\b.*?</(script|style|noscript|head|template)\s*>|<!--.*?-->")
        .expect("valid regex")
});
static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]\s*>").expect("valid regex"));
static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a\s*>"#).expect("valid regex")
});
static STRONG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(strong|b)\b[^>]*>(.*?)</(strong|b)\s*>").expect("valid regex"));
static EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(em|i)\b[^>]*>(.*?)</(em|i)\s*>").expect("valid regex"));
static LIST_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<li\b[^>]*>").expect("valid regex"));
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
static BLOCK_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(p|div|section|article|header|footer|ul|ol|table|tr|blockquote|pre|li)\b[^>]*>")
        .expect("valid regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));
static NUMERIC_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid regex"));
static INLINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Decode the XML named entities plus numeric character references.
pub fn decode_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(text, |caps: &Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    numeric
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn strip_tags(fragment: &str) -> String {
    TAG.replace_all(fragment, "").trim().to_string()
}

pub fn html_to_markdown(html: &str) -> String {
    let text = DROPPED_BLOCKS.replace_all(html, "");
    let text = HEADING.replace_all(&text, |caps: &Captures| {
        let level: usize = caps[1].parse().unwrap_or(1);
        format!("\n\n{} {}\n\n", "#".repeat(level), strip_tags(&caps[2]))
    });
    let text = LINK.replace_all(&text, |caps: &Captures| {
        let label = strip_tags(&caps[2]);
        if label.is_empty() {
            String::new()
        } else {
            format!("[{}]({})", label, &caps[1])
        }
    });
    let text = STRONG.replace_all(&text, "**$2**");
    let text = EMPHASIS.replace_all(&text, "*$2*");
    let text = LIST_ITEM.replace_all(&text, "\n- ");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = BLOCK_END.replace_all(&text, "\n\n");
    let text = TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    let lines: Vec<String> = text
        .lines()
        .map(|line| INLINE_SPACE.replace_all(line, " ").trim().to_string())
        .collect();
    let joined = lines.join("\n");
    let collapsed = BLANK_LINES.replace_all(&joined, "\n\n");
    // list items are separated by block breaks; pull them back together
    collapsed.replace("\n\n- ", "\n- ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_structure() {
        let html = r#"<html><head><title>x</title><style>p{}</style></head>
            <body><h1>Title</h1><p>Hello <b>bold</b> and <a href="https://example.com">link</a>.</p>
            <ul><li>one</li><li>two</li></ul><script>alert(1)</script></body></html>"#;
        let md = html_to_markdown(html);
        assert!(md.starts_with("# Title"), "got: {md}");
        assert!(md.contains("Hello **bold** and [link](https://example.com)."));
        assert!(md.contains("- one\n- two"), "got: {md}");
        assert!(!md.contains("alert"));
        assert!(!md.contains("p{}"));
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt; &#65;&#x42;"), "a & b <c> AB");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    }
}
