//! Markup → plain text extraction.
//!
//! Non-content subtrees are removed by tag, unconditionally; the remaining body
//! text is concatenated in document order and its whitespace collapsed.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Elements whose whole subtree is dropped before text extraction.
pub const STRIPPED_TAGS: [&str; 5] = ["script", "style", "nav", "header", "footer"];

/// Extract the sanitized body text of a serialized DOM.
pub fn extract_text(markup: &str) -> String {
    static BODY_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("body").expect("valid selector"));

    let doc = Html::parse_document(markup);
    let mut raw = String::with_capacity(markup.len() / 4);

    if let Some(body) = doc.select(&BODY_SEL).next() {
        collect_text(body, &mut raw);
    }

    collapse_whitespace(&raw)
}

/// Depth-first text collection that skips [`STRIPPED_TAGS`] subtrees.
///
/// Walks with an explicit stack, so nesting depth is bounded by the heap.
fn collect_text(root: ElementRef<'_>, out: &mut String) {
    let mut stack: Vec<_> = root.children().collect();
    stack.reverse();

    while let Some(node) = stack.pop() {
        if let Some(element) = ElementRef::wrap(node) {
            if !STRIPPED_TAGS.contains(&element.value().name()) {
                let first = stack.len();
                stack.extend(element.children());
                stack[first..].reverse();
            }
        } else if let Some(text) = node.value().as_text() {
            out.push_str(text);
        }
    }
}

/// Collapse every whitespace run to a single space and trim both ends.
pub fn collapse_whitespace(text: &str) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    WS_RE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_non_content_elements() {
        let html = r#"<html><head><title>T</title><style>.x{color:red}</style></head>
            <body>
              <header>HEADER_MARKER</header>
              <nav><a href="/">NAV_MARKER</a></nav>
              <main><h1>Hello</h1><p>World</p></main>
              <script>var SCRIPT_MARKER = 1;</script>
              <style>STYLE_MARKER{}</style>
              <footer>FOOTER_MARKER</footer>
            </body></html>"#;

        let text = extract_text(html);
        for marker in [
            "HEADER_MARKER",
            "NAV_MARKER",
            "SCRIPT_MARKER",
            "STYLE_MARKER",
            "FOOTER_MARKER",
        ] {
            assert!(!text.contains(marker), "{marker} leaked into {text:?}");
        }
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
    }

    #[test]
    fn strips_nested_non_content_elements() {
        let html = r#"<body><article><div><footer><p>DEEP_FOOTER</p></footer>kept</div>
            <section><header>SECTION_HEADER</header>also kept</section></article></body>"#;
        let text = extract_text(html);
        assert_eq!(text, "kept also kept");
    }

    #[test]
    fn whitespace_is_collapsed_and_trimmed() {
        let html = "<body>\n\n   Lots\t\tof \n\n   space   <p>  here </p>\u{a0}\n</body>";
        let text = extract_text(html);
        assert_eq!(text, "Lots of space here");
        assert!(!text.contains("  "));
        assert!(!text.starts_with(' '));
        assert!(!text.ends_with(' '));
    }

    #[test]
    fn head_content_is_ignored() {
        let html = "<html><head><title>TITLE_ONLY</title></head><body>Body text</body></html>";
        assert_eq!(extract_text(html), "Body text");
    }

    #[test]
    fn empty_body_yields_empty_string() {
        assert_eq!(extract_text("<html><body>  <script>x()</script> </body></html>"), "");
        assert_eq!(extract_text(""), "");
    }

    #[test]
    fn text_keeps_document_order_across_siblings() {
        let html = "<body><div>one <b>two</b></div><p>three <i>four <u>five</u></i> six</p></body>";
        assert_eq!(extract_text(html), "one two three four five six");
    }

    #[test]
    fn deeply_nested_markup_does_not_overflow() {
        let depth = 50_000;
        let mut html = String::with_capacity(depth * 15);
        html.push_str("<body>");
        for _ in 0..depth {
            html.push_str("<span>");
        }
        html.push_str("deep text<script>SCRIPT_MARKER</script>");
        for _ in 0..depth {
            html.push_str("</span>");
        }
        html.push_str("</body>");

        let text = extract_text(&html);
        assert!(text.contains("deep text"));
        assert!(!text.contains("SCRIPT_MARKER"));
    }

    #[test]
    fn collapse_whitespace_handles_mixed_runs() {
        assert_eq!(collapse_whitespace("  a \r\n\t b  "), "a b");
    }
}
