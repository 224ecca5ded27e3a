use scraper::{Html, Selector};
use std::sync::LazyLock;

static MAIN_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("main").expect("hardcoded selector 'main' is invalid"));
static ARTICLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article").expect("hardcoded selector 'article' is invalid"));
static MAIN_CONTENT_CLASS_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".main-content").expect("hardcoded selector '.main-content' is invalid")
});
static CONTENT_ID_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#content").expect("hardcoded selector '#content' is invalid"));
static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("hardcoded selector 'body' is invalid"));

/// Finds the main-content region: `<main>`, then `<article>`, then the
/// `main-content` class, then the `content` id, then `<body>`, then the raw
/// document as a last resort. Returns the chosen element's inner HTML.
pub fn extract_main_content(html: &str) -> String {
    let document = Html::parse_document(html);

    let selectors = [
        &*MAIN_SELECTOR,
        &*ARTICLE_SELECTOR,
        &*MAIN_CONTENT_CLASS_SELECTOR,
        &*CONTENT_ID_SELECTOR,
    ];

    for selector in selectors {
        if let Some(element) = document.select(selector).next() {
            return element.html();
        }
    }

    if let Some(body) = document.select(&BODY_SELECTOR).next() {
        return body.html();
    }

    html.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_takes_priority_over_article() {
        let html = r"<html><body><article><p>Article</p></article><main><p>Main</p></main></body></html>";
        let result = extract_main_content(html);
        assert!(result.contains("Main"));
    }

    #[test]
    fn falls_back_to_body() {
        let html = r"<html><body><div>No semantic container</div></body></html>";
        let result = extract_main_content(html);
        assert!(result.contains("No semantic container"));
    }

    #[test]
    fn falls_back_to_raw_html() {
        let html = "<p>Malformed HTML without body</p>";
        let result = extract_main_content(html);
        assert!(result.contains("Malformed HTML without body"));
    }

    #[test]
    fn content_class_selector_matches() {
        let html = r#"<html><body><div class="main-content"><p>Docs</p></div></body></html>"#;
        let result = extract_main_content(html);
        assert!(result.contains("Docs"));
    }
}
