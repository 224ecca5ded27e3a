use scraper::{Html, Selector};
use std::sync::LazyLock;

static SCRIPT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());
static META_GENERATOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[name='generator']").unwrap());
static BODY_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

const FRAMEWORK_ROOT_IDS: &[&str] = &["app", "root", "__next", "__nuxt", "___gatsby"];
const FRAMEWORK_ROOT_ATTRS: &[&str] = &["data-reactroot", "ng-app", "data-server-rendered"];
const FRAMEWORK_GENERATORS: &[&str] = &["next.js", "gatsby", "nuxt", "docusaurus", "vuepress"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub needs_browser: bool,
    pub confidence: f64,
}

/// Scores whether a static response needs a browser render, combining
/// framework-marker, root-container/script-count, and text-to-markup
/// signals into a confidence in `[0, 1]`.
///
/// A non-HTML `content_type` always classifies `sufficient` — the renderer
/// will not browser-render a non-HTML response.
pub fn classify(
    html: &str,
    content_type: Option<&str>,
    confidence_threshold: f64,
    empty_root_text_threshold: usize,
    script_count_threshold: usize,
) -> Classification {
    if let Some(ct) = content_type {
        if !ct.to_lowercase().contains("html") {
            return Classification { needs_browser: false, confidence: 0.0 };
        }
    }

    let document = Html::parse_document(html);
    let mut confidence: f64 = 0.0;

    confidence += framework_marker_score(&document);
    confidence += root_container_score(&document, empty_root_text_threshold, script_count_threshold);
    confidence += text_markup_ratio_score(&document, html);

    let confidence = confidence.min(1.0);
    Classification {
        needs_browser: confidence >= confidence_threshold,
        confidence,
    }
}

fn framework_marker_score(document: &Html) -> f64 {
    let mut score = 0.0;

    for id in FRAMEWORK_ROOT_IDS {
        let selector_str = format!("#{id}");
        if let Ok(selector) = Selector::parse(&selector_str) {
            if document.select(&selector).next().is_some() {
                score += 0.5;
            }
        }
    }

    for attr in FRAMEWORK_ROOT_ATTRS {
        let selector_str = format!("[{attr}]");
        if let Ok(selector) = Selector::parse(&selector_str) {
            if document.select(&selector).next().is_some() {
                score += 0.5;
            }
        }
    }

    if let Some(meta) = document.select(&META_GENERATOR_SELECTOR).next() {
        if let Some(content) = meta.value().attr("content") {
            let content_lower = content.to_lowercase();
            if FRAMEWORK_GENERATORS.iter().any(|g| content_lower.contains(g)) {
                score += 0.5;
            }
        }
    }

    score.min(0.5)
}

fn root_container_score(document: &Html, empty_root_text_threshold: usize, script_count_threshold: usize) -> f64 {
    let script_count = document.select(&SCRIPT_SELECTOR).count();
    let Some(body) = document.select(&BODY_SELECTOR).next() else { return 0.0 };
    let body_text_len = body.text().collect::<String>().trim().len();

    if body_text_len < empty_root_text_threshold && script_count > script_count_threshold {
        0.3
    } else {
        0.0
    }
}

fn text_markup_ratio_score(document: &Html, raw_html: &str) -> f64 {
    let Some(body) = document.select(&BODY_SELECTOR).next() else { return 0.0 };
    let text_len = body.text().collect::<String>().trim().len();
    let markup_len = raw_html.len().max(1);
    let ratio = text_len as f64 / markup_len as f64;
    let script_count = document.select(&SCRIPT_SELECTOR).count();

    if ratio < 0.1 && script_count > 3 {
        0.2
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_html_content_type_is_always_sufficient() {
        let result = classify("{}", Some("application/json"), 0.5, 500, 5);
        assert!(!result.needs_browser);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn static_page_with_rich_text_is_sufficient() {
        let html = "<html><body><article>".to_string()
            + &"This is a well-written paragraph of documentation text. ".repeat(40)
            + "</article></body></html>";
        let result = classify(&html, Some("text/html"), 0.5, 500, 5);
        assert!(!result.needs_browser);
    }

    #[test]
    fn spa_shell_with_root_div_and_many_scripts_needs_browser() {
        let mut html = String::from("<html><head><meta name=\"generator\" content=\"Next.js 14\"></head><body><div id=\"app\"></div>");
        for i in 0..10 {
            html.push_str(&format!("<script src=\"/chunk-{i}.js\"></script>"));
        }
        html.push_str("</body></html>");

        let result = classify(&html, Some("text/html"), 0.5, 500, 5);
        assert!(result.needs_browser);
        assert!(result.confidence >= 0.5);
    }

    #[test]
    fn empty_root_with_many_scripts_scores_above_zero_even_without_framework_marker() {
        let mut html = String::from("<html><body><div id=\"not-a-known-root\"></div>");
        for i in 0..10 {
            html.push_str(&format!("<script src=\"/chunk-{i}.js\"></script>"));
        }
        html.push_str("</body></html>");

        let result = classify(&html, Some("text/html"), 0.2, 500, 5);
        assert!(result.confidence > 0.0);
    }
}
