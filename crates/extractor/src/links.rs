use scraper::{Html, Selector};
use std::sync::LazyLock;
use url::Url;

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("hardcoded selector 'a[href]' is invalid"));

/// Resolves every `<a href>` in `region_html` against `base_url`, drops
/// fragment-only and malformed links, and canonicalizes the rest.
///
/// Scope filtering against the crawl seed happens in the frontier, not here.
pub fn extract_links(region_html: &str, base_url: &Url) -> Vec<Url> {
    let document = Html::parse_fragment(region_html);
    let mut links = Vec::new();

    for element in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = element.value().attr("href") else { continue };
        let trimmed = href.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.starts_with("javascript:") || trimmed.starts_with("mailto:") || trimmed.starts_with("tel:") || trimmed.starts_with("data:") {
            continue;
        }

        let Ok(resolved) = base_url.join(trimmed) else { continue };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }

        let Ok(canonical) = docscrawl_validator::canonicalize(resolved.as_str()) else { continue };
        links.push(canonical);
    }

    links
}
