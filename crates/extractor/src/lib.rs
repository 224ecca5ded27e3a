pub mod chrome;
pub mod links;
pub mod main_content;
pub mod markdown;

use scraper::{Html, Selector};
use std::sync::LazyLock;
use url::Url;

static H1_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub content_html: String,
    pub content_markdown: String,
    pub links_out: Vec<Url>,
}

/// Locates the main region, strips chrome, normalizes to Markdown, and
/// extracts in-region links. Pure function — no I/O, never fails: empty
/// input yields empty output.
pub fn extract(html: &str, base_url: &Url) -> ExtractedPage {
    let region_html = main_content::extract_main_content(html);
    let title = extract_title(html, &region_html, base_url);
    let stripped = chrome::strip_chrome(&region_html);
    let content_markdown = markdown::to_markdown(&stripped);
    let links_out = links::extract_links(&stripped, base_url);

    ExtractedPage {
        title,
        content_html: stripped,
        content_markdown,
        links_out,
    }
}

fn extract_title(full_html: &str, region_html: &str, base_url: &Url) -> Option<String> {
    let region = Html::parse_fragment(region_html);
    if let Some(h1) = region.select(&H1_SELECTOR).next() {
        let text = h1.text().collect::<String>().trim().to_string();
        if !text.is_empty() {
            return Some(text);
        }
    }

    let document = Html::parse_document(full_html);
    if let Some(title_el) = document.select(&TITLE_SELECTOR).next() {
        let text = title_el.text().collect::<String>().trim().to_string();
        if !text.is_empty() {
            return Some(text);
        }
    }

    base_url
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
