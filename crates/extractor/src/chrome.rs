use scraper::{Html, Selector};
use std::sync::LazyLock;

static NAV_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("nav").unwrap());
static FOOTER_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("footer").unwrap());
static SKIP_LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".skip-link, .skip-to-content, a[href='#main']").unwrap());
static COOKIE_BANNER_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".cookie-banner, #cookie-consent, .cookie-consent").unwrap());
static NAVIGATION_ROLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[role='navigation']").unwrap());
static BANNER_ROLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[role='banner']").unwrap());

/// Strips navigation, footers, skip-to-content helpers, cookie banners, and
/// `role="navigation"`/`role="banner"` elements from the main region before
/// markdown normalization.
pub fn strip_chrome(region_html: &str) -> String {
    let mut document = Html::parse_fragment(region_html);

    let selectors: &[&Selector] = &[
        &NAV_SELECTOR,
        &FOOTER_SELECTOR,
        &SKIP_LINK_SELECTOR,
        &COOKIE_BANNER_SELECTOR,
        &NAVIGATION_ROLE_SELECTOR,
        &BANNER_ROLE_SELECTOR,
    ];

    let ids: Vec<_> = selectors
        .iter()
        .flat_map(|selector| document.select(selector).map(|el| el.id()))
        .collect();

    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    document.root_element().html()
}
