use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::page::Page;
use docscrawl_browser_pool::BrowserPool;
use docscrawl_core::{BrowserPoolConfig, CancelSignal, CrawlError};
use url::Url;

/// Navigates a pooled page to `url` and returns the serialized DOM.
///
/// Waits for the navigation's load event (the primary "wait-until" signal
/// chromiumoxide's `goto` gives us), then polls for an optional CSS
/// selector up to `selector_wait_ms`. The page is poisoned — its context
/// discarded rather than recycled — on any navigation failure, per the
/// pool's page-crash-recreates-context contract.
pub async fn render_with_browser(
    pool: &Arc<BrowserPool>,
    url: &Url,
    selector_hint: Option<&str>,
    config: &BrowserPoolConfig,
    cancel: &CancelSignal,
) -> Result<(String, Url), CrawlError> {
    let mut handle = pool.acquire_page(cancel).await?;
    let render_timeout = Duration::from_millis(config.render_timeout_ms);

    let nav = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            handle.poison();
            handle.release().await;
            return Err(CrawlError::Cancelled);
        }
        res = tokio::time::timeout(render_timeout, handle.page().goto(url.as_str())) => res,
    };

    match nav {
        Err(_) => {
            handle.poison();
            handle.release().await;
            return Err(CrawlError::NavigationTimeout(config.render_timeout_ms));
        }
        Ok(Err(e)) => {
            handle.poison();
            handle.release().await;
            return Err(CrawlError::PageCrashed(e.to_string()));
        }
        Ok(Ok(_)) => {}
    }

    if let Some(selector) = selector_hint {
        let budget = Duration::from_millis(config.selector_wait_ms);
        let _ = tokio::time::timeout(budget, wait_for_selector(handle.page(), selector)).await;
    }

    let final_url = handle
        .page()
        .url()
        .await
        .ok()
        .flatten()
        .and_then(|s| Url::parse(&s).ok())
        .unwrap_or_else(|| url.clone());

    let html = match handle.page().content().await {
        Ok(html) => html,
        Err(e) => {
            handle.poison();
            handle.release().await;
            return Err(CrawlError::PageCrashed(e.to_string()));
        }
    };

    handle.release().await;
    Ok((html, final_url))
}

async fn wait_for_selector(page: &Page, selector: &str) {
    loop {
        if page.find_element(selector).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
