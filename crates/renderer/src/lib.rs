pub mod browser;

use std::sync::Arc;
use std::time::{Duration, Instant};

use docscrawl_browser_pool::BrowserPool;
use docscrawl_core::{BrowserPoolConfig, CancelSignal, CrawlError, RenderHint, SpaDetectorConfig};
use docscrawl_static_fetch::StaticFetcher;
use rand::Rng;
use url::Url;

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub html: String,
    pub final_url: Url,
    pub rendered_with_browser: bool,
    pub duration_ms: u64,
}

/// Composes the Static Fetcher, SPA Detector, and Browser Pool. The only
/// component allowed to call the Browser Pool.
pub struct HybridRenderer {
    static_fetcher: StaticFetcher,
    browser_pool: Arc<BrowserPool>,
    spa: SpaDetectorConfig,
    browser_config: BrowserPoolConfig,
    min_content_chars: usize,
}

impl HybridRenderer {
    pub fn new(
        static_fetcher: StaticFetcher,
        browser_pool: Arc<BrowserPool>,
        spa: SpaDetectorConfig,
        browser_config: BrowserPoolConfig,
        min_content_chars: usize,
    ) -> Self {
        Self { static_fetcher, browser_pool, spa, browser_config, min_content_chars }
    }

    /// Exposed so the Orchestrator can drain the pool after its workers
    /// finish, without the renderer needing a `shutdown` method of its own.
    pub fn browser_pool(&self) -> &Arc<BrowserPool> {
        &self.browser_pool
    }

    pub async fn render(&self, url: &Url, hint: RenderHint, cancel: &CancelSignal) -> Result<RenderOutcome, CrawlError> {
        let started = Instant::now();

        if hint != RenderHint::ForceBrowser {
            if let Some(outcome) = self.try_static(url, hint, cancel, started).await? {
                return Ok(outcome);
            }
        }

        self.render_with_browser_retrying(url, cancel, started).await
    }

    /// Returns `Some` if the static attempt produced a usable result,
    /// `None` if the Hybrid Renderer should escalate to the browser.
    async fn try_static(
        &self,
        url: &Url,
        hint: RenderHint,
        cancel: &CancelSignal,
        started: Instant,
    ) -> Result<Option<RenderOutcome>, CrawlError> {
        let fetched = self.static_fetcher.fetch(url, cancel).await?;
        let content_type = fetched.headers.get("content-type").map(|s| s.as_str());
        let is_html = content_type.map(|ct| ct.to_lowercase().contains("html")).unwrap_or(true);

        if !is_html {
            return Ok(Some(RenderOutcome {
                html: String::from_utf8_lossy(&fetched.body).to_string(),
                final_url: fetched.final_url,
                rendered_with_browser: false,
                duration_ms: started.elapsed().as_millis() as u64,
            }));
        }

        let html = String::from_utf8_lossy(&fetched.body).to_string();

        if hint == RenderHint::ForceStatic {
            return Ok(Some(RenderOutcome {
                html,
                final_url: fetched.final_url,
                rendered_with_browser: false,
                duration_ms: started.elapsed().as_millis() as u64,
            }));
        }

        let classification = docscrawl_spa_detector::classify(
            &html,
            content_type,
            self.spa.confidence_threshold,
            self.spa.empty_root_text_threshold,
            self.spa.script_count_threshold,
        );

        if classification.needs_browser {
            return Ok(None);
        }

        let extracted = docscrawl_extractor::extract(&html, &fetched.final_url);
        if extracted.content_markdown.chars().count() < self.min_content_chars {
            return Ok(None);
        }

        Ok(Some(RenderOutcome {
            html,
            final_url: fetched.final_url,
            rendered_with_browser: false,
            duration_ms: started.elapsed().as_millis() as u64,
        }))
    }

    async fn render_with_browser_retrying(
        &self,
        url: &Url,
        cancel: &CancelSignal,
        started: Instant,
    ) -> Result<RenderOutcome, CrawlError> {
        let selector_hint = url.host_str().and_then(|host| self.browser_config.selector_overrides.get(host));

        let mut attempt = 0;
        loop {
            match browser::render_with_browser(&self.browser_pool, url, selector_hint.map(String::as_str), &self.browser_config, cancel).await {
                Ok((html, final_url)) => {
                    return Ok(RenderOutcome {
                        html,
                        final_url,
                        rendered_with_browser: true,
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Err(err)
                    if matches!(err, CrawlError::NavigationTimeout(_) | CrawlError::PageCrashed(_))
                        && attempt + 1 < self.browser_config.max_render_attempts =>
                {
                    attempt += 1;
                    let delay = backoff(Duration::from_millis(500), Duration::from_secs(30), attempt);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn backoff(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exp = base.as_millis().saturating_mul(1u128 << attempt.min(16));
    let capped = exp.min(cap.as_millis()) as u64;
    let jitter = rand::thread_rng().gen_range(0..=(capped / 4).max(1));
    Duration::from_millis(capped + jitter)
}
