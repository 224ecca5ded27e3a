mod worker;

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use docscrawl_browser_pool::BrowserPool;
use docscrawl_core::{
    BrowserPoolConfig, CancelSignal, CanonicalUrl, CrawlOptions, FatalCrawlError, PageRecord,
    ProgressSink, SpaDetectorConfig,
};
use docscrawl_fetch_policy::{FetchPolicy, RateLimiter, RobotsCache};
use docscrawl_frontier::Frontier;
use docscrawl_renderer::HybridRenderer;
use docscrawl_static_fetch::StaticFetcher;

use worker::{worker_loop, WorkerContext};

/// Drives one crawl from a seed URL to completion (frontier exhausted,
/// `max_pages` reached, or `cancel_signal` tripped). Composes the Frontier,
/// Fetch Policy, Hybrid Renderer, and Content Extractor behind a pool of
/// `max_workers` homogeneous workers.
///
/// Returns whatever records were emitted before the call ended; only
/// corruption of orchestrator-owned state or an invalid seed fails the
/// whole call.
pub async fn crawl(
    seed_url: &str,
    options: CrawlOptions,
    progress_sink: Option<ProgressSink>,
    cancel_signal: CancelSignal,
) -> Result<Vec<PageRecord>, FatalCrawlError> {
    let seed = docscrawl_validator::validate(seed_url).await?;
    run(seed, options, progress_sink, cancel_signal).await
}

/// Drives a crawl from an already-screened seed. Split out from [`crawl`] so
/// the pipeline (robots, rate limiting, frontier, cancellation) can be
/// exercised in tests against a local mock server, whose address the public
/// SSRF screen in `crawl` would otherwise reject outright — every link the
/// crawl *discovers* still passes through `worker::screen_candidate_links`
/// regardless of how the seed arrived here. The seed's own host is seeded
/// into `WorkerContext::trusted_hosts` up front, same as if it had just
/// cleared `screen_host` via the public entry point, so same-site pages
/// found while crawling aren't re-resolved on every single link.
async fn run(
    seed: CanonicalUrl,
    options: CrawlOptions,
    progress_sink: Option<ProgressSink>,
    cancel_signal: CancelSignal,
) -> Result<Vec<PageRecord>, FatalCrawlError> {
    let frontier = Arc::new(Frontier::new(options.frontier_capacity));
    frontier.seed(seed.clone()).await;

    let fetch_policy = Arc::new(build_fetch_policy(&options)?);
    let renderer = Arc::new(build_renderer(&options)?);

    // A worker must stop pulling from the frontier either when the caller's
    // `cancel_signal` trips or when `max_pages` is reached; both collapse to
    // the same cooperative signal so every blocking point only has to race
    // one token.
    let internal_stop = CancelSignal::new();
    let effective_cancel = CancelSignal::new();
    let merge_handle = {
        let external = cancel_signal.clone();
        let internal = internal_stop.clone();
        let effective = effective_cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = external.cancelled() => {}
                _ = internal.cancelled() => {}
            }
            effective.cancel();
        })
    };

    let trusted_hosts = StdMutex::new(std::collections::HashSet::from([seed.host().to_string()]));

    let ctx = Arc::new(WorkerContext {
        seed,
        trusted_hosts,
        records: StdMutex::new(Vec::new()),
        emitted_total: AtomicU64::new(0),
        discovered_total: AtomicU64::new(0),
        completed_total: AtomicU64::new(0),
        failed_total: AtomicU64::new(0),
        frontier,
        fetch_policy,
        renderer,
        effective_cancel,
        internal_stop,
        progress_sink,
        options,
    });

    let mut workers = Vec::with_capacity(ctx.options.max_workers.max(1));
    for _ in 0..ctx.options.max_workers.max(1) {
        let ctx = Arc::clone(&ctx);
        workers.push(tokio::spawn(worker_loop(ctx)));
    }
    for handle in workers {
        let _ = handle.await;
    }

    merge_handle.abort();

    ctx.renderer.browser_pool().drain(ctx.options.shutdown_grace()).await;

    Ok(std::mem::take(&mut *ctx.records.lock().unwrap()))
}

fn build_fetch_policy(options: &CrawlOptions) -> Result<FetchPolicy, FatalCrawlError> {
    let limiter = RateLimiter::new(
        options.rate_limit_rps,
        options.burst,
        Duration::from_millis(options.min_interval_ms),
        Duration::from_millis(options.backoff_base_ms),
        Duration::from_millis(options.backoff_cap_ms),
    );

    let http = reqwest::Client::builder()
        .user_agent(options.user_agent.clone())
        .timeout(options.request_timeout())
        .build()
        .map_err(|e| FatalCrawlError::Config(format!("failed to build robots http client: {e}")))?;
    let robots = RobotsCache::new(http, options.user_agent.clone(), Duration::from_secs(3600), Duration::from_secs(300));

    Ok(FetchPolicy::new(limiter, robots, options.respect_robots))
}

fn build_renderer(options: &CrawlOptions) -> Result<HybridRenderer, FatalCrawlError> {
    let static_fetcher = StaticFetcher::new(
        &options.user_agent,
        options.request_timeout(),
        default_per_host_connections(),
        options.max_retries,
        Duration::from_millis(options.backoff_base_ms),
        Duration::from_millis(options.backoff_cap_ms),
        options.max_response_bytes,
    )
    .map_err(|e| FatalCrawlError::Config(e.to_string()))?;

    let browser_config = default_browser_pool_config(options);
    let browser_pool = BrowserPool::new(browser_config.clone());
    let spa = default_spa_detector_config();

    Ok(HybridRenderer::new(static_fetcher, browser_pool, spa, browser_config, default_min_content_chars()))
}

/// `CrawlOptions` is the caller-facing configuration surface; the Browser
/// Pool's and SPA Detector's internal tunables are not part of it (callers
/// tune the crawl, not the renderer's plumbing), so `crawl()` fills them in
/// with the same defaults `crates/core`'s bundled config ships.
fn default_browser_pool_config(options: &CrawlOptions) -> BrowserPoolConfig {
    BrowserPoolConfig {
        max_browsers: 3,
        contexts_per_browser: 5,
        render_timeout_ms: options.render_timeout_ms,
        selector_wait_ms: 2_000,
        max_render_attempts: options.max_retries.max(1),
        shutdown_grace_ms: options.shutdown_grace_ms,
        block_resource_types: vec!["image".into(), "font".into(), "media".into(), "stylesheet".into()],
        deny_list_hosts: vec!["doubleclick.net".into(), "google-analytics.com".into()],
        selector_overrides: options.selector_overrides.clone(),
    }
}

fn default_spa_detector_config() -> SpaDetectorConfig {
    SpaDetectorConfig {
        confidence_threshold: 0.5,
        min_content_chars: 200,
        empty_root_text_threshold: 500,
        script_count_threshold: 5,
    }
}

fn default_per_host_connections() -> usize {
    8
}

fn default_min_content_chars() -> usize {
    default_spa_detector_config().min_content_chars
}

#[cfg(test)]
mod tests {
    use super::*;
    use docscrawl_core::{PageStatus, RenderMode};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_options() -> CrawlOptions {
        CrawlOptions {
            max_workers: 2,
            rate_limit_rps: 1000.0,
            burst: 100,
            min_interval_ms: 0,
            request_timeout_ms: 2_000,
            render_timeout_ms: 2_000,
            max_retries: 0,
            backoff_base_ms: 10,
            backoff_cap_ms: 50,
            respect_robots: true,
            render_mode: RenderMode::StaticOnly,
            shutdown_grace_ms: 2_000,
            frontier_capacity: 1_000,
            ..CrawlOptions::default()
        }
    }

    /// Builds a `CanonicalUrl` directly from a mock server's own loopback
    /// address, the way `crates/frontier`'s tests do — bypassing the public
    /// SSRF screen in `crawl()`, which would otherwise reject any local test
    /// server outright. This only stands in for the seed; every link these
    /// tests' pages link to still runs through `screen_candidate_links`.
    fn seed_of(raw: &str) -> CanonicalUrl {
        CanonicalUrl::from_parts(raw.parse().unwrap())
    }

    #[tokio::test]
    async fn crawls_a_linked_chain_and_stays_in_scope() {
        let server = MockServer::start().await;

        Mock::given(method("GET")).and(path("/robots.txt")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/docs/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><main><h1>A</h1><a href="/docs/b">next</a><a href="https://outside.test/x">outside</a></main></body></html>"#,
            ).insert_header("content-type", "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/docs/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body><main><h1>B</h1>no more links</main></body></html>").insert_header("content-type", "text/html"))
            .mount(&server)
            .await;

        let seed = seed_of(&format!("{}/docs/a", server.uri()));
        let records = run(seed, fast_options(), None, CancelSignal::new()).await.unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status == PageStatus::Ok));
        assert!(records.iter().any(|r| r.url.ends_with("/docs/a")));
        assert!(records.iter().any(|r| r.url.ends_with("/docs/b")));
    }

    #[tokio::test]
    async fn max_pages_bounds_emitted_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/robots.txt")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/docs/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><main><h1>A</h1><a href="/docs/b">b</a></main></body></html>"#,
            ).insert_header("content-type", "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/docs/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body><main>no links</main></body></html>").insert_header("content-type", "text/html"))
            .mount(&server)
            .await;

        let seed = seed_of(&format!("{}/docs/a", server.uri()));
        let options = CrawlOptions { max_pages: Some(1), ..fast_options() };
        let records = run(seed, options, None, CancelSignal::new()).await.unwrap();
        assert!(records.len() <= 1);
    }

    #[tokio::test]
    async fn rejects_unsafe_seed_without_starting_any_worker() {
        let err = crawl("http://127.0.0.1/", fast_options(), None, CancelSignal::new()).await.unwrap_err();
        assert!(matches!(err, FatalCrawlError::InvalidSeed(_)));
    }

    /// Scenario B: a page disallowed by robots.txt is never fetched, and
    /// shows up as a `skipped_robots` record instead of `Ok`/`Failed`.
    #[tokio::test]
    async fn robots_denied_page_is_skipped_and_never_fetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /docs/private\n"))
            .mount(&server)
            .await;
        // No mock for /docs/private: if the worker ever fetched it despite the
        // robots denial, wiremock would panic on the unmatched request.
        Mock::given(method("GET"))
            .and(path("/docs/private"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let seed = seed_of(&format!("{}/docs/private", server.uri()));
        let records = run(seed, fast_options(), None, CancelSignal::new()).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PageStatus::SkippedRobots);
        assert_eq!(records[0].error_kind.as_deref(), Some("robots_denied"));
    }

    /// Scenario D: a host returning 429 is retried under the rate limiter's
    /// adaptive backoff, and the eventual success still lands an `Ok` record.
    #[tokio::test]
    async fn rate_limited_host_recovers_after_retry_at_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/robots.txt")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/docs/a"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/docs/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body><main>recovered</main></body></html>").insert_header("content-type", "text/html"))
            .mount(&server)
            .await;

        let seed = seed_of(&format!("{}/docs/a", server.uri()));
        let options = CrawlOptions { max_retries: 2, ..fast_options() };
        let records = run(seed, options, None, CancelSignal::new()).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PageStatus::Ok);
    }

    /// Scenario F: tripping the caller's cancel signal mid-crawl stops the
    /// workers promptly instead of draining the whole frontier first.
    #[tokio::test]
    async fn cancellation_stops_the_crawl_before_the_frontier_drains() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/robots.txt")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        for i in 0..50 {
            Mock::given(method("GET"))
                .and(path(format!("/docs/{i}")))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_delay(Duration::from_millis(20))
                        .set_body_string(format!(
                            r#"<html><body><main>page {i}<a href="/docs/{}">next</a></main></body></html>"#,
                            i + 1
                        ))
                        .insert_header("content-type", "text/html"),
                )
                .mount(&server)
                .await;
        }

        let seed = seed_of(&format!("{}/docs/0", server.uri()));
        let cancel = CancelSignal::new();
        let cancel_trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_trigger.cancel();
        });

        let options = CrawlOptions { max_workers: 1, ..fast_options() };
        let records = run(seed, options, None, cancel).await.unwrap();
        assert!(records.len() < 50, "cancellation should cut the crawl short of the full chain, got {}", records.len());
    }

    /// The SSRF-bypass defect: a page the crawl legitimately visits links to
    /// a different host that resolves to a blocked IP range. The link is
    /// already out of scope (different host than the seed), so this mostly
    /// exercises that `links_out` never surfaces it either; the narrower case
    /// of a same-host link failing the screen is covered directly at
    /// `worker::tests::screen_candidate_links_drops_blocked_hosts`.
    #[tokio::test]
    async fn discovered_link_to_blocked_ip_is_never_enqueued() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/robots.txt")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/docs/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><main><a href="http://169.254.169.254/latest/meta-data/">metadata</a></main></body></html>"#,
            ).insert_header("content-type", "text/html"))
            .mount(&server)
            .await;

        let seed = seed_of(&format!("{}/docs/a", server.uri()));
        let records = run(seed, fast_options(), None, CancelSignal::new()).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PageStatus::Ok);
        assert!(records[0].links_out.is_empty(), "blocked-ip link must not appear in links_out: {:?}", records[0].links_out);
    }
}
