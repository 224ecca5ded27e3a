use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use docscrawl_core::{
    CancelSignal, CanonicalUrl, CrawlOptions, FrontierEntry, PageRecord, PageStatus, ProgressEvent,
    ProgressSink, RenderHint, RenderMode,
};
use docscrawl_fetch_policy::FetchPolicy;
use docscrawl_frontier::Frontier;
use docscrawl_renderer::HybridRenderer;

/// Everything a worker needs, shared read-only (or internally synchronized)
/// across the whole pool of `max_workers` tasks.
pub(crate) struct WorkerContext {
    pub seed: CanonicalUrl,
    /// Hosts already cleared by `docscrawl_validator::screen_host`, seeded
    /// with the crawl's own seed host. A discovered link whose host is
    /// already in here skips re-resolution; a host seen for the first time
    /// is screened once and, if it clears, added so later pages on the same
    /// site don't pay for a fresh DNS lookup each time.
    pub trusted_hosts: StdMutex<HashSet<String>>,
    pub options: CrawlOptions,
    pub frontier: Arc<Frontier>,
    pub fetch_policy: Arc<FetchPolicy>,
    pub renderer: Arc<HybridRenderer>,
    pub effective_cancel: CancelSignal,
    pub internal_stop: CancelSignal,
    pub progress_sink: Option<ProgressSink>,
    pub records: StdMutex<Vec<PageRecord>>,
    pub emitted_total: AtomicU64,
    pub discovered_total: AtomicU64,
    pub completed_total: AtomicU64,
    pub failed_total: AtomicU64,
}

impl WorkerContext {
    pub fn counters_snapshot(&self) -> docscrawl_core::ProgressCounters {
        docscrawl_core::ProgressCounters {
            discovered: self.discovered_total.load(Ordering::Relaxed),
            completed: self.completed_total.load(Ordering::Relaxed),
            failed: self.failed_total.load(Ordering::Relaxed),
            in_flight: self.frontier.in_flight_count() as u64,
        }
    }
}

/// Pulls entries from the frontier until it is exhausted or cancellation
/// (external or internal, on `max_pages`) trips, processing one URL's full
/// pipeline per iteration. Mirrors the homogeneous worker loop the teacher
/// spawns per network, generalized to a single URL-agnostic pipeline.
pub(crate) async fn worker_loop(ctx: Arc<WorkerContext>) {
    loop {
        if ctx.effective_cancel.is_cancelled() {
            return;
        }

        let Some(entry) = ctx.frontier.take(&ctx.effective_cancel).await else {
            return;
        };

        let record = process_entry(&ctx, &entry).await;
        ctx.frontier.mark_done();

        match record.status {
            PageStatus::Ok => {
                ctx.completed_total.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                ctx.failed_total.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(sink) = &ctx.progress_sink {
            sink(ProgressEvent::Completed { url: record.url.clone(), status: record.status });
        }

        let total_emitted = ctx.emitted_total.fetch_add(1, Ordering::SeqCst) + 1;
        ctx.records.lock().unwrap().push(record);

        if let Some(sink) = &ctx.progress_sink {
            sink(ProgressEvent::Terminal { counters: ctx.counters_snapshot() });
        }

        if let Some(max) = ctx.options.max_pages {
            if total_emitted >= max {
                ctx.internal_stop.cancel();
            }
        }
    }
}

async fn process_entry(ctx: &WorkerContext, entry: &FrontierEntry) -> PageRecord {
    let url_string = entry.canonical_url.to_string();
    let parent_string = entry.discovered_from.as_ref().map(|u| u.to_string());

    if let Err(err) = ctx
        .fetch_policy
        .admit(entry.canonical_url.as_url(), &ctx.effective_cancel)
        .await
    {
        return match err {
            docscrawl_core::CrawlError::RobotsDenied(_) => {
                PageRecord::skipped_robots(url_string, parent_string, entry.depth)
            }
            other => PageRecord::failed(url_string, parent_string, entry.depth, other.kind(), other.to_string()),
        };
    }

    let hint = match ctx.options.render_mode {
        RenderMode::StaticOnly => RenderHint::ForceStatic,
        RenderMode::BrowserOnly => RenderHint::ForceBrowser,
        RenderMode::Auto => RenderHint::None,
    };

    let outcome = match ctx.renderer.render(entry.canonical_url.as_url(), hint, &ctx.effective_cancel).await {
        Ok(outcome) => {
            ctx.fetch_policy.on_response(entry.canonical_url.as_url(), 200, None).await;
            outcome
        }
        Err(err) => {
            if let docscrawl_core::CrawlError::Http4xx { status, .. } | docscrawl_core::CrawlError::Http5xx { status, .. } = &err {
                ctx.fetch_policy.on_response(entry.canonical_url.as_url(), *status, None).await;
            }
            return PageRecord::failed(url_string, parent_string, entry.depth, err.kind(), err.to_string());
        }
    };

    let extracted = docscrawl_extractor::extract(&outcome.html, &outcome.final_url);

    let candidate_links: Vec<CanonicalUrl> = extracted.links_out.iter().cloned().map(CanonicalUrl::from_parts).collect();
    let in_scope_links: Vec<CanonicalUrl> = candidate_links
        .iter()
        .filter(|link| docscrawl_frontier::is_in_scope(&ctx.seed, link))
        .cloned()
        .collect();

    // Scope only constrains which host/path prefix a link belongs to; it says
    // nothing about whether that host resolves somewhere safe to dispatch a
    // request to. Every in-scope link still has to clear the same SSRF screen
    // the seed and redirect hops go through before it can reach the frontier.
    let safe_links = screen_candidate_links(in_scope_links, &ctx.trusted_hosts).await;

    let enqueued = ctx
        .frontier
        .offer_links(&ctx.seed, &entry.canonical_url, entry.depth, &safe_links, ctx.options.max_depth)
        .await;

    if !enqueued.is_empty() {
        ctx.discovered_total.fetch_add(enqueued.len() as u64, Ordering::Relaxed);
        if let Some(sink) = &ctx.progress_sink {
            for link in &enqueued {
                sink(ProgressEvent::Discovered { url: link.to_string(), depth: entry.depth + 1 });
            }
        }
    }

    PageRecord {
        url: url_string,
        title: extracted.title,
        discovered_from: parent_string,
        depth: entry.depth,
        content_markdown: extracted.content_markdown,
        content_html: extracted.content_html,
        links_out: safe_links.iter().map(|u| u.to_string()).collect(),
        rendered_with_browser: outcome.rendered_with_browser,
        from_cache: false,
        render_duration_ms: outcome.duration_ms,
        fetched_at: chrono::Utc::now(),
        status: PageStatus::Ok,
        error_kind: None,
        error_detail: None,
    }
}

/// Drops any link whose host resolves to a blocked IP range before it can
/// reach the frontier — the seed and redirect hops are screened at their own
/// call sites, but a discovered link never goes through `validate()`, only
/// `canonicalize()`, so it has to be screened here. A host already recorded
/// in `trusted_hosts` (the seed, or an earlier link on the same site) is
/// trusted without a fresh DNS round trip.
async fn screen_candidate_links(links: Vec<CanonicalUrl>, trusted_hosts: &StdMutex<HashSet<String>>) -> Vec<CanonicalUrl> {
    let mut safe = Vec::with_capacity(links.len());
    for link in links {
        if trusted_hosts.lock().unwrap().contains(link.host()) {
            safe.push(link);
            continue;
        }
        match docscrawl_validator::screen_host(link.host()).await {
            Ok(()) => {
                trusted_hosts.lock().unwrap().insert(link.host().to_string());
                safe.push(link);
            }
            Err(reason) => {
                tracing::warn!(url = %link, reason, "dropping discovered link that fails ssrf screening");
            }
        }
    }
    safe
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(raw: &str) -> CanonicalUrl {
        CanonicalUrl::from_parts(raw.parse().unwrap())
    }

    #[tokio::test]
    async fn screen_candidate_links_drops_blocked_hosts() {
        let trusted = StdMutex::new(HashSet::new());
        let links = vec![link("https://93.184.216.34/a"), link("http://169.254.169.254/latest/meta-data/")];

        let safe = screen_candidate_links(links, &trusted).await;

        assert_eq!(safe.len(), 1);
        assert_eq!(safe[0].host(), "93.184.216.34");
    }

    #[tokio::test]
    async fn screen_candidate_links_trusts_a_previously_cleared_host_without_rechecking() {
        let trusted = StdMutex::new(HashSet::from(["10.0.0.5".to_string()]));
        let links = vec![link("http://10.0.0.5/docs/b")];

        let safe = screen_candidate_links(links, &trusted).await;

        assert_eq!(safe.len(), 1, "a host already in trusted_hosts must not be re-screened even if it would now fail");
    }
}
