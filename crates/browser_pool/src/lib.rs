pub mod launch;
pub mod resource_filter;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserContext};
use chromiumoxide::cdp::browser_protocol::target::CreateBrowserContextParams;
use chromiumoxide::page::Page;
use docscrawl_core::{BrowserPoolConfig, CancelSignal, CrawlError};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::warn;

/// An idle, reusable navigation context sitting in a browser's LRU queue.
struct PooledContext {
    context: BrowserContext,
    last_used: Instant,
}

/// A long-lived headless Chrome process plus the set of contexts opened
/// inside it. `live_context_count` counts every context this browser has
/// created (checked out or idle); `contexts` holds only the idle ones.
struct PooledBrowser {
    id: u64,
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    contexts: VecDeque<PooledContext>,
    live_context_count: usize,
}

/// Bounded browser → context → page hierarchy. `max_browsers` long-lived
/// processes, each holding up to `contexts_per_browser` reusable contexts;
/// a global semaphore caps concurrently open pages at their product.
pub struct BrowserPool {
    config: BrowserPoolConfig,
    browsers: Mutex<Vec<PooledBrowser>>,
    semaphore: Arc<Semaphore>,
    next_browser_id: AtomicU64,
    draining: AtomicBool,
    user_data_root: PathBuf,
}

impl BrowserPool {
    pub fn new(config: BrowserPoolConfig) -> Arc<Self> {
        let capacity = (config.max_browsers * config.contexts_per_browser).max(1);
        let user_data_root = std::env::temp_dir().join(format!("docscrawl_chrome_{}", std::process::id()));
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            browsers: Mutex::new(Vec::new()),
            next_browser_id: AtomicU64::new(0),
            draining: AtomicBool::new(false),
            user_data_root,
            config,
        })
    }

    /// Blocks on the pool-wide semaphore, selects or lazily starts a
    /// browser, creates or reuses a context inside it, and opens a fresh
    /// page. Returns `browser_unavailable` if cancelled or at capacity with
    /// nothing to hand out.
    pub async fn acquire_page(self: &Arc<Self>, cancel: &CancelSignal) -> Result<PageHandle, CrawlError> {
        if self.draining.load(Ordering::Acquire) {
            return Err(CrawlError::BrowserUnavailable("pool is draining".to_string()));
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
            res = Arc::clone(&self.semaphore).acquire_owned() => {
                res.map_err(|_| CrawlError::BrowserUnavailable("pool semaphore closed".to_string()))?
            }
        };

        let mut browsers = self.browsers.lock().await;
        let idx = self.select_or_launch_browser(&mut browsers).await?;
        let browser_id = browsers[idx].id;

        // Prefer opening a fresh context while under capacity; only fall back
        // to recycling the LRU idle context once the browser is saturated.
        let (reused, create_from) = if browsers[idx].live_context_count < self.config.contexts_per_browser {
            browsers[idx].live_context_count += 1;
            (None, Some(Arc::clone(&browsers[idx].browser)))
        } else {
            (browsers[idx].contexts.pop_front(), None)
        };
        drop(browsers);

        let context = match reused {
            Some(pooled) => pooled.context,
            None => {
                let browser = create_from.expect("create_from set when no idle context was reused");
                browser
                    .create_browser_context(CreateBrowserContextParams::default())
                    .await
                    .map_err(|e| CrawlError::BrowserUnavailable(e.to_string()))?
            }
        };

        let page = context
            .new_page("about:blank")
            .await
            .map_err(|e| CrawlError::BrowserUnavailable(e.to_string()))?;

        resource_filter::apply(&page, &self.config.block_resource_types, &self.config.deny_list_hosts).await?;

        Ok(PageHandle {
            page: Some(page),
            context: Some(context),
            browser_id,
            poisoned: false,
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Selects the ready browser with the fewest live contexts that still
    /// has room (an idle context to reuse, or headroom under
    /// `contexts_per_browser`); lazily launches a new browser if none
    /// qualifies and the pool is under `max_browsers`.
    async fn select_or_launch_browser(&self, browsers: &mut Vec<PooledBrowser>) -> Result<usize, CrawlError> {
        let cap = self.config.contexts_per_browser;
        let mut best: Option<(usize, usize)> = None;
        for (i, b) in browsers.iter().enumerate() {
            let has_room = !b.contexts.is_empty() || b.live_context_count < cap;
            if !has_room {
                continue;
            }
            if best.map(|(_, live)| b.live_context_count < live).unwrap_or(true) {
                best = Some((i, b.live_context_count));
            }
        }

        if let Some((idx, _)) = best {
            return Ok(idx);
        }

        if browsers.len() >= self.config.max_browsers {
            return Err(CrawlError::BrowserUnavailable(
                "pool at capacity with no idle context available".to_string(),
            ));
        }

        let id = self.next_browser_id.fetch_add(1, Ordering::Relaxed);
        let user_data_dir = self.user_data_root.join(format!("browser-{id}"));
        let render_timeout = Duration::from_millis(self.config.render_timeout_ms);

        // browser_launch_failed is fatal to the pool's attempt but retried once:
        // headless Chrome occasionally fails its first launch under container
        // cgroup pressure and succeeds immediately after.
        let (browser, handler) = match launch::launch_browser(user_data_dir.clone(), render_timeout).await {
            Ok(launched) => launched,
            Err(first_err) => {
                warn!("browser launch failed, retrying once: {first_err}");
                launch::launch_browser(user_data_dir, render_timeout)
                    .await
                    .map_err(|e| CrawlError::BrowserLaunchFailed(e.to_string()))?
            }
        };

        browsers.push(PooledBrowser {
            id,
            browser: Arc::new(browser),
            handler,
            contexts: VecDeque::new(),
            live_context_count: 0,
        });
        Ok(browsers.len() - 1)
    }

    async fn on_context_released(&self, browser_id: u64, context: BrowserContext) {
        let mut browsers = self.browsers.lock().await;
        if let Some(browser) = browsers.iter_mut().find(|b| b.id == browser_id) {
            browser.contexts.push_back(PooledContext { context, last_used: Instant::now() });
        }
    }

    async fn on_context_discarded(&self, browser_id: u64) {
        let mut browsers = self.browsers.lock().await;
        if let Some(browser) = browsers.iter_mut().find(|b| b.id == browser_id) {
            browser.live_context_count = browser.live_context_count.saturating_sub(1);
        }
    }

    /// Stops accepting new acquisitions, waits up to `grace` for
    /// outstanding pages to release their semaphore permits, then disposes
    /// every context and terminates every browser.
    pub async fn drain(&self, grace: Duration) {
        self.draining.store(true, Ordering::Release);

        let total = (self.config.max_browsers * self.config.contexts_per_browser).max(1) as u32;
        let wait_all = Arc::clone(&self.semaphore).acquire_many_owned(total);
        let _ = tokio::time::timeout(grace, wait_all).await;

        let mut browsers = self.browsers.lock().await;
        for mut pooled in browsers.drain(..) {
            for idle in pooled.contexts.drain(..) {
                if let Err(e) = idle.context.dispose().await {
                    warn!("error disposing context during drain: {e}");
                }
            }
            if let Some(browser) = Arc::get_mut(&mut pooled.browser) {
                if let Err(e) = browser.close().await {
                    warn!("error closing browser {}: {e}", pooled.id);
                }
                let _ = browser.wait().await;
            } else {
                warn!("browser {} has outstanding references, skipping graceful close", pooled.id);
            }
            pooled.handler.abort();
        }
    }
}

/// A single-use navigation handle: one page bound to exactly one context,
/// which is bound to exactly one browser for its lifetime.
pub struct PageHandle {
    page: Option<Page>,
    context: Option<BrowserContext>,
    browser_id: u64,
    poisoned: bool,
    pool: Arc<BrowserPool>,
    _permit: OwnedSemaphorePermit,
}

impl PageHandle {
    pub fn page(&self) -> &Page {
        self.page.as_ref().expect("page handle used after release")
    }

    /// Marks the context as unusable for reuse — called by the renderer on
    /// a page crash. The context is discarded instead of recycled when
    /// this handle is released, and a fresh one is created on next demand.
    pub fn poison(&mut self) {
        self.poisoned = true;
    }

    /// Closes the page; the context survives for reuse unless poisoned.
    pub async fn release(mut self) {
        self.release_inner().await;
    }

    async fn release_inner(&mut self) {
        let Some(page) = self.page.take() else { return };
        if let Err(e) = page.close().await {
            warn!("error closing page: {e}");
        }

        let Some(context) = self.context.take() else { return };
        if self.poisoned {
            if let Err(e) = context.dispose().await {
                warn!("error disposing poisoned context: {e}");
            }
            self.pool.on_context_discarded(self.browser_id).await;
        } else {
            self.pool.on_context_released(self.browser_id, context).await;
        }
    }
}

impl Drop for PageHandle {
    fn drop(&mut self) {
        if self.page.is_none() {
            return;
        }
        let page = self.page.take();
        let context = self.context.take();
        let pool = Arc::clone(&self.pool);
        let browser_id = self.browser_id;
        let poisoned = self.poisoned;
        tokio::spawn(async move {
            if let Some(page) = page {
                let _ = page.close().await;
            }
            if let Some(context) = context {
                if poisoned {
                    let _ = context.dispose().await;
                    pool.on_context_discarded(browser_id).await;
                } else {
                    pool.on_context_released(browser_id, context).await;
                }
            }
        });
    }
}
