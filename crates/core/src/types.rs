use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use url::Url;

/// A URL reduced to scheme + host + port + path, query and fragment stripped.
///
/// Two inputs are the same page iff they canonicalize equal; canonicalization
/// happens once, at enqueue time, in `crates/validator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    /// Wraps an already-canonical `Url` without re-normalizing it.
    ///
    /// Callers outside `crates/validator` should go through
    /// `docscrawl_validator::validate` instead of calling this directly.
    pub fn from_parts(url: Url) -> Self {
        Self(url)
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for CanonicalUrl {
    fn eq(&self, other: &Self) -> bool {
        self.0.scheme() == other.0.scheme()
            && self.0.host_str() == other.0.host_str()
            && self.0.port_or_known_default() == other.0.port_or_known_default()
            && self.0.path() == other.0.path()
    }
}

impl Eq for CanonicalUrl {}

impl Hash for CanonicalUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.scheme().hash(state);
        self.0.host_str().hash(state);
        self.0.port_or_known_default().hash(state);
        self.0.path().hash(state);
    }
}

/// One entry waiting in the frontier.
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub canonical_url: CanonicalUrl,
    pub depth: u32,
    pub discovered_from: Option<CanonicalUrl>,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of one URL's trip through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Ok,
    SkippedRobots,
    SkippedScope,
    Failed,
}

/// The immutable unit the crawl emits per URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub title: Option<String>,
    pub discovered_from: Option<String>,
    pub depth: u32,
    pub content_markdown: String,
    pub content_html: String,
    pub links_out: Vec<String>,
    pub rendered_with_browser: bool,
    pub from_cache: bool,
    pub render_duration_ms: u64,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub status: PageStatus,
    pub error_kind: Option<String>,
    pub error_detail: Option<String>,
}

impl PageRecord {
    pub fn failed(url: String, discovered_from: Option<String>, depth: u32, error_kind: &str, error_detail: String) -> Self {
        Self {
            url,
            title: None,
            discovered_from,
            depth,
            content_markdown: String::new(),
            content_html: String::new(),
            links_out: Vec::new(),
            rendered_with_browser: false,
            from_cache: false,
            render_duration_ms: 0,
            fetched_at: chrono::Utc::now(),
            status: PageStatus::Failed,
            error_kind: Some(error_kind.to_string()),
            error_detail: Some(error_detail),
        }
    }

    pub fn skipped_robots(url: String, discovered_from: Option<String>, depth: u32) -> Self {
        Self {
            url,
            title: None,
            discovered_from,
            depth,
            content_markdown: String::new(),
            content_html: String::new(),
            links_out: Vec::new(),
            rendered_with_browser: false,
            from_cache: false,
            render_duration_ms: 0,
            fetched_at: chrono::Utc::now(),
            status: PageStatus::SkippedRobots,
            error_kind: Some("robots_denied".to_string()),
            error_detail: None,
        }
    }
}

/// How the Hybrid Renderer should choose between static and browser rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    #[default]
    Auto,
    StaticOnly,
    BrowserOnly,
}

/// A caller hint overriding the SPA Detector's classification for one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderHint {
    None,
    ForceStatic,
    ForceBrowser,
}

/// Tunables for one `crawl()` call, all with the defaults named in the contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlOptions {
    pub max_workers: usize,
    pub max_pages: Option<u64>,
    pub max_depth: Option<u32>,
    pub render_mode: RenderMode,
    pub rate_limit_rps: f64,
    pub burst: u32,
    pub min_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub render_timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub respect_robots: bool,
    pub user_agent: String,
    pub max_response_bytes: u64,
    pub shutdown_grace_ms: u64,
    pub frontier_capacity: usize,
    /// Per-host CSS selector to wait for after a browser navigation,
    /// keyed by hostname. Empty unless the caller's config names one.
    pub selector_overrides: std::collections::HashMap<String, String>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_workers: 10,
            max_pages: None,
            max_depth: None,
            render_mode: RenderMode::Auto,
            rate_limit_rps: 2.0,
            burst: 4,
            min_interval_ms: 500,
            request_timeout_ms: 30_000,
            render_timeout_ms: 30_000,
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_cap_ms: 30_000,
            respect_robots: true,
            user_agent: "docscrawl/0.1".to_string(),
            max_response_bytes: 100 * 1024 * 1024,
            shutdown_grace_ms: 5_000,
            frontier_capacity: 100_000,
            selector_overrides: std::collections::HashMap::new(),
        }
    }
}

impl CrawlOptions {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Counters reported to `progress_sink` at discovery, completion, and terminal milestones.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub discovered: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: u64,
}

/// A milestone pushed to the caller's progress callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    Discovered { url: String, depth: u32 },
    Completed { url: String, status: PageStatus },
    Terminal { counters: ProgressCounters },
}

/// A callback invoked at crawl milestones; see `ProgressEvent`.
pub type ProgressSink = std::sync::Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Cooperative cancellation, handed to every blocking point in a worker.
pub type CancelSignal = tokio_util::sync::CancellationToken;
