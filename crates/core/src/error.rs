use thiserror::Error;

/// Errors a crawl can surface, either for a single URL or for the whole call.
///
/// Transient kinds are retried locally by whichever component produced them;
/// everything else is captured in a page record's error fields and never
/// aborts the crawl.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrawlError {
    #[error("unsafe url: {0}")]
    UnsafeUrl(String),

    #[error("robots.txt denies: {0}")]
    RobotsDenied(String),

    #[error("http {status}: {detail}")]
    Http4xx { status: u16, detail: String },

    #[error("http {status}: {detail}")]
    Http5xx { status: u16, detail: String },

    #[error("connect error: {0}")]
    Connect(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("unsafe redirect to {0}")]
    UnsafeRedirect(String),

    #[error("browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("navigation timed out after {0}ms")]
    NavigationTimeout(u64),

    #[error("browser page crashed: {0}")]
    PageCrashed(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl CrawlError {
    /// Stable kind string used in a page record's `error_kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            CrawlError::UnsafeUrl(_) => "unsafe_url",
            CrawlError::RobotsDenied(_) => "robots_denied",
            CrawlError::Http4xx { .. } => "http_4xx",
            CrawlError::Http5xx { .. } => "http_5xx",
            CrawlError::Connect(_) => "connect",
            CrawlError::Timeout(_) => "timeout",
            CrawlError::PayloadTooLarge { .. } => "payload_too_large",
            CrawlError::UnsafeRedirect(_) => "unsafe_redirect",
            CrawlError::BrowserUnavailable(_) => "browser_unavailable",
            CrawlError::BrowserLaunchFailed(_) => "browser_launch_failed",
            CrawlError::NavigationTimeout(_) => "navigation_timeout",
            CrawlError::PageCrashed(_) => "page_crashed",
            CrawlError::Cancelled => "cancelled",
            CrawlError::Other(_) => "other",
        }
    }

    /// Whether a fresh attempt is worth making.
    pub fn is_retryable(&self) -> bool {
        match self {
            CrawlError::Http5xx { .. }
            | CrawlError::Connect(_)
            | CrawlError::Timeout(_)
            | CrawlError::BrowserLaunchFailed(_)
            | CrawlError::NavigationTimeout(_)
            | CrawlError::PageCrashed(_) => true,
            CrawlError::Http4xx { status, .. } => *status == 408 || *status == 429,
            _ => false,
        }
    }
}

/// Fatal, whole-call failures: corruption of orchestrator-owned state.
/// Everything else is per-URL and lands in a `PageRecord` instead.
#[derive(Error, Debug)]
pub enum FatalCrawlError {
    #[error("frontier corrupted: {0}")]
    FrontierCorrupted(String),

    #[error("invalid seed url: {0}")]
    InvalidSeed(#[from] CrawlError),

    #[error("config error: {0}")]
    Config(String),
}
