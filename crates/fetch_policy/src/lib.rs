pub mod rate_limiter;
pub mod robots;

pub use rate_limiter::RateLimiter;
pub use robots::RobotsCache;

use docscrawl_core::{CancelSignal, CrawlError};
use std::time::Duration;
use url::Url;

/// Gates a URL on `robots.txt` then the per-host rate limiter, in that order,
/// so a robots-denied URL never consumes a rate-limit token.
pub struct FetchPolicy {
    pub limiter: RateLimiter,
    pub robots: RobotsCache,
    respect_robots: bool,
}

impl FetchPolicy {
    pub fn new(limiter: RateLimiter, robots: RobotsCache, respect_robots: bool) -> Self {
        Self { limiter, robots, respect_robots }
    }

    /// Returns `Ok(())` if the worker may proceed to fetch, or the
    /// non-retryable/retryable `CrawlError` to surface instead.
    pub async fn admit(&self, url: &Url, cancel: &CancelSignal) -> Result<(), CrawlError> {
        let origin = origin_of(url);
        let host = url.host_str().unwrap_or_default().to_string();

        if self.respect_robots {
            if !self.robots.is_allowed(&origin, url.path()).await {
                return Err(CrawlError::RobotsDenied(url.to_string()));
            }
            if let Some(delay) = self.robots.crawl_delay(&origin).await {
                self.limiter.set_min_interval(&host, delay);
            }
        }

        if !self.limiter.acquire(&host, cancel).await {
            return Err(CrawlError::Cancelled);
        }

        Ok(())
    }

    pub async fn on_response(&self, url: &Url, status: u16, retry_after: Option<Duration>) {
        let host = url.host_str().unwrap_or_default();
        self.limiter.on_response(host, status, retry_after).await;
    }
}

fn origin_of(url: &Url) -> String {
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), url.host_str().unwrap_or_default(), port),
        None => format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default()),
    }
}
