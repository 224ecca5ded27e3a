use dashmap::DashMap;
use docscrawl_core::CancelSignal;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Clone)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    last_request_at: Option<Instant>,
    penalty_until: Option<Instant>,
    min_interval: Duration,
    attempt: u32,
}

/// Per-host token bucket with adaptive backoff on `429`/`503`.
///
/// Shared by every worker touching that host; all mutation happens through
/// `acquire`/`on_response`, each of which locks only that host's bucket.
pub struct RateLimiter {
    capacity: f64,
    refill_rate: f64,
    base_min_interval: Duration,
    backoff_base: Duration,
    backoff_cap: Duration,
    buckets: DashMap<String, Arc<Mutex<BucketState>>>,
}

impl RateLimiter {
    pub fn new(
        requests_per_second: f64,
        burst: u32,
        min_interval: Duration,
        backoff_base: Duration,
        backoff_cap: Duration,
    ) -> Self {
        Self {
            capacity: burst.max(1) as f64,
            refill_rate: requests_per_second.max(0.001),
            base_min_interval: min_interval,
            backoff_base,
            backoff_cap,
            buckets: DashMap::new(),
        }
    }

    fn bucket_for(&self, host: &str) -> Arc<Mutex<BucketState>> {
        self.buckets
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(BucketState {
                    tokens: self.capacity,
                    last_refill: Instant::now(),
                    last_request_at: None,
                    penalty_until: None,
                    min_interval: self.base_min_interval,
                    attempt: 0,
                }))
            })
            .clone()
    }

    /// robots.txt's `Crawl-delay`, if larger than the configured floor, wins.
    pub fn set_min_interval(&self, host: &str, min_interval: Duration) {
        let bucket = self.bucket_for(host);
        if let Ok(mut guard) = bucket.try_lock() {
            guard.min_interval = guard.min_interval.max(min_interval);
        }
    }

    /// Blocks until a token is available, `min_interval` has elapsed since the
    /// last request, and any active penalty has expired. Returns promptly
    /// with `false` if `cancel` trips first.
    pub async fn acquire(&self, host: &str, cancel: &CancelSignal) -> bool {
        let bucket = self.bucket_for(host);

        loop {
            if cancel.is_cancelled() {
                return false;
            }

            let wait = {
                let mut guard = bucket.lock().await;
                refill(&mut guard, self.refill_rate, self.capacity);

                let now = Instant::now();
                let penalty_wait = guard
                    .penalty_until
                    .map(|until| until.saturating_duration_since(now))
                    .unwrap_or_default();
                let interval_wait = guard
                    .last_request_at
                    .map(|last| {
                        let elapsed = now.duration_since(last);
                        guard.min_interval.saturating_sub(elapsed)
                    })
                    .unwrap_or_default();

                if guard.tokens >= 1.0 && penalty_wait.is_zero() && interval_wait.is_zero() {
                    guard.tokens -= 1.0;
                    guard.last_request_at = Some(now);
                    None
                } else {
                    Some(penalty_wait.max(interval_wait).max(Duration::from_millis(10)))
                }
            };

            match wait {
                None => return true,
                Some(d) => {
                    tokio::select! {
                        _ = sleep(d) => {}
                        _ = cancel.cancelled() => return false,
                    }
                }
            }
        }
    }

    /// Feeds a response back so repeated `429`/`503` progressively slow the host.
    pub async fn on_response(&self, host: &str, status: u16, retry_after: Option<Duration>) {
        let bucket = self.bucket_for(host);
        let mut guard = bucket.lock().await;

        if status == 429 || status == 503 {
            let backoff = exponential_backoff(self.backoff_base, self.backoff_cap, guard.attempt);
            guard.attempt = guard.attempt.saturating_add(1);
            let delay = retry_after.unwrap_or(Duration::ZERO).max(backoff);
            guard.penalty_until = Some(Instant::now() + delay);
        } else if status < 400 {
            guard.attempt = 0;
            if let Some(until) = guard.penalty_until {
                if until <= Instant::now() {
                    guard.penalty_until = None;
                }
            }
        }
    }
}

fn refill(guard: &mut BucketState, refill_rate: f64, capacity: f64) {
    let now = Instant::now();
    let elapsed = now.duration_since(guard.last_refill).as_secs_f64();
    guard.tokens = (guard.tokens + elapsed * refill_rate).min(capacity);
    guard.last_refill = now;
}

fn exponential_backoff(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exp = base.as_millis().saturating_mul(1u128 << attempt.min(16));
    let capped = exp.min(cap.as_millis());
    let jitter_ms = rand::thread_rng().gen_range(0..=(capped / 4).max(1) as u64);
    Duration::from_millis(capped as u64) + Duration::from_millis(jitter_ms)
}
