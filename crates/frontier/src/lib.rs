use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use docscrawl_core::{CancelSignal, CanonicalUrl, FrontierEntry};
use tokio::sync::{Mutex, Notify};
use tracing::warn;

/// A canonical URL is in-scope iff its host matches the seed's host
/// (case-insensitive) and its path starts with the seed's path prefix.
pub fn is_in_scope(seed: &CanonicalUrl, candidate: &CanonicalUrl) -> bool {
    candidate.host().eq_ignore_ascii_case(seed.host()) && candidate.path().starts_with(seed.path())
}

/// A bounded BFS queue plus the exact visited set that guards it. Enqueue
/// and visited-insert happen atomically: a link is marked visited the
/// moment it passes the in-scope filter, whether or not it is actually
/// enqueued, so a frontier-full drop never causes a retry loop.
pub struct Frontier {
    capacity: usize,
    queue: Mutex<VecDeque<FrontierEntry>>,
    visited: DashMap<CanonicalUrl, ()>,
    notify: Notify,
    in_flight: AtomicUsize,
}

impl Frontier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::new()),
            visited: DashMap::new(),
            notify: Notify::new(),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Marks the seed visited and enqueues it at depth 0.
    pub async fn seed(&self, canonical: CanonicalUrl) {
        self.visited.insert(canonical.clone(), ());
        let entry = FrontierEntry {
            canonical_url: canonical,
            depth: 0,
            discovered_from: None,
            enqueued_at: Utc::now(),
        };
        self.queue.lock().await.push_back(entry);
        self.notify.notify_one();
    }

    /// Filters `links` by the in-scope predicate against `seed` and the
    /// depth cap, deduplicates against the visited set, and enqueues the
    /// rest. Returns the links actually enqueued (callers use this to build
    /// a page record's `links_out`). If the queue is at `capacity`, newest
    /// enqueue attempts are dropped and logged — the link stays marked
    /// visited so it is never retried.
    pub async fn offer_links(
        &self,
        seed: &CanonicalUrl,
        parent: &CanonicalUrl,
        parent_depth: u32,
        links: &[CanonicalUrl],
        max_depth: Option<u32>,
    ) -> Vec<CanonicalUrl> {
        let next_depth = parent_depth + 1;
        if let Some(max) = max_depth {
            if next_depth > max {
                return Vec::new();
            }
        }

        let mut enqueued = Vec::with_capacity(links.len());
        for link in links {
            if !is_in_scope(seed, link) {
                continue;
            }
            if self.visited.insert(link.clone(), ()).is_some() {
                continue;
            }

            let entry = FrontierEntry {
                canonical_url: link.clone(),
                depth: next_depth,
                discovered_from: Some(parent.clone()),
                enqueued_at: Utc::now(),
            };

            let mut queue = self.queue.lock().await;
            if queue.len() >= self.capacity {
                drop(queue);
                warn!(url = %link, "frontier at capacity, dropping newest enqueue attempt");
                continue;
            }
            queue.push_back(entry);
            drop(queue);
            self.notify.notify_one();
            enqueued.push(link.clone());
        }
        enqueued
    }

    /// Blocks until an entry is available, the frontier is exhausted (empty
    /// queue and no worker in flight), or `cancel` trips. Increments the
    /// in-flight counter on a successful take; callers must call
    /// [`Frontier::mark_done`] when they finish processing the entry.
    pub async fn take(&self, cancel: &CancelSignal) -> Option<FrontierEntry> {
        loop {
            {
                let mut queue = self.queue.lock().await;
                if let Some(entry) = queue.pop_front() {
                    self.in_flight.fetch_add(1, Ordering::SeqCst);
                    return Some(entry);
                }
                if self.in_flight.load(Ordering::SeqCst) == 0 {
                    return None;
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
        }
    }

    /// Marks a previously-taken entry as finished, wakes waiters so they can
    /// re-check the termination condition.
    pub fn mark_done(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> CanonicalUrl {
        CanonicalUrl::from_parts(url::Url::parse(s).unwrap())
    }

    #[tokio::test]
    async fn seeding_marks_visited_and_enqueues_depth_zero() {
        let frontier = Frontier::new(10);
        let seed = url("https://docs.example.test/guide/");
        frontier.seed(seed.clone()).await;

        assert_eq!(frontier.visited_count(), 1);
        let entry = frontier.take(&CancelSignal::new()).await.unwrap();
        assert_eq!(entry.depth, 0);
        assert_eq!(entry.canonical_url, seed);
    }

    #[tokio::test]
    async fn offer_links_drops_out_of_scope_and_duplicate_links() {
        let frontier = Frontier::new(10);
        let seed = url("https://docs.example.test/guide/");
        frontier.seed(seed.clone()).await;
        frontier.take(&CancelSignal::new()).await;

        let in_scope = url("https://docs.example.test/guide/intro");
        let out_of_scope_host = url("https://other.example.test/guide/intro");
        let out_of_scope_path = url("https://docs.example.test/blog/post");

        let enqueued = frontier
            .offer_links(
                &seed,
                &seed,
                0,
                &[in_scope.clone(), out_of_scope_host, out_of_scope_path],
                None,
            )
            .await;
        assert_eq!(enqueued, vec![in_scope.clone()]);

        let again = frontier.offer_links(&seed, &seed, 0, &[in_scope], None).await;
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn offer_links_respects_max_depth() {
        let frontier = Frontier::new(10);
        let seed = url("https://docs.example.test/");
        frontier.seed(seed.clone()).await;
        frontier.take(&CancelSignal::new()).await;

        let link = url("https://docs.example.test/deep/page");
        let enqueued = frontier.offer_links(&seed, &seed, 5, &[link], Some(5)).await;
        assert!(enqueued.is_empty());
    }

    #[tokio::test]
    async fn take_returns_none_once_queue_empty_and_nothing_in_flight() {
        let frontier = Frontier::new(10);
        let seed = url("https://docs.example.test/");
        frontier.seed(seed).await;

        let entry = frontier.take(&CancelSignal::new()).await;
        assert!(entry.is_some());
        frontier.mark_done();

        let next = frontier.take(&CancelSignal::new()).await;
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn full_frontier_drops_newest_enqueue_but_keeps_it_visited() {
        let frontier = Frontier::new(1);
        let seed = url("https://docs.example.test/");
        frontier.seed(seed.clone()).await;
        frontier.take(&CancelSignal::new()).await;

        let a = url("https://docs.example.test/a");
        let b = url("https://docs.example.test/b");
        let enqueued = frontier.offer_links(&seed, &seed, 0, &[a, b.clone()], None).await;
        assert_eq!(enqueued.len(), 1);

        // the dropped link is still marked visited, so offering it again is a no-op.
        let retried = frontier.offer_links(&seed, &seed, 0, &[b], None).await;
        assert!(retried.is_empty());
    }
}
