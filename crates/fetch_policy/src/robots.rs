use dashmap::DashMap;
use robotstxt::DefaultMatcher;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct RobotsEntry {
    content: String,
    crawl_delay: Option<Duration>,
    expires_at: Instant,
}

/// `robots.txt` cache, keyed by `scheme://host`, with positive/negative TTLs.
///
/// Parsed lazily on first query for a host. A fetch failure is treated as
/// "no restrictions" and cached under the shorter negative TTL.
pub struct RobotsCache {
    http: reqwest::Client,
    user_agent: String,
    positive_ttl: Duration,
    negative_ttl: Duration,
    entries: DashMap<String, Arc<RwLock<RobotsEntry>>>,
}

impl RobotsCache {
    pub fn new(http: reqwest::Client, user_agent: String, positive_ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            http,
            user_agent,
            positive_ttl,
            negative_ttl,
            entries: DashMap::new(),
        }
    }

    async fn entry_for(&self, origin: &str) -> Arc<RwLock<RobotsEntry>> {
        if let Some(existing) = self.entries.get(origin) {
            if existing.read().await.expires_at > Instant::now() {
                return existing.clone();
            }
        }

        let fetched = self.fetch(origin).await;
        let (content, crawl_delay, ttl) = match fetched {
            Some(content) => {
                let delay = parse_crawl_delay(&content, &self.user_agent);
                (content, delay, self.positive_ttl)
            }
            None => (String::new(), None, self.negative_ttl),
        };

        let entry = Arc::new(RwLock::new(RobotsEntry {
            content,
            crawl_delay,
            expires_at: Instant::now() + ttl,
        }));
        self.entries.insert(origin.to_string(), entry.clone());
        entry
    }

    async fn fetch(&self, origin: &str) -> Option<String> {
        let url = format!("{origin}/robots.txt");
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            Ok(resp) => {
                tracing::warn!(origin, status = %resp.status(), "robots.txt fetch returned non-success status");
                None
            }
            Err(err) => {
                tracing::warn!(origin, error = %err, "robots.txt fetch failed");
                None
            }
        }
    }

    /// `scheme://host` → allow/deny for `path`, per the longest-match group
    /// with wildcard fallback.
    pub async fn is_allowed(&self, origin: &str, path: &str) -> bool {
        let entry = self.entry_for(origin).await;
        let guard = entry.read().await;
        if guard.content.is_empty() {
            return true;
        }
        let url = format!("{origin}{path}");
        DefaultMatcher::default().one_agent_allowed_by_robots(&guard.content, &self.user_agent, &url)
    }

    pub async fn crawl_delay(&self, origin: &str) -> Option<Duration> {
        let entry = self.entry_for(origin).await;
        entry.read().await.crawl_delay
    }
}

/// One `User-agent:` group: the (lowercased) agent tokens it was declared
/// for, and the directive lines that follow until the next group starts.
struct RobotsGroup {
    agents: Vec<String>,
    directives: Vec<(String, String)>,
}

/// Splits `content` into groups the way robots.txt defines them: one or more
/// consecutive `User-agent:` lines followed by their directives, ending at
/// the next `User-agent:` line that follows a non-agent directive.
fn parse_groups(content: &str) -> Vec<RobotsGroup> {
    let mut groups = Vec::new();
    let mut agents: Vec<String> = Vec::new();
    let mut directives: Vec<(String, String)> = Vec::new();
    let mut group_has_directives = false;

    for raw_line in content.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once(':') else { continue };
        let key = key.trim().to_lowercase();
        let value = value.trim().to_string();
        if value.is_empty() {
            continue;
        }

        if key == "user-agent" {
            if group_has_directives {
                groups.push(RobotsGroup { agents: std::mem::take(&mut agents), directives: std::mem::take(&mut directives) });
                group_has_directives = false;
            }
            agents.push(value.to_lowercase());
        } else {
            group_has_directives = true;
            directives.push((key, value));
        }
    }
    if !agents.is_empty() || !directives.is_empty() {
        groups.push(RobotsGroup { agents, directives });
    }
    groups
}

/// The `Crawl-delay` directive within the group matching `user_agent` — an
/// exact (non-wildcard) product-token match wins over the `*` fallback
/// group, mirroring how `is_allowed`'s matcher picks a group.
fn parse_crawl_delay(content: &str, user_agent: &str) -> Option<Duration> {
    let groups = parse_groups(content);
    let ua_lower = user_agent.to_lowercase();

    let matched = groups
        .iter()
        .find(|g| g.agents.iter().any(|a| a != "*" && ua_lower.contains(a.as_str())))
        .or_else(|| groups.iter().find(|g| g.agents.iter().any(|a| a == "*")));

    matched
        .and_then(|g| g.directives.iter().find(|(k, _)| k == "crawl-delay"))
        .and_then(|(_, v)| v.parse::<f64>().ok())
        .map(Duration::from_secs_f64)
}
