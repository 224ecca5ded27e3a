use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub fetch_policy: FetchPolicyConfig,
    pub static_fetch: StaticFetchConfig,
    pub browser_pool: BrowserPoolConfig,
    pub spa_detector: SpaDetectorConfig,
    pub extractor: ExtractorConfig,
    pub frontier: FrontierConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    pub max_workers: usize,
    pub max_depth: Option<u32>,
    pub max_pages: Option<u64>,
    pub user_agent: String,
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct FetchPolicyConfig {
    pub respect_robots: bool,
    pub rate_limit_rps: f64,
    pub burst: u32,
    pub min_interval_ms: u64,
    pub robots_positive_ttl_secs: u64,
    pub robots_negative_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StaticFetchConfig {
    pub request_timeout_ms: u64,
    pub max_response_bytes: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub per_host_connections: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BrowserPoolConfig {
    pub max_browsers: usize,
    pub contexts_per_browser: usize,
    pub render_timeout_ms: u64,
    pub selector_wait_ms: u64,
    pub max_render_attempts: u32,
    pub shutdown_grace_ms: u64,
    pub block_resource_types: Vec<String>,
    pub deny_list_hosts: Vec<String>,
    /// Per-host CSS selector to wait for after navigation, keyed by hostname.
    #[serde(default)]
    pub selector_overrides: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SpaDetectorConfig {
    pub confidence_threshold: f64,
    pub min_content_chars: usize,
    pub empty_root_text_threshold: usize,
    pub script_count_threshold: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ExtractorConfig {
    pub main_content_selectors: Vec<String>,
    pub chrome_removal_selectors: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct FrontierConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    100_000
}

impl AppConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => {
                tracing::warn!(path, "config file not found, using defaults");
                include_str!("../config/default.toml").to_string()
            }
        };
        let config: AppConfig = toml::from_str(&raw)?;
        Ok(config)
    }
}
