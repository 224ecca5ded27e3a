mod cli;

use anyhow::Result;
use clap::Parser;
use docscrawl_core::{config::AppConfig, CancelSignal, CrawlOptions, RenderMode};
use tracing::{info, warn};

use crate::cli::Cli;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)?;

    let mut options = CrawlOptions {
        max_workers: config.general.max_workers,
        max_pages: config.general.max_pages,
        max_depth: config.general.max_depth,
        render_mode: RenderMode::Auto,
        rate_limit_rps: config.fetch_policy.rate_limit_rps,
        burst: config.fetch_policy.burst,
        min_interval_ms: config.fetch_policy.min_interval_ms,
        request_timeout_ms: config.static_fetch.request_timeout_ms,
        render_timeout_ms: config.browser_pool.render_timeout_ms,
        max_retries: config.static_fetch.max_retries,
        backoff_base_ms: config.static_fetch.backoff_base_ms,
        backoff_cap_ms: config.static_fetch.backoff_cap_ms,
        respect_robots: config.fetch_policy.respect_robots,
        user_agent: config.general.user_agent.clone(),
        max_response_bytes: config.static_fetch.max_response_bytes,
        shutdown_grace_ms: config.general.shutdown_grace_ms,
        frontier_capacity: config.frontier.capacity,
        selector_overrides: config.browser_pool.selector_overrides.clone(),
    };

    if let Some(n) = cli.max_workers {
        options.max_workers = n;
    }
    if cli.max_pages.is_some() {
        options.max_pages = cli.max_pages;
    }
    if cli.max_depth.is_some() {
        options.max_depth = cli.max_depth;
    }
    if let Some(mode) = cli.render_mode.as_deref() {
        options.render_mode = match mode {
            "static-only" => RenderMode::StaticOnly,
            "browser-only" => RenderMode::BrowserOnly,
            _ => RenderMode::Auto,
        };
    }

    let cancel_signal = CancelSignal::new();
    let ctrl_c_cancel = cancel_signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("ctrl-c received, winding down");
            ctrl_c_cancel.cancel();
        }
    });

    info!(seed = %cli.seed, max_workers = options.max_workers, "starting crawl");
    let records = docscrawl_orchestrator::crawl(&cli.seed, options, None, cancel_signal).await?;
    info!(records = records.len(), "crawl finished");

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    for record in &records {
        serde_json::to_writer(&mut handle, record)?;
        use std::io::Write;
        writeln!(handle)?;
    }

    Ok(())
}
