use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use docscrawl_core::CrawlError;
use futures::StreamExt;
use tokio::task::{self, JoinHandle};
use tracing::{error, trace, warn};

/// Finds a Chrome/Chromium executable, checking `CHROMIUM_PATH` first, then
/// common per-platform install locations, then `which`.
pub fn find_browser_executable() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        warn!("CHROMIUM_PATH points to a non-existent file: {}", path.display());
    }

    let candidates: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "~/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    };

    for candidate in candidates {
        let path = if let Some(rest) = candidate.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home) => home.join(rest),
                None => continue,
            }
        } else {
            PathBuf::from(candidate)
        };
        if path.exists() {
            return Some(path);
        }
    }

    if !cfg!(target_os = "windows") {
        for cmd in &["chromium", "chromium-browser", "google-chrome", "chrome"] {
            if let Ok(output) = Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path_str.is_empty() {
                        return Some(PathBuf::from(path_str));
                    }
                }
            }
        }
    }

    None
}

/// Launches a headless Chrome process with the flags needed to run inside
/// containers, returning the browser handle plus the background task that
/// drains its CDP event stream.
pub async fn launch_browser(
    user_data_dir: PathBuf,
    render_timeout: Duration,
) -> Result<(Browser, JoinHandle<()>), CrawlError> {
    std::fs::create_dir_all(&user_data_dir)
        .map_err(|e| CrawlError::BrowserUnavailable(format!("user data dir: {e}")))?;

    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(render_timeout)
        .window_size(1920, 1080)
        .user_data_dir(user_data_dir)
        .headless_mode(HeadlessMode::default())
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-gpu")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio");

    if let Some(chrome_path) = find_browser_executable() {
        builder = builder.chrome_executable(chrome_path);
    }

    let config = builder
        .build()
        .map_err(|e| CrawlError::BrowserUnavailable(format!("browser config: {e}")))?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| CrawlError::BrowserUnavailable(e.to_string()))?;

    let handler_task = task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                let msg = e.to_string();
                if msg.contains("data did not match any variant of untagged enum Message") {
                    trace!("suppressed benign CDP serialization error: {msg}");
                } else {
                    error!("browser handler error: {msg}");
                }
            }
        }
    });

    Ok((browser, handler_task))
}
