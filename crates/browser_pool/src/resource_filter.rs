use chromiumoxide::cdp::browser_protocol::network::SetBlockedUrLsParams;
use chromiumoxide::page::Page;
use docscrawl_core::CrawlError;

fn extensions_for(resource_type: &str) -> &'static [&'static str] {
    match resource_type {
        "image" => &["*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico", "*.avif"],
        "font" => &["*.woff", "*.woff2", "*.ttf", "*.otf", "*.eot"],
        "media" => &["*.mp4", "*.webm", "*.mp3", "*.wav", "*.ogg", "*.avi"],
        "stylesheet" => &["*.css"],
        _ => &[],
    }
}

/// Builds the CDP `Network.setBlockedURLs` pattern list for a page's
/// resource policy: blocked sub-resource classes by file extension, plus an
/// explicit analytics/ad host deny-list. A performance contract, not a
/// correctness one — patterns that miss a host never block navigation.
pub fn blocked_url_patterns(block_resource_types: &[String], deny_list_hosts: &[String]) -> Vec<String> {
    let mut patterns = Vec::new();
    for resource_type in block_resource_types {
        patterns.extend(extensions_for(resource_type).iter().map(|s| s.to_string()));
    }
    for host in deny_list_hosts {
        patterns.push(format!("*://{host}/*"));
    }
    patterns
}

pub async fn apply(page: &Page, block_resource_types: &[String], deny_list_hosts: &[String]) -> Result<(), CrawlError> {
    let patterns = blocked_url_patterns(block_resource_types, deny_list_hosts);
    if patterns.is_empty() {
        return Ok(());
    }
    page.execute(SetBlockedUrLsParams::new(patterns))
        .await
        .map_err(|e| CrawlError::Other(format!("set blocked urls: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_resource_types_to_extension_globs() {
        let patterns = blocked_url_patterns(&["image".to_string(), "stylesheet".to_string()], &[]);
        assert!(patterns.contains(&"*.png".to_string()));
        assert!(patterns.contains(&"*.css".to_string()));
    }

    #[test]
    fn includes_deny_list_hosts_as_wildcard_origins() {
        let patterns = blocked_url_patterns(&[], &["ads.example.test".to_string()]);
        assert_eq!(patterns, vec!["*://ads.example.test/*".to_string()]);
    }

    #[test]
    fn unknown_resource_type_contributes_no_patterns() {
        let patterns = blocked_url_patterns(&["video-preview".to_string()], &[]);
        assert!(patterns.is_empty());
    }
}
