pub mod ssrf;
pub mod url_canon;

use docscrawl_core::{CanonicalUrl, CrawlError};

pub use ssrf::screen_host;
pub use url_canon::canonicalize;

/// Accepts only `http`/`https`, canonicalizes, and screens the resolved host
/// against private/loopback/link-local/metadata ranges.
pub async fn validate(raw_url: &str) -> Result<CanonicalUrl, CrawlError> {
    let url = canonicalize(raw_url).map_err(|e| CrawlError::UnsafeUrl(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(CrawlError::UnsafeUrl(format!("unsupported scheme: {}", url.scheme())));
    }

    let host = url.host_str().ok_or_else(|| CrawlError::UnsafeUrl("missing host".to_string()))?;
    screen_host(host)
        .await
        .map_err(|reason| CrawlError::UnsafeUrl(reason))?;

    Ok(CanonicalUrl::from_parts(url))
}

/// Strips path separators, null bytes, and `..`, truncating to 255 bytes.
///
/// Used only when a caller writes page records to disk as artifacts; the
/// core itself performs no filesystem I/O.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| *c != '\0' && *c != '/' && *c != '\\')
        .collect();
    let cleaned = cleaned.replace("..", "");
    let mut bytes = cleaned.into_bytes();
    bytes.truncate(255);
    while !bytes.is_empty() && !std::str::from_utf8(&bytes).is_ok() {
        bytes.pop();
    }
    String::from_utf8(bytes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let err = validate("ftp://example.test/file").await.unwrap_err();
        assert_eq!(err.kind(), "unsafe_url");
    }

    #[tokio::test]
    async fn rejects_localhost() {
        let err = validate("http://localhost/").await.unwrap_err();
        assert_eq!(err.kind(), "unsafe_url");
    }

    #[tokio::test]
    async fn rejects_cloud_metadata_address() {
        let err = validate("http://169.254.169.254/latest/meta-data/").await.unwrap_err();
        assert_eq!(err.kind(), "unsafe_url");
    }

    #[test]
    fn sanitize_filename_strips_traversal_and_separators() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_filename("a\0b/c\\d"), "abcd");
    }

    #[test]
    fn sanitize_filename_truncates() {
        let long = "a".repeat(400);
        assert!(sanitize_filename(&long).len() <= 255);
    }
}
