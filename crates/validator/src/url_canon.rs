use url::Url;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("malformed url: {0}")]
    Malformed(String),
    #[error("missing host")]
    MissingHost,
}

/// Parses and normalizes a URL: lowercases the host, strips the default port,
/// drops query and fragment. Dot-segment collapsing (`.`/`..`) is handled by
/// the underlying parser as it resolves the path.
pub fn canonicalize(raw: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(raw).map_err(|e| UrlError::Malformed(e.to_string()))?;

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    let host_lower = url.host_str().unwrap().to_lowercase();
    url.set_host(Some(&host_lower)).map_err(|e| UrlError::Malformed(e.to_string()))?;

    if let Some(port) = url.port() {
        if url.port_or_known_default() == Some(port) && url.scheme() == "http" && port == 80 {
            let _ = url.set_port(None);
        } else if url.scheme() == "https" && port == 443 {
            let _ = url.set_port(None);
        }
    }

    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_host() {
        let url = canonicalize("http://Example.TEST/Path").unwrap();
        assert_eq!(url.host_str(), Some("example.test"));
    }

    #[test]
    fn strips_query_and_fragment() {
        let url = canonicalize("https://example.test/a?x=1#section").unwrap();
        assert_eq!(url.as_str(), "https://example.test/a");
    }

    #[test]
    fn strips_default_port() {
        let url = canonicalize("http://example.test:80/a").unwrap();
        assert_eq!(url.port(), None);
    }

    #[test]
    fn keeps_non_default_port() {
        let url = canonicalize("http://example.test:8080/a").unwrap();
        assert_eq!(url.port(), Some(8080));
    }

    #[test]
    fn collapses_dot_segments() {
        let url = canonicalize("https://example.test/a/../b/./c").unwrap();
        assert_eq!(url.path(), "/b/c");
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(canonicalize("not a url").is_err());
    }
}
