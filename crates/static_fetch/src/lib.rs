use docscrawl_core::{CancelSignal, CrawlError};
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

const MAX_REDIRECT_HOPS: u32 = 5;

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub final_url: Url,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub fetch_duration_ms: u64,
}

/// One shared, connection-pooled HTTP client for the whole crawl.
///
/// Redirects are followed manually (not by `reqwest`) so every hop can be
/// re-validated through the URL validator before it is requested.
pub struct StaticFetcher {
    client: reqwest::Client,
    max_retries: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
    max_response_bytes: u64,
}

impl StaticFetcher {
    pub fn new(
        user_agent: &str,
        request_timeout: Duration,
        per_host_connections: usize,
        max_retries: u32,
        backoff_base: Duration,
        backoff_cap: Duration,
        max_response_bytes: u64,
    ) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(request_timeout)
            .pool_max_idle_per_host(per_host_connections)
            .redirect(reqwest::redirect::Policy::none())
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| CrawlError::Other(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            max_retries,
            backoff_base,
            backoff_cap,
            max_response_bytes,
        })
    }

    pub async fn fetch(&self, url: &Url, cancel: &CancelSignal) -> Result<FetchOutcome, CrawlError> {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }

            match self.fetch_following_redirects(url, cancel).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = backoff(self.backoff_base, self.backoff_cap, attempt);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_following_redirects(&self, url: &Url, cancel: &CancelSignal) -> Result<FetchOutcome, CrawlError> {
        let started = std::time::Instant::now();
        let mut current = url.clone();

        for _ in 0..=MAX_REDIRECT_HOPS {
            if cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }

            let response = self
                .client
                .get(current.as_str())
                .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
                .send()
                .await
                .map_err(classify_reqwest_error)?;

            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| CrawlError::UnsafeRedirect(current.to_string()))?;
                let next = current
                    .join(location)
                    .map_err(|_| CrawlError::UnsafeRedirect(location.to_string()))?;

                docscrawl_validator::validate(next.as_str())
                    .await
                    .map_err(|_| CrawlError::UnsafeRedirect(next.to_string()))?;

                current = next;
                continue;
            }

            let headers = header_map(response.headers());

            if let Some(len) = response.content_length() {
                if len > self.max_response_bytes {
                    return Err(CrawlError::PayloadTooLarge { size: len as usize, max: self.max_response_bytes as usize });
                }
            }

            let status_code = status.as_u16();
            if status.is_client_error() {
                return Err(CrawlError::Http4xx { status: status_code, detail: status.to_string() });
            }
            if status.is_server_error() {
                return Err(CrawlError::Http5xx { status: status_code, detail: status.to_string() });
            }

            let body = response.bytes().await.map_err(classify_reqwest_error)?;
            if body.len() as u64 > self.max_response_bytes {
                return Err(CrawlError::PayloadTooLarge { size: body.len(), max: self.max_response_bytes as usize });
            }

            return Ok(FetchOutcome {
                final_url: current,
                status: status_code,
                headers,
                body: body.to_vec(),
                fetch_duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        Err(CrawlError::UnsafeRedirect(url.to_string()))
    }
}

fn header_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect()
}

fn classify_reqwest_error(err: reqwest::Error) -> CrawlError {
    if err.is_timeout() {
        CrawlError::Timeout(0)
    } else if err.is_connect() {
        CrawlError::Connect(err.to_string())
    } else {
        CrawlError::Connect(err.to_string())
    }
}

fn backoff(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exp = base.as_millis().saturating_mul(1u128 << attempt.min(16));
    let capped = exp.min(cap.as_millis()) as u64;
    let jitter = rand::thread_rng().gen_range(0..=(capped / 4).max(1));
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> StaticFetcher {
        StaticFetcher::new(
            "docscrawl-test/0.1",
            Duration::from_secs(5),
            4,
            2,
            Duration::from_millis(10),
            Duration::from_millis(200),
            10 * 1024 * 1024,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_a_simple_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let url: Url = server.uri().parse().unwrap();
        let outcome = fetcher().fetch(&url, &CancelSignal::new()).await.unwrap();
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.body, b"hello");
    }

    #[tokio::test]
    async fn surfaces_5xx_as_http5xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let url: Url = server.uri().parse().unwrap();
        let err = fetcher().fetch(&url, &CancelSignal::new()).await.unwrap_err();
        assert_eq!(err.kind(), "http_5xx");
    }

    #[tokio::test]
    async fn surfaces_non_retryable_4xx_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url: Url = server.uri().parse().unwrap();
        let err = fetcher().fetch(&url, &CancelSignal::new()).await.unwrap_err();
        assert_eq!(err.kind(), "http_4xx");
    }

    #[tokio::test]
    async fn follows_redirects_to_safe_targets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/end"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/end"))
            .respond_with(ResponseTemplate::new(200).set_body_string("landed"))
            .mount(&server)
            .await;

        let url: Url = format!("{}/start", server.uri()).parse().unwrap();
        let outcome = fetcher().fetch(&url, &CancelSignal::new()).await.unwrap();
        assert_eq!(outcome.body, b"landed");
        assert!(outcome.final_url.path().ends_with("/end"));
    }

    #[tokio::test]
    async fn rejects_redirect_to_blocked_ip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "http://169.254.169.254/latest/meta-data/"))
            .mount(&server)
            .await;

        let url: Url = format!("{}/start", server.uri()).parse().unwrap();
        let err = fetcher().fetch(&url, &CancelSignal::new()).await.unwrap_err();
        assert_eq!(err.kind(), "unsafe_redirect");
    }
}
