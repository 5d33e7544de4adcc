//! HTTP access for feed endpoints.
//!
//! Schedule files and live endpoints go through [`FeedClient::get_text`],
//! which retries transient failures. Large static exports go through
//! [`FeedClient::get_cached_text`], which revalidates with
//! `If-None-Match` / `If-Modified-Since` and reuses the in-memory body on 304.

use arbinquer_core::error::{ArbinquerError, Result};
use parking_lot::Mutex;
use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
struct CachedBody {
    etag: Option<String>,
    last_modified: Option<String>,
    body: String,
}

pub struct FeedClient {
    client: reqwest::Client,
    cache: Mutex<HashMap<String, CachedBody>>,
    retries: u32,
    retry_base: Duration,
}

impl FeedClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("arbinquer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ArbinquerError::fetch(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            client,
            cache: Mutex::new(HashMap::new()),
            retries: 3,
            retry_base: Duration::from_secs(2),
        })
    }

    /// Retries after the first attempt, and the base of their exponential delay.
    pub fn with_retries(mut self, retries: u32, base: Duration) -> Self {
        self.retries = retries;
        self.retry_base = base;
        self
    }

    /// GET a body, retrying with jittered exponential backoff.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.retries => {
                    let delay = self.retry_delay(attempt);
                    tracing::debug!(url, attempt, "fetch failed, retrying in {:?}: {e}", delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| ArbinquerError::parse(format!("{url}: {e}")))
    }

    /// Conditional GET against the in-memory cache.
    pub async fn get_cached_text(&self, url: &str) -> Result<String> {
        let cached = self.cache.lock().get(url).cloned();

        let mut request = self.client.get(url);
        if let Some(cached) = &cached {
            if let Some(etag) = &cached.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &cached.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| ArbinquerError::fetch(format!("GET {url}: {e}")))?;

        if response.status() == StatusCode::NOT_MODIFIED {
            if let Some(cached) = cached {
                tracing::debug!(url, "not modified, using cached body");
                return Ok(cached.body);
            }
            // 304 without anything cached: ask again unconditionally.
            return self.get_text(url).await;
        }
        if !response.status().is_success() {
            return Err(ArbinquerError::fetch(format!("GET {url}: {}", response.status())));
        }

        let header = |name| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        let etag = header(ETAG);
        let last_modified = header(LAST_MODIFIED);
        let body = response
            .text()
            .await
            .map_err(|e| ArbinquerError::fetch(format!("GET {url}: {e}")))?;

        if etag.is_some() || last_modified.is_some() {
            self.cache.lock().insert(
                url.to_string(),
                CachedBody {
                    etag,
                    last_modified,
                    body: body.clone(),
                },
            );
        }
        Ok(body)
    }

    pub async fn get_cached_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.get_cached_text(url).await?;
        serde_json::from_str(&body).map_err(|e| ArbinquerError::parse(format!("{url}: {e}")))
    }

    async fn get_once(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ArbinquerError::fetch(format!("GET {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(ArbinquerError::fetch(format!("GET {url}: {}", response.status())));
        }
        response
            .text()
            .await
            .map_err(|e| ArbinquerError::fetch(format!("GET {url}: {e}")))
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let exp = self.retry_base.saturating_mul(1u32 << attempt.min(16));
        let jitter_max = self.retry_base.as_secs_f64() * 0.5;
        let jitter = if jitter_max > 0.0 {
            rand::thread_rng().gen_range(0.0..jitter_max)
        } else {
            0.0
        };
        exp + Duration::from_secs_f64(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> FeedClient {
        FeedClient::new().unwrap().with_retries(0, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_get_text_ok_and_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/arbys.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("1,SolNode1\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client();
        let body = client.get_text(&format!("{}/arbys.txt", server.uri())).await.unwrap();
        assert_eq!(body, "1,SolNode1\n");

        let err = client.get_text(&format!("{}/missing", server.uri())).await.unwrap_err();
        assert!(matches!(err, ArbinquerError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_get_text_retries_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = FeedClient::new().unwrap().with_retries(3, Duration::from_millis(1));
        let body = client.get_text(&format!("{}/flaky", server.uri())).await.unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_get_json_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client()
            .get_json::<serde_json::Value>(&server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, ArbinquerError::Parse(_)));
    }

    #[tokio::test]
    async fn test_conditional_get_reuses_cached_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ExportRegions.json"))
            .and(header("if-none-match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ExportRegions.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("etag", "\"v1\"")
                    .set_body_string(r#"{"SolNode1":{"name":"Apollodorus"}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client();
        let url = format!("{}/ExportRegions.json", server.uri());
        let first: serde_json::Value = client.get_cached_json(&url).await.unwrap();
        let second: serde_json::Value = client.get_cached_json(&url).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second["SolNode1"]["name"], "Apollodorus");
    }
}
