//! HTTP client for the crawl service REST API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, Url};
use serde_json::{json, Value};

use crate::error::{json_kind, DecodeError, FetchError};
use crate::record::JobId;

/// Default API base for a locally running crawl service.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8088/api/v1";

/// Connect timeout for API requests.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error bodies longer than this are truncated before they reach logs.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Job-control operations against the crawl service.
///
/// All job payloads are returned raw; normalization happens in the store.
#[async_trait]
pub trait CrawlApi: Send + Sync {
    /// Fetches every job visible to the caller.
    async fn fetch_all(&self) -> Result<Vec<Value>, FetchError>;

    /// Submits a URL for crawling and returns the created job.
    async fn submit(&self, url: &str) -> Result<Value, FetchError>;

    /// Queues an existing job for another crawl.
    async fn rerun(&self, id: JobId) -> Result<(), FetchError>;

    async fn delete(&self, id: JobId) -> Result<(), FetchError>;

    async fn delete_bulk(&self, ids: &[JobId]) -> Result<(), FetchError>;
}

/// Decodes a bulk response body into raw job payloads.
pub fn decode_job_list(body: &[u8]) -> Result<Vec<Value>, DecodeError> {
    match serde_json::from_slice::<Value>(body)? {
        Value::Array(items) => Ok(items),
        other => Err(DecodeError::NotAnArray(json_kind(&other))),
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}

/// [`CrawlApi`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpCrawlApi {
    client: Client,
    base_url: String,
}

impl HttpCrawlApi {
    /// Creates a client for `base_url` (e.g. `http://localhost:8088/api/v1`).
    ///
    /// `headers` are sent with every request.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self, FetchError> {
        let parsed = Url::parse(base_url).map_err(|e| FetchError::InvalidUrl {
            url: base_url.to_string(),
            message: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: base_url.to_string(),
                message: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(timeout)
            .default_headers(header_map(headers)?)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turns non-2xx responses into [`FetchError::Status`].
    async fn check(response: Response) -> Result<Response, FetchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(FetchError::Status {
            status: status.as_u16(),
            body: truncate_body(&body),
        })
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, FetchError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let invalid = |message: String| FetchError::InvalidHeader {
            name: name.clone(),
            message,
        };
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[async_trait]
impl CrawlApi for HttpCrawlApi {
    async fn fetch_all(&self) -> Result<Vec<Value>, FetchError> {
        let url = self.endpoint("/crawls");
        log::debug!("GET {}", url);

        let response = Self::check(self.client.get(&url).send().await?).await?;
        let body = response.bytes().await?;
        let jobs = decode_job_list(&body)?;

        log::debug!("Fetched {} job(s)", jobs.len());
        Ok(jobs)
    }

    async fn submit(&self, url: &str) -> Result<Value, FetchError> {
        let endpoint = self.endpoint("/crawls");
        log::info!("Submitting {} for crawling", url);

        let response = Self::check(
            self.client
                .post(&endpoint)
                .json(&json!({ "url": url }))
                .send()
                .await?,
        )
        .await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body).map_err(DecodeError::from)?)
    }

    async fn rerun(&self, id: JobId) -> Result<(), FetchError> {
        let url = self.endpoint(&format!("/crawls/{}/rerun", id));
        log::info!("Requesting rerun of job {}", id);
        Self::check(self.client.post(&url).send().await?).await?;
        Ok(())
    }

    async fn delete(&self, id: JobId) -> Result<(), FetchError> {
        let url = self.endpoint(&format!("/crawls/{}", id));
        log::info!("Deleting job {}", id);
        Self::check(self.client.delete(&url).send().await?).await?;
        Ok(())
    }

    async fn delete_bulk(&self, ids: &[JobId]) -> Result<(), FetchError> {
        let url = self.endpoint("/crawls/bulk");
        log::info!("Deleting {} job(s)", ids.len());
        Self::check(
            self.client
                .delete(&url)
                .json(&json!({ "ids": ids }))
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_job_list() {
        let jobs = decode_job_list(br#"[{"ID": 1}, {"id": 2}]"#).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1]["id"], 2);
    }

    #[test]
    fn test_decode_job_list_rejects_object() {
        let err = decode_job_list(br#"{"data": []}"#).unwrap_err();
        assert!(matches!(err, DecodeError::NotAnArray("object")));
    }

    #[test]
    fn test_decode_job_list_rejects_garbage() {
        assert!(matches!(
            decode_job_list(b"<html>"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short"), "short");
        let long = "é".repeat(150);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("... (truncated)"));
        assert!(truncated.len() < long.len());
    }

    #[test]
    fn test_new_rejects_bad_urls() {
        let headers = BTreeMap::new();
        assert!(matches!(
            HttpCrawlApi::new("localhost:8088", Duration::from_secs(1), &headers),
            Err(FetchError::InvalidUrl { .. })
        ));
        assert!(matches!(
            HttpCrawlApi::new("ftp://example.com/api", Duration::from_secs(1), &headers),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_new_rejects_bad_header() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Token".to_string(), "line\nbreak".to_string());
        assert!(matches!(
            HttpCrawlApi::new(DEFAULT_API_BASE_URL, Duration::from_secs(1), &headers),
            Err(FetchError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let api = HttpCrawlApi::new(
            "http://localhost:8088/api/v1/",
            Duration::from_secs(1),
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(api.base_url(), "http://localhost:8088/api/v1");
        assert_eq!(
            api.endpoint("/crawls/5/rerun"),
            "http://localhost:8088/api/v1/crawls/5/rerun"
        );
    }
}
