use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};

use crate::chat::ChatConfig;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUEST_RETRIES, CLIENT_REQUESTS,
    CLIENT_RETRY_BACKOFF,
};
use crate::transport::{ByteStream, ChatTransport, RawResponse};
use crate::types::ChatRequest;

/// Live HTTP client for the dashboard chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: ReqwestClient,
    endpoint: url::Url,
    cookie: Option<HeaderValue>,
    timeout: Duration,
    max_retries: u32,
    config: ChatConfig,
}

impl ChatClient {
    /// Create a new client from a configuration.
    ///
    /// The endpoint URL is resolved once, here.
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let cookie = match &config.cookie {
            Some(cookie) => Some(HeaderValue::from_str(cookie).map_err(|e| {
                Error::validation(
                    format!("cookie is not a valid header value: {e}"),
                    Some("cookie".to_string()),
                )
            })?),
            None => None,
        };

        let timeout = config.timeout();
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            endpoint,
            cookie,
            timeout,
            max_retries: config.max_retries,
            config: config.clone(),
        })
    }

    /// Create a new client configured from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(&ChatConfig::from_env())
    }

    /// Returns the resolved chat endpoint.
    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }

    /// Create and return default headers for chat requests.
    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        if let Some(cookie) = &self.cookie {
            headers.insert(header::COOKIE, cookie.clone());
        }
        headers
    }

    /// Post once, waiting at most `timeout` for the response head. The body is read later and
    /// is not bounded by the timeout.
    async fn post_once(&self, request: &ChatRequest) -> Result<Response> {
        let send = self
            .client
            .post(self.endpoint.clone())
            .headers(self.default_headers())
            .json(request)
            .send();
        let Ok(result) = tokio::time::timeout(self.timeout, send).await else {
            return Err(Error::timeout(
                "no response from chat endpoint",
                Some(self.timeout.as_secs_f64()),
            ));
        };
        result.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(
                    format!("Request timed out: {e}"),
                    Some(self.timeout.as_secs_f64()),
                )
            } else if e.is_connect() {
                Error::connection(format!("could not reach chat endpoint: {e}"), Some(Box::new(e)))
            } else {
                Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
            }
        })
    }

    /// Post with retries for failures that produced no response at all.
    async fn post_with_retry(&self, request: &ChatRequest) -> Result<Response> {
        let mut attempt = 0;
        loop {
            CLIENT_REQUESTS.click();
            let start = Instant::now();
            let result = self.post_once(request).await;
            CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
            match result {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.config.backoff(attempt);
                    CLIENT_REQUEST_RETRIES.click();
                    CLIENT_RETRY_BACKOFF.add(delay.as_secs_f64());
                    tracing::warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying chat request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    CLIENT_REQUEST_ERRORS.click();
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ChatTransport for ChatClient {
    async fn post_chat(&self, request: &ChatRequest) -> Result<RawResponse> {
        let response = self.post_with_retry(request).await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        tracing::debug!(status, content_type = ?content_type, "chat response head");
        Ok(RawResponse::new(status, content_type, body_stream(response)))
    }
}

/// Adapt a reqwest body into a [`ByteStream`].
fn body_stream(response: Response) -> ByteStream {
    Box::pin(response.bytes_stream().map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    }))
}
