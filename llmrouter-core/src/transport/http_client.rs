//! Thin, shared HTTP plumbing used by every HTTP-based transport adapter:
//! header/auth construction, JSON request/response helpers, and a byte-stream
//! helper for SSE upstreams. One [`HttpProviderClient`] is built per
//! configured provider and wraps a pooled [`reqwest::Client`].

use crate::error::ProviderError;
use bytes::Bytes;
use futures::Stream;
use reqwest::{header::HeaderMap, Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// How a provider authenticates outbound requests. OpenAI/Gemini-style
/// providers use `Bearer`; Anthropic uses a named header (`x-api-key`).
#[derive(Clone, Debug)]
pub enum AuthStrategy {
    Bearer { token: String },
    Header { name: String, value: String },
    None,
}

#[derive(Clone)]
pub struct HttpProviderClient {
    http: Client,
    base_url: String,
    default_headers: HeaderMap,
}

impl HttpProviderClient {
    pub fn new(
        timeout: Duration,
        base_url: String,
        headers: &HashMap<String, String>,
        auth: AuthStrategy,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Configuration {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let mut default_headers = HeaderMap::new();
        match auth {
            AuthStrategy::Bearer { token } => {
                if let Ok(value) = format!("Bearer {token}").parse() {
                    default_headers.insert("Authorization", value);
                }
            }
            AuthStrategy::Header { name, value } => {
                if let (Ok(name), Ok(value)) =
                    (name.parse::<reqwest::header::HeaderName>(), value.parse())
                {
                    default_headers.insert(name, value);
                }
            }
            AuthStrategy::None => {}
        }
        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (k.parse::<reqwest::header::HeaderName>(), v.parse()) {
                default_headers.insert(name, value);
            }
        }

        Ok(Self {
            http,
            base_url,
            default_headers,
        })
    }

    fn build_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url.trim_end_matches('/'), path)
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path)
        }
    }

    /// Merges per-request headers (e.g. a decorator's masquerade `User-Agent`)
    /// on top of the provider's defaults without mutating the client.
    fn build_headers(&self, extra: Option<&HeaderMap>) -> HeaderMap {
        let mut headers = self.default_headers.clone();
        if let Some(extra) = extra {
            for (name, value) in extra {
                headers.insert(name.clone(), value.clone());
            }
        }
        headers
    }

    pub async fn post_json<TReq: Serialize, TResp: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
        extra_headers: Option<&HeaderMap>,
    ) -> Result<TResp, ProviderError> {
        let resp = self.post_raw(path, body, extra_headers).await?;
        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(resp.json::<TResp>().await.map_err(classify_reqwest_error)?)
    }

    /// Issues the POST without checking the status — used by the streaming
    /// path, which needs to distinguish a non-2xx status from a transport
    /// failure before it decides whether anything was ever sent to the client.
    pub async fn post_raw<TReq: Serialize>(
        &self,
        path: &str,
        body: &TReq,
        extra_headers: Option<&HeaderMap>,
    ) -> Result<Response, ProviderError> {
        let url = self.build_url(path);
        self.http
            .request(Method::POST, url)
            .headers(self.build_headers(extra_headers))
            .json(body)
            .send()
            .await
            .map_err(classify_reqwest_error)
    }

    pub async fn get_json<TResp: DeserializeOwned>(&self, path: &str) -> Result<TResp, ProviderError> {
        let url = self.build_url(path);
        let resp = self
            .http
            .request(Method::GET, url)
            .headers(self.build_headers(None))
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(resp.json::<TResp>().await.map_err(classify_reqwest_error)?)
    }
}

/// Turns a successful response's body into a byte stream for SSE relaying.
/// Caller must have already checked `resp.status().is_success()`.
pub fn byte_stream(resp: Response) -> impl Stream<Item = Result<Bytes, ProviderError>> {
    use futures::StreamExt;
    resp.bytes_stream().map(|r| r.map_err(classify_reqwest_error))
}

/// `reqwest::Error` carries enough detail (`is_timeout`, `is_connect`) to
/// distinguish "never got a response" from the generic bucket; both are
/// retryable, but keeping them distinct gives callers better log messages.
pub fn classify_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_connect() {
        ProviderError::ConnectFailed {
            message: err.to_string(),
        }
    } else {
        ProviderError::Http(err)
    }
}

pub async fn map_error_response(resp: Response) -> ProviderError {
    let status = resp.status();
    match resp.text().await {
        Ok(body) => {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").cloned())
                .and_then(|e| e.get("message").cloned())
                .and_then(|m| m.as_str().map(|s| s.to_string()))
                .unwrap_or(body);

            match status.as_u16() {
                401 => ProviderError::InvalidApiKey,
                404 => ProviderError::ModelNotFound {
                    model: "unknown".to_string(),
                },
                429 => ProviderError::RateLimit,
                503 => ProviderError::ServiceUnavailable,
                code => ProviderError::Api { code, message },
            }
        }
        Err(_) => ProviderError::Api {
            code: status.as_u16(),
            message: "failed to read error response body".to_string(),
        },
    }
}
