use crate::epoch_millis;
use anyhow::Context;
use log::{debug, warn};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use reqwest::{Client, Method, header::CONTENT_TYPE};
use std::time::Duration;
use thiserror::Error;
use trait_variant::make;

pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(25_000);

const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchMethod {
    Get,
    Post,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: FetchMethod,
    pub url: String,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: FetchMethod::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: FetchMethod::Post,
            url: url.into(),
            body: Some(body.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("fetch error (status {status})")]
    Status { status: u16 },
    #[error("fetching (status {status}): {message}")]
    Transport { status: u16, message: String },
    #[error("timeout")]
    Timeout,
}

impl FetchError {
    /// Short human readable reason, as shown in logs next to the status code.
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::Status { .. } => "fetch error",
            FetchError::Transport { .. } => "fetching",
            FetchError::Timeout => "timeout",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            FetchError::Status { status } | FetchError::Transport { status, .. } => *status,
            FetchError::Timeout => 0,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return FetchError::Timeout;
        }

        FetchError::Transport {
            status: err.status().map(|s| s.as_u16()).unwrap_or(0),
            message: err.to_string(),
        }
    }
}

/// Single-shot request helper.
///
/// Exactly one outcome per call: the response when it was delivered, or the
/// reason it was not. Nothing is retried; the caller owns failure handling.
#[make(Send + Sync)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait RequestExecutor {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// A status of `0` counts as delivered: embedded web views report some
/// local/opaque responses that way.
pub fn is_delivered(status: u16) -> bool {
    status == 200 || status == 0
}

/// Append a `_=<millis>` query parameter so no intermediate cache answers.
pub fn with_cache_buster(url: &str, now_millis: i64) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}_={now_millis}")
}

#[derive(Clone)]
pub struct ReqwestExecutor {
    client: Client,
    timeout: Duration,
}

impl ReqwestExecutor {
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> anyhow::Result<Self> {
        if accept_invalid_certs {
            warn!("insecure TLS enabled: server certificates are not verified");
        }

        let client = Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self { client, timeout })
    }
}

impl RequestExecutor for ReqwestExecutor {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = with_cache_buster(&request.url, epoch_millis());
        let method = match request.method {
            FetchMethod::Get => Method::GET,
            FetchMethod::Post => Method::POST,
        };
        debug!("xhr {method} {url}");

        let mut builder = self
            .client
            .request(method, &url)
            .header(CONTENT_TYPE, CONTENT_TYPE_TEXT)
            .timeout(self.timeout);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let res = builder.send().await?;
        let status = res.status().as_u16();

        if !is_delivered(status) {
            return Err(FetchError::Status { status });
        }

        let body = res.text().await?;

        Ok(FetchResponse { status, body })
    }
}
