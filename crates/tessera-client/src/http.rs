use std::time::Duration;

use reqwest::{Client, Response};
use serde::Deserialize;
use tessera_core::error::AppError;

pub const USER_AGENT: &str = concat!("tessera/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP plumbing for the backend adapters.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    timeout_secs: u64,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Send a request and turn transport failures and error statuses into [`AppError`]s.
    pub async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, AppError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    /// Read a response body as JSON.
    pub async fn json<T: serde::de::DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, AppError> {
        let body = response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;
        Ok(serde_json::from_str(&body)?)
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else {
            AppError::HttpError(e.to_string())
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "detail", alias = "title")]
    message: Option<String>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Map a non-2xx status to the error class the dispatcher branches on.
///
/// 429 is throttling, 401/403 a rejected credential; everything else is a
/// plain HTTP failure.
pub fn status_error(status: u16, body: &str) -> AppError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or_else(|| b.error.and_then(|d| d.message)))
        .unwrap_or_else(|| truncate(body, 200).to_string());
    let message = format!("HTTP {status}: {message}");

    match status {
        429 => AppError::RateLimitExceeded(message),
        401 | 403 => AppError::Unauthorized(message),
        _ => AppError::HttpError(message),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
