//! HTTP client for the remote system of record.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use super::types::{Endpoint, RemoteReply};
use crate::config::RemoteConfig;
use crate::error::LedgerError;

/// Header carrying the per-item auth token.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Header telling the server to accept a write despite a prior conflict.
pub const CONFLICT_OVERRIDE_HEADER: &str = "X-Conflict-Override";

/// Options for one remote call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions<'a> {
    /// Auth token; falls back to the configured default.
    pub api_key: Option<&'a str>,
    /// JSON body.
    pub body: Option<&'a Value>,
    /// Send the conflict override flag.
    pub conflict_override: bool,
}

/// Thin reqwest wrapper that knows the API prefix and auth header.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    api_prefix: String,
    default_api_key: Option<String>,
}

impl RemoteClient {
    /// Build a client from the `remote` config section.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the HTTP client cannot be built.
    pub fn new(config: &RemoteConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_prefix: config.api_prefix.trim_end_matches('/').to_string(),
            default_api_key: config.default_api_key.clone(),
        })
    }

    /// Full URL for an endpoint.
    #[must_use]
    pub fn url(&self, endpoint: &Endpoint) -> String {
        format!("{}{}{}", self.base_url, self.api_prefix, endpoint.path())
    }

    /// Perform one call and classify the response.
    ///
    /// # Errors
    ///
    /// Returns `Transport` when the request never got a response.
    pub async fn call(
        &self,
        endpoint: &Endpoint,
        options: CallOptions<'_>,
    ) -> Result<RemoteReply, LedgerError> {
        let url = self.url(endpoint);
        let mut request = self.http.request(endpoint.method(), &url);

        if let Some(key) = options.api_key.or(self.default_api_key.as_deref()) {
            request = request.header(API_KEY_HEADER, key);
        }
        if options.conflict_override {
            request = request.header(CONFLICT_OVERRIDE_HEADER, "true");
        }
        if let Some(body) = options.body {
            request = request.json(body);
        }

        tracing::debug!(method = %endpoint.method(), %url, "remote call");
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let decoded: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(if status.is_success() {
            RemoteReply::Accepted(decoded)
        } else if status == StatusCode::CONFLICT {
            RemoteReply::conflict_from_body(decoded)
        } else {
            RemoteReply::Rejected {
                status: status.as_u16(),
                message: describe(status, &decoded),
            }
        })
    }
}

fn describe(status: StatusCode, body: &Value) -> String {
    let detail = body
        .get("error")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .or_else(|| body.as_str().map(ToString::to_string));

    match detail {
        Some(detail) => format!("HTTP {}: {detail}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    }
}
