//! HTTP transport for backend REST APIs

use crate::error::{AdapterError, Result};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Per-request ceiling when the caller sets none
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("ocloud-adapters/", env!("CARGO_PKG_VERSION"));

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut cut = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// How a token is attached to outgoing requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// A named header carrying the raw token, e.g. `X-Auth-Token`
    Header(&'static str),
}

/// HTTP client wrapper for backend API calls
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    scheme: AuthScheme,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a new transport with the default timeout
    pub fn new(scheme: AuthScheme) -> Result<Self> {
        Self::with_timeout(scheme, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(scheme: AuthScheme, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Config {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            scheme,
            timeout,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a request and parse the JSON response
    ///
    /// 401 maps to `Unauthorized`; any other non-success status maps to
    /// `Upstream` with the status attached. Empty bodies become `Value::Null`.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let operation = format!("{} {}", method, strip_query(url));
        tracing::debug!("{}", operation);

        let mut request = self.client.request(method, url);
        request = match self.scheme {
            AuthScheme::Bearer => request.bearer_auth(token),
            AuthScheme::Header(name) => request.header(name, token),
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout {
                    operation: operation.clone(),
                    seconds: self.timeout.as_secs_f64(),
                }
            } else {
                AdapterError::upstream(&operation, format!("failed to send request: {e}"))
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            AdapterError::upstream(&operation, format!("failed to read response body: {e}"))
        })?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::debug!("{} rejected as unauthorized", operation);
            return Err(AdapterError::Unauthorized { operation });
        }

        if !status.is_success() {
            // Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&text));
            return Err(AdapterError::Upstream {
                operation,
                status: Some(status.as_u16()),
                message: extract_error_message(&text).unwrap_or_else(|| status.to_string()),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            AdapterError::upstream(&operation, format!("failed to parse response JSON: {e}"))
        })
    }
}

fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Pull a message out of the common JSON error envelopes
///
/// GCP uses `{"error": {"message": ...}}`, Nova uses
/// `{"itemNotFound": {"message": ...}}` and similar single-key wrappers.
fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let obj = value.as_object()?;
    obj.values()
        .find_map(|v| v.get("message").and_then(|m| m.as_str()))
        .map(sanitize_for_log)
}

/// Format an adapter error for display
/// Sanitizes messages so raw API details are not shown to users
pub fn format_api_error(error: &AdapterError) -> String {
    match error.status() {
        Some(401) => return "Authentication failed. Check the backend credentials.".to_string(),
        Some(403) => return "Permission denied. Check the backend account permissions.".to_string(),
        Some(404) => return "Resource not found.".to_string(),
        Some(409) => {
            return "Resource conflict. The resource may already exist or be in use.".to_string()
        },
        Some(429) => return "Rate limit exceeded. Please try again later.".to_string(),
        Some(400) => return "Invalid request. Check your parameters.".to_string(),
        Some(500) | Some(502) | Some(503) => {
            return "Backend service temporarily unavailable. Please try again.".to_string()
        },
        _ => {},
    }

    let error_str = error.to_string();
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(80)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
