//! Transport - Contract for issuing requests against the cloud's REST APIs
//!
//! Providers implement [`Transport`] on top of an HTTP client. Everything that
//! talks to the cloud (resource handlers, status probes) depends only on this
//! trait, so tests can substitute a scripted transport.

use async_trait::async_trait;
use thiserror::Error;

/// HTTP method of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for a single request
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// JSON request body
    pub body: Option<serde_json::Value>,
    /// Query string parameters
    pub query: Vec<(String, String)>,
    /// Additional request headers
    pub headers: Vec<(String, String)>,
    /// Status codes accepted as success (empty = any 2xx)
    pub ok_codes: Vec<u16>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_ok_codes(mut self, codes: &[u16]) -> Self {
        self.ok_codes = codes.to_vec();
        self
    }

    /// Whether a response status counts as success
    pub fn accepts(&self, status: u16) -> bool {
        if self.ok_codes.is_empty() {
            (200..300).contains(&status)
        } else {
            self.ok_codes.contains(&status)
        }
    }
}

/// Errors raised while talking to the cloud
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The addressed resource does not exist (HTTP 404)
    #[error("Resource not found: {path}")]
    NotFound { path: String },

    /// The API answered with an error status
    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Connection, TLS or timeout failure
    #[error("Network error: {0}")]
    Network(String),

    /// The response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// No usable endpoint for the requested service
    #[error("Endpoint error: {0}")]
    Endpoint(String),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound { .. })
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Issues a request to a service of the cloud and returns the decoded body
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `method` to `path` on `service`.
    ///
    /// `path` is relative to the service endpoint and may contain the
    /// `{project_id}` placeholder.
    async fn request(
        &self,
        service: &str,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> TransportResult<serde_json::Value>;
}

/// Decode a raw response body. An empty body decodes to `null`.
pub fn flatten_response(body: &[u8]) -> TransportResult<serde_json::Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| TransportError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_default_2xx() {
        let options = RequestOptions::new();
        assert!(options.accepts(200));
        assert!(options.accepts(204));
        assert!(!options.accepts(404));
    }

    #[test]
    fn accepts_explicit_codes() {
        let options = RequestOptions::new().with_ok_codes(&[202]);
        assert!(options.accepts(202));
        assert!(!options.accepts(200));
    }

    #[test]
    fn retryable_errors() {
        assert!(TransportError::Network("reset".to_string()).is_retryable());
        let throttled = TransportError::Api {
            status: 429,
            code: "APIGW.0308".to_string(),
            message: "throttled".to_string(),
        };
        assert!(throttled.is_retryable());
        let bad_request = TransportError::Api {
            status: 400,
            code: "DCS.4000".to_string(),
            message: "bad".to_string(),
        };
        assert!(!bad_request.is_retryable());
        assert!(
            !TransportError::NotFound {
                path: "/x".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn flatten_empty_and_json() {
        assert_eq!(flatten_response(b"").unwrap(), serde_json::Value::Null);
        assert_eq!(flatten_response(b" \n").unwrap(), serde_json::Value::Null);
        assert_eq!(
            flatten_response(br#"{"status":"RUNNING"}"#).unwrap(),
            json!({"status": "RUNNING"})
        );
    }

    #[test]
    fn flatten_invalid_json() {
        let err = flatten_response(b"<html>").unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[test]
    fn error_display() {
        let err = TransportError::Api {
            status: 400,
            code: "DCS.4000".to_string(),
            message: "invalid name".to_string(),
        };
        assert_eq!(err.to_string(), "API error 400 (DCS.4000): invalid name");
    }
}
