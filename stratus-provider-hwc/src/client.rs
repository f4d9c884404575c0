//! HTTP transport for the Huawei Cloud REST APIs
//!
//! Requests are authenticated with an `X-Auth-Token` header. Transient failures
//! are retried here; the operation poller above never retries.

use async_trait::async_trait;
use log::debug;
use serde_json::Value as JsonValue;
use stratus_core::jsonpath::path_search_str;
use stratus_core::transport::{
    Method, RequestOptions, Transport, TransportError, TransportResult, flatten_response,
};

use crate::config::{ConfigError, ProviderConfig};
use crate::retry::{RetryConfig, retry_with_backoff};

pub struct HttpTransport {
    http: reqwest::Client,
    config: ProviderConfig,
    retry: RetryConfig,
}

impl HttpTransport {
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        let retry = RetryConfig::with_max_retries(config.max_retries);

        Ok(Self {
            http,
            config,
            retry,
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Absolute URL of `path` on `service`, with `{project_id}` substituted
    pub fn url(&self, service: &str, path: &str) -> String {
        let path = path
            .trim_start_matches('/')
            .replace("{project_id}", &self.config.project_id);
        format!("{}{}", self.config.endpoint(service), path)
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        options: &RequestOptions,
    ) -> TransportResult<JsonValue> {
        let mut request = self
            .http
            .request(to_reqwest_method(method), url)
            .header("X-Auth-Token", &self.config.token);

        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        for (key, value) in &options.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &options.body {
            let bytes =
                serde_json::to_vec(body).map_err(|e| TransportError::Decode(e.to_string()))?;
            request = request
                .header("Content-Type", "application/json")
                .body(bytes);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        debug!("{} {} -> {}", method, url, status);

        if options.accepts(status) {
            return flatten_response(&body);
        }
        if status == 404 {
            return Err(TransportError::NotFound {
                path: url.to_string(),
            });
        }
        Err(api_error(status, &body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        service: &str,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> TransportResult<JsonValue> {
        let url = self.url(service, path);
        let operation = format!("{} {}", method, url);
        retry_with_backoff(&self.retry, &operation, || {
            self.send_once(method, &url, &options)
        })
        .await
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Decode an error response.
///
/// Services answer either `{"error_code", "error_msg"}` or
/// `{"error": {"code", "message"}}`; anything else keeps the raw body text.
fn api_error(status: u16, body: &[u8]) -> TransportError {
    let text = String::from_utf8_lossy(body).trim().to_string();
    let (code, message) = match serde_json::from_slice::<JsonValue>(body) {
        Ok(json) => {
            let code = first_non_empty(&json, &["error_code", "error.code", "code"]);
            let message = first_non_empty(&json, &["error_msg", "error.message", "message"]);
            (code, if message.is_empty() { text } else { message })
        }
        Err(_) => (String::new(), text),
    };

    TransportError::Api {
        status,
        code,
        message,
    }
}

fn first_non_empty(json: &JsonValue, paths: &[&str]) -> String {
    paths
        .iter()
        .map(|p| path_search_str(p, json, ""))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// Retry settings for tests: no real waiting between attempts
#[cfg(test)]
pub(crate) fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay: std::time::Duration::from_millis(1),
        max_delay: std::time::Duration::from_millis(2),
        backoff_multiplier: 1.0,
    }
}
