//! Refresh - One probe of a remote operation, classified into a state label
//!
//! The poller in [`crate::waiter`] only understands labels. Turning a raw API
//! response into a label is the job of a [`StatusClassifier`]; resource types
//! describe their status field and status values with a [`StatusTable`]
//! instead of writing a bespoke closure each time.

use std::sync::Arc;

use thiserror::Error;

use crate::jsonpath::path_search;
use crate::transport::{Method, RequestOptions, Transport, TransportError, TransportResult};

/// Label for an operation that is still in progress
pub const PENDING: &str = "PENDING";
/// Label for an operation that finished successfully
pub const COMPLETED: &str = "COMPLETED";
/// Label for an operation that reached a permanent failure status
pub const FAILED: &str = "FAILED";
/// Label for a resource that no longer exists
pub const DELETED: &str = "DELETED";

/// Result of one probe
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T> {
    /// The observed object, `None` once the resource is gone
    pub object: Option<T>,
    /// State label the probe was classified into
    pub state: String,
    /// Raw status reported by the API, kept for error messages
    pub status: Option<String>,
}

impl<T> Observation<T> {
    pub fn new(object: T, state: impl Into<String>) -> Self {
        Self {
            object: Some(object),
            state: state.into(),
            status: None,
        }
    }

    /// Observation of a resource that no longer exists
    pub fn gone(state: impl Into<String>) -> Self {
        Self {
            object: None,
            state: state.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// What a probe should make of a 404 response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotFoundPolicy {
    /// The resource is gone: report [`DELETED`]
    Deleted,
    /// Surface the 404 as a transport error
    #[default]
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("status field '{path}' is not found in API response")]
    MissingStatus { path: String },
}

impl From<ClassifyError> for TransportError {
    fn from(err: ClassifyError) -> Self {
        TransportError::Decode(err.to_string())
    }
}

/// Maps a decoded API response to a state label
pub trait StatusClassifier: Send + Sync {
    /// Classify `body` into [`PENDING`], [`COMPLETED`] or [`FAILED`]
    fn classify(&self, body: &serde_json::Value) -> Result<Classified, ClassifyError>;

    fn not_found_policy(&self) -> NotFoundPolicy {
        NotFoundPolicy::Error
    }
}

/// A label together with the raw status it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub label: &'static str,
    pub status: String,
}

/// Table-driven classifier: a status path plus the success and failure values.
///
/// Status values that appear in neither list are treated as [`PENDING`], so
/// unfamiliar intermediate states never abort a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTable {
    pub status_path: String,
    pub success: Vec<String>,
    pub failure: Vec<String>,
    pub not_found: NotFoundPolicy,
}

impl StatusTable {
    pub fn new(status_path: impl Into<String>) -> Self {
        Self {
            status_path: status_path.into(),
            success: Vec::new(),
            failure: Vec::new(),
            not_found: NotFoundPolicy::Error,
        }
    }

    pub fn success(mut self, statuses: &[&str]) -> Self {
        self.success = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn failure(mut self, statuses: &[&str]) -> Self {
        self.failure = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn deleted_when_not_found(mut self) -> Self {
        self.not_found = NotFoundPolicy::Deleted;
        self
    }
}

impl StatusClassifier for StatusTable {
    fn classify(&self, body: &serde_json::Value) -> Result<Classified, ClassifyError> {
        let status = path_search(&self.status_path, body)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ClassifyError::MissingStatus {
                path: self.status_path.clone(),
            })?;

        let label = if self.success.iter().any(|s| s == status) {
            COMPLETED
        } else if self.failure.iter().any(|s| s == status) {
            FAILED
        } else {
            PENDING
        };

        Ok(Classified {
            label,
            status: status.to_string(),
        })
    }

    fn not_found_policy(&self) -> NotFoundPolicy {
        self.not_found
    }
}

/// Reusable refresh function: GET one URL and classify the response
pub struct StatusProbe<C> {
    transport: Arc<dyn Transport>,
    service: String,
    path: String,
    classifier: C,
}

impl<C: StatusClassifier> StatusProbe<C> {
    pub fn new(
        transport: Arc<dyn Transport>,
        service: impl Into<String>,
        path: impl Into<String>,
        classifier: C,
    ) -> Self {
        Self {
            transport,
            service: service.into(),
            path: path.into(),
            classifier,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Perform exactly one probe
    pub async fn probe(&self) -> TransportResult<Observation<serde_json::Value>> {
        let result = self
            .transport
            .request(&self.service, Method::Get, &self.path, RequestOptions::new())
            .await;

        match result {
            Ok(body) => {
                let classified = self.classifier.classify(&body)?;
                Ok(Observation::new(body, classified.label).with_status(classified.status))
            }
            Err(e)
                if e.is_not_found()
                    && self.classifier.not_found_policy() == NotFoundPolicy::Deleted =>
            {
                Ok(Observation::gone(DELETED))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Transport that replays a fixed list of responses
    pub(crate) struct ScriptedTransport {
        responses: Mutex<VecDeque<TransportResult<serde_json::Value>>>,
        pub(crate) calls: AtomicU32,
    }

    impl ScriptedTransport {
        pub(crate) fn new(responses: Vec<TransportResult<serde_json::Value>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
            })
        }

        pub(crate) fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn request(
            &self,
            _service: &str,
            _method: Method,
            _path: &str,
            _options: RequestOptions,
        ) -> TransportResult<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Network("script exhausted".to_string())))
        }
    }

    fn instance_table() -> StatusTable {
        StatusTable::new("status")
            .success(&["RUNNING"])
            .failure(&["CREATEFAILED", "ERROR"])
    }

    #[test]
    fn test_classify_known_statuses() {
        let table = instance_table();
        let ok = table.classify(&json!({"status": "RUNNING"})).unwrap();
        assert_eq!(ok.label, COMPLETED);
        assert_eq!(ok.status, "RUNNING");

        let failed = table.classify(&json!({"status": "CREATEFAILED"})).unwrap();
        assert_eq!(failed.label, FAILED);
    }

    #[test]
    fn test_classify_unknown_status_is_pending() {
        let table = instance_table();
        let classified = table.classify(&json!({"status": "EXTENDING"})).unwrap();
        assert_eq!(classified.label, PENDING);
        assert_eq!(classified.status, "EXTENDING");
    }

    #[test]
    fn test_classify_missing_status() {
        let table = StatusTable::new("status.phase").success(&["Available"]);
        let err = table.classify(&json!({"status": {}})).unwrap_err();
        assert_eq!(
            err,
            ClassifyError::MissingStatus {
                path: "status.phase".to_string()
            }
        );
        assert!(table.classify(&json!({"status": {"phase": ""}})).is_err());
    }

    #[tokio::test]
    async fn test_probe_classifies_response() {
        let transport = ScriptedTransport::new(vec![Ok(json!({"status": "CREATING"}))]);
        let probe = StatusProbe::new(
            transport.clone(),
            "dcs",
            "v2/p/instances/i",
            instance_table(),
        );

        let observation = probe.probe().await.unwrap();
        assert_eq!(observation.state, PENDING);
        assert_eq!(observation.status.as_deref(), Some("CREATING"));
        assert_eq!(observation.object, Some(json!({"status": "CREATING"})));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_probe_not_found_as_deleted() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::NotFound {
            path: "v2/p/instances/i".to_string(),
        })]);
        let probe = StatusProbe::new(
            transport,
            "dcs",
            "v2/p/instances/i",
            instance_table().deleted_when_not_found(),
        );

        let observation = probe.probe().await.unwrap();
        assert_eq!(observation.state, DELETED);
        assert!(observation.object.is_none());
    }

    #[tokio::test]
    async fn test_probe_not_found_as_error() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::NotFound {
            path: "v1/p/jobs/j".to_string(),
        })]);
        let probe = StatusProbe::new(transport, "ims", "v1/p/jobs/j", instance_table());

        let err = probe.probe().await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_probe_missing_status_is_decode_error() {
        let transport = ScriptedTransport::new(vec![Ok(json!({"job_id": "j"}))]);
        let probe = StatusProbe::new(transport, "ims", "v1/p/jobs/j", instance_table());

        let err = probe.probe().await.unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }
}
