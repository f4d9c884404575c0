//! Route-based mock transport for handler tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use stratus_core::transport::{
    Method, RequestOptions, Transport, TransportError, TransportResult,
};

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub service: String,
    pub method: Method,
    pub path: String,
    pub body: Option<JsonValue>,
    pub query: Vec<(String, String)>,
}

/// Answers each `(method, path)` route from its own queue of responses.
/// The last response of a queue is repeated forever.
#[derive(Default)]
pub(crate) struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<TransportResult<JsonValue>>>>,
    requests: Mutex<Vec<Recorded>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        self,
        method: Method,
        path: &str,
        responses: Vec<TransportResult<JsonValue>>,
    ) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert((method, path.to_string()), responses.into());
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        service: &str,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> TransportResult<JsonValue> {
        self.requests.lock().unwrap().push(Recorded {
            service: service.to_string(),
            method,
            path: path.to_string(),
            body: options.body.clone(),
            query: options.query.clone(),
        });

        let mut routes = self.routes.lock().unwrap();
        let queue = routes
            .get_mut(&(method, path.to_string()))
            .ok_or_else(|| TransportError::Network(format!("no route for {} {}", method, path)))?;
        if queue.len() > 1 {
            queue
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Network("empty route".to_string())))
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(TransportError::Network("empty route".to_string())))
        }
    }
}

pub(crate) fn not_found(path: &str) -> TransportResult<JsonValue> {
    Err(TransportError::NotFound {
        path: path.to_string(),
    })
}
