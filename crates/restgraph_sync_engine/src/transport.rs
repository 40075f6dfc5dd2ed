//! Transport layer abstraction.

use crate::error::TransportError;
use crate::request::{Method, RemoteRequest, RemoteResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A transport carries remote requests to the REST service.
///
/// `send` is the only suspension point of the engine. One call is one
/// attempt; transports do not retry. Non-success statuses other than 304
/// are reported as [`TransportError::Status`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request.
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError>;
}

#[derive(Debug, Clone)]
struct Scripted {
    delay: Option<Duration>,
    result: Result<RemoteResponse, TransportError>,
}

/// A scripted transport for testing.
///
/// Responses are scripted per method and path and consumed in order; the
/// last scripted response for a route keeps answering. Every request is
/// recorded.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    requests: Mutex<Vec<RemoteRequest>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn script(&self, method: Method, path: &str, scripted: Scripted) {
        self.routes
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(scripted);
    }

    /// Scripts a response.
    pub fn respond(&self, method: Method, path: &str, response: RemoteResponse) {
        self.script(
            method,
            path,
            Scripted {
                delay: None,
                result: Ok(response),
            },
        );
    }

    /// Scripts a response that arrives after a delay.
    pub fn respond_after(&self, method: Method, path: &str, delay: Duration, response: RemoteResponse) {
        self.script(
            method,
            path,
            Scripted {
                delay: Some(delay),
                result: Ok(response),
            },
        );
    }

    /// Scripts a transport failure.
    pub fn fail(&self, method: Method, path: &str, error: TransportError) {
        self.script(
            method,
            path,
            Scripted {
                delay: None,
                result: Err(error),
            },
        );
    }

    /// Sets the connected state. A disconnected mock fails every request.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// All requests sent so far.
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests sent so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests sent with this method.
    pub fn requests_with(&self, method: Method) -> Vec<RemoteRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.method == method)
            .cloned()
            .collect()
    }

    fn next_scripted(&self, method: Method, path: &str) -> Option<Scripted> {
        let mut routes = self.routes.lock();
        let queue = routes.get_mut(&(method, path.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
        let method = request.method;
        let path = request.path.clone();
        self.requests.lock().push(request);

        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("mock transport disconnected".into()));
        }

        let scripted = self
            .next_scripted(method, &path)
            .ok_or_else(|| TransportError::Unscripted {
                method: method.to_string(),
                path,
            })?;

        if let Some(delay) = scripted.delay {
            tokio::time::sleep(delay).await;
        }
        scripted.result.and_then(RemoteResponse::check_status)
    }
}
