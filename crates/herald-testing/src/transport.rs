//! Scripted in-memory transport.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use herald_delivery::{DeliveryError, OutboundRequest, Transport, TransportResponse};

/// What the mock answers to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Respond with the status and an empty body.
    Status(u16),
    /// Respond with the status and body.
    StatusWithBody(u16, String),
    /// Respond 429 with a `Retry-After` header in seconds.
    RateLimited(u64),
    /// Fail with `DeliveryError::Timeout`.
    Timeout,
    /// Fail with `DeliveryError::NetworkError`.
    ConnectionRefused,
    /// Never complete.
    Hang,
}

impl Reply {
    async fn into_response(self) -> herald_delivery::Result<TransportResponse> {
        match self {
            Self::Status(status) => Ok(TransportResponse::new(status, "")),
            Self::StatusWithBody(status, body) => Ok(TransportResponse::new(status, body)),
            Self::RateLimited(seconds) => {
                let mut response = TransportResponse::new(429, "");
                response.headers.insert("retry-after".to_string(), seconds.to_string());
                Ok(response)
            },
            Self::Timeout => Err(DeliveryError::timeout(Duration::from_secs(30))),
            Self::ConnectionRefused => Err(DeliveryError::network("connection refused")),
            Self::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Reply>,
    routes: HashMap<String, VecDeque<Reply>>,
    requests: Vec<OutboundRequest>,
}

/// Transport that answers from a script and records every request.
///
/// Per-URL routes take precedence over the shared script; once both are
/// exhausted every request gets `200 OK`. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
}

impl MockTransport {
    /// Creates a transport that answers `200 OK` to everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport answering with `replies` in order.
    pub fn scripted(replies: impl IntoIterator<Item = Reply>) -> Self {
        let transport = Self::new();
        transport.lock().replies.extend(replies);
        transport
    }

    /// Appends a reply to the shared script.
    pub fn push(&self, reply: Reply) {
        self.lock().replies.push_back(reply);
    }

    /// Scripts replies for requests to one URL.
    pub fn route(&self, url: impl Into<String>, replies: impl IntoIterator<Item = Reply>) {
        self.lock().routes.entry(url.into()).or_default().extend(replies);
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.lock().requests.clone()
    }

    /// Requests received for one URL.
    pub fn requests_to(&self, url: &str) -> Vec<OutboundRequest> {
        self.lock().requests.iter().filter(|r| r.url == url).cloned().collect()
    }

    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, request: &OutboundRequest) -> herald_delivery::Result<TransportResponse> {
        let reply = {
            let mut script = self.lock();
            script.requests.push(request.clone());
            script
                .routes
                .get_mut(&request.url)
                .and_then(VecDeque::pop_front)
                .or_else(|| script.replies.pop_front())
                .unwrap_or(Reply::Status(200))
        };
        reply.into_response().await
    }
}
