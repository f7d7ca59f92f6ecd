//! Sample applications for bridge tests
//!
//! [`RecordingApplication`] records incoming requests and returns a
//! configurable response. [`StalledApplication`] accepts requests and never
//! answers them. [`EchoApplication`] describes each request back as JSON.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderName, ACCEPT, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use parking_lot::RwLock;
use serde_json::json;

use standin::Application;

/// A request received by a [`RecordingApplication`]
#[derive(Clone, Debug)]
pub struct RecordedCall {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request URI path and query
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedCall {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug)]
struct Reply {
    status: StatusCode,
    body: Vec<u8>,
    headers: Vec<(String, String)>,
}

/// Records every request; clones share the same record and reply
#[derive(Clone, Debug)]
pub struct RecordingApplication {
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    reply: Arc<RwLock<Reply>>,
}

impl Default for RecordingApplication {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingApplication {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            reply: Arc::new(RwLock::new(Reply {
                status: StatusCode::OK,
                body: b"OK".to_vec(),
                headers: Vec::new(),
            })),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().clone()
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls.read().last().cloned()
    }

    pub fn set_response_status(&self, status: StatusCode) {
        self.reply.write().status = status;
    }

    pub fn set_response_body(&self, body: impl Into<Vec<u8>>) {
        self.reply.write().body = body.into();
    }

    pub fn add_response_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.reply.write().headers.push((name.into(), value.into()));
    }
}

#[async_trait]
impl Application for RecordingApplication {
    async fn handle(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        let (parts, body) = request.into_parts();
        let body = body
            .collect()
            .await
            .map(|b| b.to_bytes().to_vec())
            .unwrap_or_default();

        self.calls.write().push(RecordedCall {
            method: parts.method.to_string(),
            uri: parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string()),
            headers: parts
                .headers
                .iter()
                .map(|(k, v)| {
                    (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned())
                })
                .collect(),
            body,
        });

        let reply = self.reply.read();
        let mut builder = Response::builder().status(reply.status);
        for (name, value) in &reply.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
            .body(Full::new(Bytes::from(reply.body.clone())))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
    }
}

/// Accepts requests and never responds
#[derive(Clone, Copy, Debug, Default)]
pub struct StalledApplication;

#[async_trait]
impl Application for StalledApplication {
    async fn handle(&self, _request: Request<Incoming>) -> Response<Full<Bytes>> {
        std::future::pending().await
    }
}

/// Answers every request with a JSON description of it
///
/// The reply carries the method, the request path, the `Content-Type` and
/// `Accept` headers and the body as text.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoApplication;

#[async_trait]
impl Application for EchoApplication {
    async fn handle(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        let (parts, body) = request.into_parts();
        let header = |name: HeaderName| {
            parts
                .headers
                .get(name)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        };
        let body = body
            .collect()
            .await
            .map(|b| b.to_bytes())
            .unwrap_or_default();

        let description = json!({
            "method": parts.method.as_str(),
            "path": parts.uri.path(),
            "content_type": header(CONTENT_TYPE),
            "accept": header(ACCEPT),
            "body": String::from_utf8_lossy(&body),
        });

        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(description.to_string())))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
    }
}
