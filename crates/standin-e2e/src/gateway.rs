//! Gateway application that forwards to an upstream service
//!
//! The code under test in a typical service-layer scenario: every request
//! the bridge sends is replayed against an upstream base URL and the
//! upstream reply is passed back unchanged. Forwarding failures become a
//! `502 Bad Gateway`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HOST;
use hyper::{Request, Response, StatusCode};
use parking_lot::RwLock;

use standin::Application;

/// Forwards every request to the configured upstream
///
/// Clones share the upstream setting, so it can be pointed at a stand-in
/// service after the bridge has started.
#[derive(Clone)]
pub struct GatewayApplication {
    upstream: Arc<RwLock<Option<String>>>,
    client: reqwest::Client,
}

impl Default for GatewayApplication {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayApplication {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_default();
        Self {
            upstream: Arc::new(RwLock::new(None)),
            client,
        }
    }

    /// Set the upstream base URL, e.g. `http://127.0.0.1:41234`
    pub fn set_upstream(&self, base: impl Into<String>) {
        *self.upstream.write() = Some(base.into().trim_end_matches('/').to_string());
    }

    async fn forward(&self, request: Request<Incoming>) -> anyhow::Result<Response<Full<Bytes>>> {
        let base = self
            .upstream
            .read()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No upstream configured"))?;

        let (parts, body) = request.into_parts();
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", base, path);
        tracing::debug!("Gateway forwarding {} {}", parts.method, url);

        let mut upstream = self.client.request(parts.method.clone(), &url);
        for (name, value) in parts.headers.iter() {
            if name != HOST {
                upstream = upstream.header(name, value);
            }
        }
        let body = body.collect().await?.to_bytes();
        if !body.is_empty() {
            upstream = upstream.body(body);
        }

        let reply = upstream.send().await?;
        let mut builder = Response::builder().status(reply.status());
        for (name, value) in reply.headers() {
            builder = builder.header(name, value);
        }
        let bytes = reply.bytes().await?;
        Ok(builder.body(Full::new(bytes))?)
    }
}

#[async_trait]
impl Application for GatewayApplication {
    async fn handle(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        match self.forward(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Failed to forward request: {}", e);
                let mut response = Response::new(Full::new(Bytes::from(format!(
                    "Forwarding error: {}",
                    e
                ))));
                *response.status_mut() = StatusCode::BAD_GATEWAY;
                response
            }
        }
    }
}
