use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use standin_common::accept_retry_delay;

use crate::error::{ServiceError, UnexpectedRequest};
use crate::exchange::{InboundRequest, Request as CannedRequest};
use crate::recorder::{RecordedRequest, RequestHistory};
use crate::registry::ServiceRegistry;

/// HTTP plane shared by every stand-in service listener
///
/// Records each inbound request, then answers it with the next canned
/// response of the service its `Host` header names.
pub struct HttpPlane {
    registry: Arc<ServiceRegistry>,
    history: Arc<RequestHistory>,
}

impl HttpPlane {
    pub fn new(registry: Arc<ServiceRegistry>, history: Arc<RequestHistory>) -> Arc<Self> {
        Arc::new(Self { registry, history })
    }

    /// Accept connections for one service until `shutdown` fires
    pub async fn run_with_listener(
        self: Arc<Self>,
        listener: TcpListener,
        service: String,
        shutdown: CancellationToken,
    ) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Stand-in service {} listening on {}", service, addr);
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Stand-in service {} shutting down", service);
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            let delay = accept_retry_delay(&e);
                            tracing::warn!(
                                "Stand-in service {} accept failed, retrying in {:?}: {}",
                                service,
                                delay,
                                e
                            );
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                            continue;
                        }
                    };
                    tracing::debug!("Connection to {} from {}", service, peer_addr);

                    let this = self.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        this.serve_connection(stream, peer_addr, shutdown).await;
                    });
                }
            }
        }
    }

    async fn serve_connection(
        self: Arc<Self>,
        stream: TcpStream,
        peer_addr: SocketAddr,
        shutdown: CancellationToken,
    ) {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req| {
            let this = self.clone();
            async move { this.handle_request(req).await }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::select! {
            result = conn => {
                if let Err(e) = result {
                    tracing::debug!("HTTP connection error from {}: {}", peer_addr, e);
                }
            }
            _ = shutdown.cancelled() => {}
        }
    }

    async fn handle_request(
        self: Arc<Self>,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let (parts, body) = req.into_parts();
        let inbound = InboundRequest::from_parts(&parts);
        tracing::debug!(
            "Stand-in request: {} {} (Host: {:?})",
            inbound.method,
            inbound.url(),
            inbound.host
        );

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes().to_vec(),
            Err(e) => {
                tracing::warn!("Failed to read request body: {}", e);
                Vec::new()
            }
        };

        let normalized = CannedRequest::from_inbound(&inbound);
        let service = inbound
            .host
            .as_deref()
            .and_then(|host| self.registry.find_by_host(host))
            .map(|record| record.name.clone());

        let token = self.history.store_request(RecordedRequest {
            token: Uuid::new_v4(),
            service,
            method: inbound.method.to_string(),
            uri: parts.uri.to_string(),
            path: normalized.resource().to_string(),
            query: normalized.query_params().clone(),
            host: inbound.host.clone(),
            headers: parts
                .headers
                .iter()
                .map(|(k, v)| {
                    (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned())
                })
                .collect(),
            body,
            response_status: None,
        });

        let response = match self
            .registry
            .get_next_response(&inbound)
            .and_then(|canned| canned.into_hyper())
        {
            Ok(response) => response,
            Err(e) => self.reject(token, &inbound, e),
        };

        self.history.store_response(token, response.status().as_u16());
        Ok(response)
    }

    /// Record a request nothing was programmed for and answer it loudly
    fn reject(
        &self,
        token: Uuid,
        inbound: &InboundRequest,
        error: ServiceError,
    ) -> Response<Full<Bytes>> {
        tracing::error!("{}", error);

        let status = match &error {
            ServiceError::UnknownEndpoint { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        self.history.store_unexpected(UnexpectedRequest {
            token,
            method: inbound.method.to_string(),
            uri: inbound.url(),
            host: inbound.host.clone(),
            reason: error.to_string(),
        });

        let mut response = Response::new(Full::new(Bytes::from(error.to_string())));
        *response.status_mut() = status;
        response
    }
}
