use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use standin_common::{encode_query, join_segments};

use crate::error::{ServiceError, UnexpectedRequest};
use crate::exchange::{InboundRequest, Request, Response};
use crate::http_plane::HttpPlane;
use crate::listener::bind_ephemeral;
use crate::recorder::{RecordedRequest, RequestHistory};
use crate::registry::ServiceRegistry;

/// Represents any number of upstream HTTP services during a test
///
/// Each service is a virtual host: it gets its own loopback listener on an
/// ephemeral port, while all listeners share one HTTP plane. Responses are
/// queued with [`ServiceLayer::add_response`] and handed out in the order
/// they were added, one per matching request.
///
/// The layer attaches to a tokio runtime; listeners only make progress
/// while that runtime is being driven. Dropping the layer closes every
/// listener.
pub struct ServiceLayer {
    handle: Handle,
    bind_host: IpAddr,
    registry: Arc<ServiceRegistry>,
    history: Arc<RequestHistory>,
    plane: Arc<HttpPlane>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl ServiceLayer {
    /// Attach to the tokio runtime of the calling context
    pub fn new() -> Result<Self, ServiceError> {
        Ok(Self::with_handle(Handle::try_current()?))
    }

    /// Attach to a specific runtime, e.g. the reactor of a bridge
    pub fn with_handle(handle: Handle) -> Self {
        let registry = ServiceRegistry::new();
        let history = Arc::new(RequestHistory::new());
        let plane = HttpPlane::new(registry.clone(), history.clone());

        Self {
            handle,
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            registry,
            history,
            plane,
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Register `resource` as an endpoint of `service`
    ///
    /// The first endpoint registered for a service creates it and binds its
    /// listener. Registering the same resource twice is a no-op.
    pub fn add_endpoint(&self, service: &str, resource: &str) -> Result<SocketAddr, ServiceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ServiceError::Closed);
        }

        let addr = match self.registry.get(service) {
            Ok(record) => record.addr,
            Err(_) => self.start_service(service)?,
        };

        if self.registry.add_endpoint(resource) {
            tracing::debug!("Registered endpoint {} (first seen on {})", resource, service);
        }
        Ok(addr)
    }

    fn start_service(&self, service: &str) -> Result<SocketAddr, ServiceError> {
        let (listener, addr) =
            bind_ephemeral(&self.handle, self.bind_host).map_err(|source| ServiceError::Bind {
                service: service.to_string(),
                source,
            })?;

        let record = self.registry.register(service, addr);
        if record.addr != addr {
            // Lost a registration race; the losing listener is simply dropped
            return Ok(record.addr);
        }

        let plane = self.plane.clone();
        let shutdown = self.shutdown.clone();
        let name = service.to_string();
        self.handle.spawn(async move {
            plane.run_with_listener(listener, name, shutdown).await;
        });

        Ok(addr)
    }

    /// Get the `Host` string (`host:port`) for a registered service
    pub fn get_service_host(&self, service: &str) -> Result<String, ServiceError> {
        Ok(self.registry.get(service)?.host.clone())
    }

    /// Build a URL that targets `service`
    ///
    /// Path segments are percent-escaped individually; query parameters are
    /// sorted and form-encoded.
    pub fn get_service_url<S: AsRef<str>>(
        &self,
        service: &str,
        path: &[S],
        query: &[(&str, &str)],
    ) -> Result<String, ServiceError> {
        let host = self.get_service_host(service)?;
        let mut url = format!("http://{}{}", host, join_segments(path));
        if !query.is_empty() {
            url.push('?');
            url.push_str(&encode_query(query.iter().copied()));
        }
        Ok(url)
    }

    /// Queue `response` for the next `request` that reaches `service`
    pub fn add_response(
        &self,
        service: &str,
        request: Request,
        response: Response,
    ) -> Result<(), ServiceError> {
        tracing::debug!(
            "Queued {} for {} {} on {}",
            response.status(),
            request.method(),
            request.resource(),
            service
        );
        self.registry.add_response(service, &request, response)
    }

    /// Retrieve the next response that matches an inbound request
    pub fn get_next_response(&self, inbound: &InboundRequest) -> Result<Response, ServiceError> {
        self.registry.get_next_response(inbound)
    }

    pub fn services(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Responses queued for `service` that no request has consumed yet
    pub fn pending_responses(&self, service: &str) -> Result<usize, ServiceError> {
        Ok(self.registry.get(service)?.responses.pending())
    }

    /// Get all recorded requests
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.history.requests()
    }

    pub fn requests_for(&self, service: &str) -> Vec<RecordedRequest> {
        self.history.requests_for(service)
    }

    pub fn request(&self, token: Uuid) -> Option<RecordedRequest> {
        self.history.request(token)
    }

    /// Get the last recorded request (if any)
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.history.last_request()
    }

    /// Clear recorded requests and unexpected-request failures
    pub fn clear_requests(&self) {
        self.history.clear();
    }

    /// Requests that arrived without a matching canned response
    pub fn unexpected_requests(&self) -> Vec<UnexpectedRequest> {
        self.history.unexpected()
    }

    /// Fail if any request went unanswered by the programmed responses
    pub fn verify(&self) -> Result<(), ServiceError> {
        let unexpected = self.history.unexpected();
        if unexpected.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::UnexpectedRequests(unexpected))
        }
    }

    /// Stop every listener; further endpoints are refused
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Closing service layer ({} services)", self.registry.names().len());
            self.shutdown.cancel();
        }
    }
}

impl Drop for ServiceLayer {
    fn drop(&mut self) {
        self.close();
    }
}
