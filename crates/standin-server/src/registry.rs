use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use standin_common::{join_segments, split_path};

use crate::error::ServiceError;
use crate::exchange::{InboundRequest, Request, Response};
use crate::queue::ResponseQueue;

/// A named stand-in service reachable at one `host:port`
#[derive(Debug)]
pub struct ServiceRecord {
    pub name: String,
    pub addr: SocketAddr,
    /// `host:port` as it appears in the `Host` header
    pub host: String,
    pub responses: ResponseQueue,
}

/// Maps service names to their addresses and response queues
///
/// Routes are shared across services; which service answers a request is
/// decided by its `Host` header at dispatch time.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    /// Service name -> record
    services: DashMap<String, Arc<ServiceRecord>>,
    /// Normalized resource paths of registered endpoints
    endpoints: RwLock<HashSet<String>>,
}

impl ServiceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a service at `addr`
    ///
    /// The first address registered for a name wins; registering the name
    /// again returns the existing record untouched.
    pub fn register(&self, name: &str, addr: SocketAddr) -> Arc<ServiceRecord> {
        match self.services.entry(name.to_string()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(vacant) => {
                let record = Arc::new(ServiceRecord {
                    name: name.to_string(),
                    addr,
                    host: addr.to_string(),
                    responses: ResponseQueue::new(),
                });
                vacant.insert(record.clone());
                record
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<ServiceRecord>, ServiceError> {
        self.services
            .get(name)
            .map(|record| record.clone())
            .ok_or_else(|| ServiceError::UnknownService(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Find the service whose address matches a `Host` header
    pub fn find_by_host(&self, host: &str) -> Option<Arc<ServiceRecord>> {
        self.services
            .iter()
            .find(|record| record.host == host)
            .map(|record| record.value().clone())
    }

    /// List all registered service names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Register a resource path; returns `false` if it was already known
    pub fn add_endpoint(&self, resource: &str) -> bool {
        self.endpoints.write().insert(normalize_resource(resource))
    }

    pub fn has_endpoint(&self, resource: &str) -> bool {
        self.endpoints.read().contains(&normalize_resource(resource))
    }

    /// Queue `response` for the next `request` that reaches `service`
    pub fn add_response(
        &self,
        service: &str,
        request: &Request,
        response: Response,
    ) -> Result<(), ServiceError> {
        self.get(service)?.responses.push(request, response);
        Ok(())
    }

    /// Pop the canned response for an inbound request
    ///
    /// Fails if the resource was never registered, if no service owns the
    /// `Host` header, or if that service has no response left for the
    /// request's method and resource.
    pub fn get_next_response(&self, inbound: &InboundRequest) -> Result<Response, ServiceError> {
        let request = Request::from_inbound(inbound);

        if !self.has_endpoint(request.resource()) {
            return Err(ServiceError::UnknownEndpoint {
                method: inbound.method.to_string(),
                url: inbound.url(),
                resource: request.resource().to_string(),
            });
        }

        let service = inbound
            .host
            .as_deref()
            .and_then(|host| self.find_by_host(host))
            .ok_or_else(|| ServiceError::UnknownHost {
                method: inbound.method.to_string(),
                url: inbound.url(),
                host: inbound.host.clone(),
            })?;

        service
            .responses
            .pop(&request)
            .ok_or_else(|| ServiceError::ExhaustedQueue {
                service: service.name.clone(),
                method: inbound.method.to_string(),
                url: inbound.url(),
            })
    }
}

/// Endpoints go through the same decode/escape round as inbound paths
fn normalize_resource(resource: &str) -> String {
    join_segments(split_path(resource))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Method;

    fn inbound(method: Method, path: &str, host: &str) -> InboundRequest {
        InboundRequest {
            method,
            path: path.to_string(),
            query: None,
            host: Some(host.to_string()),
        }
    }

    #[test]
    fn test_first_registration_wins() {
        let registry = ServiceRegistry::new();
        let first = registry.register("users", "127.0.0.1:4000".parse().unwrap());
        let second = registry.register("users", "127.0.0.1:5000".parse().unwrap());
        assert_eq!(first.addr, second.addr);
        assert_eq!(registry.get("users").unwrap().host, "127.0.0.1:4000");
    }

    #[test]
    fn test_unknown_service() {
        let registry = ServiceRegistry::new();
        let err = registry.get("missing").unwrap_err();
        assert!(matches!(err, ServiceError::UnknownService(name) if name == "missing"));

        let err = registry
            .add_response(
                "missing",
                &Request::new(Method::GET, &["a"]),
                Response::new(200),
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnknownService(_)));
    }

    #[test]
    fn test_endpoints_are_idempotent_and_normalized() {
        let registry = ServiceRegistry::new();
        assert!(registry.add_endpoint("/users/john doe"));
        assert!(!registry.add_endpoint("/users/john%20doe"));
        assert!(registry.has_endpoint("users/john%20doe"));
    }

    #[test]
    fn test_dispatch_by_host() {
        let registry = ServiceRegistry::new();
        registry.register("a", "127.0.0.1:4001".parse().unwrap());
        registry.register("b", "127.0.0.1:4002".parse().unwrap());
        registry.add_endpoint("/status");

        let request = Request::new(Method::GET, &["status"]);
        registry
            .add_response("a", &request, Response::new(200).body("from a"))
            .unwrap();
        registry
            .add_response("b", &request, Response::new(503).body("from b"))
            .unwrap();

        let from_b = registry
            .get_next_response(&inbound(Method::GET, "/status", "127.0.0.1:4002"))
            .unwrap();
        assert_eq!(from_b.status(), 503);

        let err = registry
            .get_next_response(&inbound(Method::GET, "/status", "127.0.0.1:4002"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::ExhaustedQueue { ref service, .. } if service == "b"));

        let from_a = registry
            .get_next_response(&inbound(Method::GET, "/status", "127.0.0.1:4001"))
            .unwrap();
        assert_eq!(from_a.body_bytes().unwrap().as_ref(), b"from a");
    }

    #[test]
    fn test_unmatched_requests_fail() {
        let registry = ServiceRegistry::new();
        registry.register("a", "127.0.0.1:4001".parse().unwrap());
        registry.add_endpoint("/status");

        let err = registry
            .get_next_response(&inbound(Method::GET, "/status", "127.0.0.1:9999"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnknownHost { .. }));

        let err = registry
            .get_next_response(&inbound(Method::GET, "/other", "127.0.0.1:4001"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnknownEndpoint { .. }));
        assert!(err.to_string().contains("GET /other"));
    }
}
