//! Recording of inbound requests for test assertions
//!
//! Every request that reaches a stand-in service is stored before it is
//! dispatched, keyed by an opaque token, so a test can assert on exactly
//! what the code under test sent, independent of the reply it got.

use parking_lot::RwLock;
use uuid::Uuid;

use standin_common::QueryMap;

use crate::error::UnexpectedRequest;

/// A recorded HTTP request for test assertions
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    /// Opaque per-request token
    pub token: Uuid,
    /// Name of the service the Host header resolved to
    pub service: Option<String>,
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request URI as received
    pub uri: String,
    /// Normalized resource path
    pub path: String,
    pub query: QueryMap,
    pub host: Option<String>,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Vec<u8>,
    /// Status sent back, once the reply has been built
    pub response_status: Option<u16>,
}

impl RecordedRequest {
    /// First value of a header, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Shared history of every request seen by a service layer
#[derive(Debug, Default)]
pub struct RequestHistory {
    requests: RwLock<Vec<RecordedRequest>>,
    unexpected: RwLock<Vec<UnexpectedRequest>>,
}

impl RequestHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an inbound request, returning its token
    pub fn store_request(&self, request: RecordedRequest) -> Uuid {
        let token = request.token;
        self.requests.write().push(request);
        token
    }

    /// Attach the status of the reply to a recorded request
    pub fn store_response(&self, token: Uuid, status: u16) {
        if let Some(request) = self
            .requests
            .write()
            .iter_mut()
            .find(|request| request.token == token)
        {
            request.response_status = Some(status);
        }
    }

    pub fn store_unexpected(&self, failure: UnexpectedRequest) {
        self.unexpected.write().push(failure);
    }

    /// Get all recorded requests
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().clone()
    }

    pub fn requests_for(&self, service: &str) -> Vec<RecordedRequest> {
        self.requests
            .read()
            .iter()
            .filter(|request| request.service.as_deref() == Some(service))
            .cloned()
            .collect()
    }

    pub fn request(&self, token: Uuid) -> Option<RecordedRequest> {
        self.requests
            .read()
            .iter()
            .find(|request| request.token == token)
            .cloned()
    }

    /// Get the last recorded request (if any)
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.read().last().cloned()
    }

    pub fn unexpected(&self) -> Vec<UnexpectedRequest> {
        self.unexpected.read().clone()
    }

    /// Clear recorded requests and failures
    pub fn clear(&self) {
        self.requests.write().clear();
        self.unexpected.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(service: &str, path: &str) -> RecordedRequest {
        RecordedRequest {
            token: Uuid::new_v4(),
            service: Some(service.to_string()),
            method: "GET".to_string(),
            uri: path.to_string(),
            path: path.to_string(),
            query: QueryMap::new(),
            host: None,
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            body: b"hello".to_vec(),
            response_status: None,
        }
    }

    #[test]
    fn test_store_and_lookup_by_token() {
        let history = RequestHistory::new();
        let first = history.store_request(recorded("users", "/a"));
        let second = history.store_request(recorded("billing", "/b"));
        history.store_response(first, 204);

        assert_eq!(history.requests().len(), 2);
        assert_eq!(history.request(first).unwrap().response_status, Some(204));
        assert_eq!(history.request(second).unwrap().response_status, None);
        assert_eq!(history.last_request().unwrap().token, second);
        assert_eq!(history.requests_for("billing").len(), 1);
        assert!(history.request(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let request = recorded("users", "/a");
        assert_eq!(request.header("content-type"), Some("text/plain"));
        assert_eq!(request.header("accept"), None);
        assert_eq!(request.body_text(), "hello");
    }

    #[test]
    fn test_clear() {
        let history = RequestHistory::new();
        history.store_request(recorded("users", "/a"));
        history.clear();
        assert!(history.requests().is_empty());
        assert!(history.last_request().is_none());
    }
}
