//! Request and response values exchanged with stand-in services

use bytes::Bytes;
use http_body_util::Full;
use hyper::ext::ReasonPhrase;
use hyper::header::HOST;
use hyper::http::request::Parts;
use hyper::{HeaderMap, Method, StatusCode, Uri};

use standin_common::{encode_query, join_segments, parse_query, split_path, QueryMap};

use crate::error::ServiceError;

/// Reason phrase sent when a canned response does not name one
pub const UNSPECIFIED_REASON: &str = "Unspecified";

/// A client request as seen by the router
///
/// The resource path is normalized: segments are percent-escaped and
/// joined with a leading `/`. Query parameters are kept sorted so that
/// two requests compare equal regardless of parameter order. Only the
/// method and resource take part in response matching.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    method: Method,
    path: Vec<String>,
    resource: String,
    query: QueryMap,
}

impl Request {
    /// Build a request from a method and raw (unescaped) path segments
    pub fn new<S: AsRef<str>>(method: Method, path: &[S]) -> Self {
        let path: Vec<String> = path.iter().map(|s| s.as_ref().to_string()).collect();
        let resource = join_segments(&path);
        Self {
            method,
            path,
            resource,
            query: QueryMap::new(),
        }
    }

    /// Add a query parameter
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Normalize an inbound transport-level request
    pub fn from_inbound(inbound: &InboundRequest) -> Self {
        let segments = split_path(&inbound.path);
        let mut request = Self::new(inbound.method.clone(), segments.as_slice());
        if let Some(raw) = &inbound.query {
            request.query = parse_query(raw);
        }
        request
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Raw path segments as given
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Normalized resource path, e.g. `/users/john%20doe`
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn query_params(&self) -> &QueryMap {
        &self.query
    }

    /// Resource path plus the sorted, encoded query string
    pub fn url(&self) -> String {
        if self.query.is_empty() {
            return self.resource.clone();
        }
        let pairs = self
            .query
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |value| (name, value)));
        format!("{}?{}", self.resource, encode_query(pairs))
    }
}

/// Snapshot of the parts of an inbound HTTP request the router needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRequest {
    pub method: Method,
    /// Path exactly as received (still percent-escaped)
    pub path: String,
    /// Raw query string, without the leading `?`
    pub query: Option<String>,
    /// `Host` header, falling back to the URI authority
    pub host: Option<String>,
}

impl InboundRequest {
    pub fn from_parts(parts: &Parts) -> Self {
        Self::new(&parts.method, &parts.uri, &parts.headers)
    }

    pub fn from_request<B>(request: &hyper::Request<B>) -> Self {
        Self::new(request.method(), request.uri(), request.headers())
    }

    fn new(method: &Method, uri: &Uri, headers: &HeaderMap) -> Self {
        let host = headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|authority| authority.to_string()));

        Self {
            method: method.clone(),
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            host,
        }
    }

    /// Path and query as received, for error messages
    pub fn url(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

/// A canned response, consumed by exactly one matching request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    status: u16,
    reason: String,
    body: Option<Bytes>,
    headers: Vec<(String, String)>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: UNSPECIFIED_REASON.to_string(),
            body: None,
            headers: Vec::new(),
        }
    }

    /// Set the reason phrase; an empty phrase keeps the default
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if !reason.is_empty() {
            self.reason = reason;
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason_phrase(&self) -> &str {
        &self.reason
    }

    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Render into a hyper response, replaying headers and reason verbatim
    pub fn into_hyper(self) -> Result<hyper::Response<Full<Bytes>>, ServiceError> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| ServiceError::InvalidResponse(format!("status {}: {}", self.status, e)))?;
        let reason = ReasonPhrase::try_from(self.reason.clone())
            .map_err(|e| ServiceError::InvalidResponse(format!("reason {:?}: {}", self.reason, e)))?;

        let mut builder = hyper::Response::builder().status(status).extension(reason);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
            .body(Full::new(self.body.unwrap_or_default()))
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_normalizes_resource() {
        let request = Request::new(Method::GET, &["users", "john doe"]);
        assert_eq!(request.resource(), "/users/john%20doe");
        assert_eq!(request.url(), "/users/john%20doe");
        assert_eq!(request.path(), ["users", "john doe"]);
    }

    #[test]
    fn test_request_url_sorts_query() {
        let forward = Request::new(Method::GET, &["a"]).query("x", "1").query("y", "2");
        let backward = Request::new(Method::GET, &["a"]).query("y", "2").query("x", "1");
        assert_eq!(forward, backward);
        assert_eq!(forward.url(), "/a?x=1&y=2");
    }

    #[test]
    fn test_request_from_inbound_matches_constructed() {
        let inbound = InboundRequest::from_request(
            &hyper::Request::builder()
                .method("GET")
                .uri("/users/john%20doe?y=2&x=1")
                .header("host", "127.0.0.1:8080")
                .body(())
                .unwrap(),
        );
        assert_eq!(inbound.host.as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(inbound.url(), "/users/john%20doe?y=2&x=1");

        let request = Request::from_inbound(&inbound);
        let expected = Request::new(Method::GET, &["users", "john doe"])
            .query("x", "1")
            .query("y", "2");
        assert_eq!(request.resource(), expected.resource());
        assert_eq!(request.query_params(), expected.query_params());
    }

    #[test]
    fn test_inbound_host_falls_back_to_authority() {
        let inbound = InboundRequest::from_request(
            &hyper::Request::builder()
                .uri("http://127.0.0.1:9000/a")
                .body(())
                .unwrap(),
        );
        assert_eq!(inbound.host.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(inbound.path, "/a");
    }

    #[test]
    fn test_response_defaults() {
        let response = Response::new(204);
        assert_eq!(response.reason_phrase(), UNSPECIFIED_REASON);
        assert!(response.body_bytes().is_none());
        assert!(response.headers().is_empty());

        let response = Response::new(200).reason("");
        assert_eq!(response.reason_phrase(), UNSPECIFIED_REASON);
    }

    #[test]
    fn test_response_into_hyper() {
        let response = Response::new(201)
            .reason("Made It")
            .header("X-Id", "42")
            .body("created")
            .into_hyper()
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-id"], "42");
        let reason = response.extensions().get::<ReasonPhrase>().unwrap();
        assert_eq!(reason.as_bytes(), b"Made It");
    }

    #[test]
    fn test_response_invalid_status() {
        let err = Response::new(1000).into_hyper().unwrap_err();
        assert!(matches!(err, ServiceError::InvalidResponse(_)));
    }
}
