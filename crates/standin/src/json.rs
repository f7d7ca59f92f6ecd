//! JSON convenience layer over the bridge
//!
//! Serializes request bodies and decodes response bodies as JSON, honouring
//! content types so that non-JSON traffic passes through untouched.

use std::io;
use std::ops::{Deref, DerefMut};

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;

use crate::bridge::{Bridge, BridgeResponse, RequestOptions};
use crate::error::BridgeError;

const JSON_CONTENT_TYPE: &str = "application/json";
const JSON_CONTENT_TYPE_UTF8: &str = "application/json; charset=utf-8";

/// Request body for the JSON layer
#[derive(Clone, Debug, PartialEq)]
pub enum JsonBody {
    /// Serialized as JSON when the content type allows it
    Value(Value),
    /// Already encoded; sent as-is
    Raw(Bytes),
}

impl From<Value> for JsonBody {
    fn from(value: Value) -> Self {
        JsonBody::Value(value)
    }
}

impl From<&'static str> for JsonBody {
    fn from(text: &'static str) -> Self {
        JsonBody::Raw(Bytes::from(text))
    }
}

impl From<String> for JsonBody {
    fn from(text: String) -> Self {
        JsonBody::Raw(Bytes::from(text))
    }
}

impl From<Bytes> for JsonBody {
    fn from(bytes: Bytes) -> Self {
        JsonBody::Raw(bytes)
    }
}

#[derive(Clone, Debug, Default)]
pub struct JsonRequestOptions {
    pub headers: HeaderMap,
    pub body: Option<JsonBody>,
    pub query: Vec<(String, String)>,
    pub timeout: Option<std::time::Duration>,
}

impl JsonRequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        // Reuse the lenient header parsing of the plain options
        let parsed = RequestOptions::new().header(name, value).headers;
        self.headers.extend(parsed);
        self
    }

    pub fn body(mut self, body: impl Into<JsonBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A bridge response with its body decoded as JSON where applicable
#[derive(Clone, Debug)]
pub struct JsonResponse {
    pub response: BridgeResponse,
    /// `None` for non-JSON content types and undecodable bodies
    pub json: Option<Value>,
}

impl Deref for JsonResponse {
    type Target = BridgeResponse;

    fn deref(&self) -> &Self::Target {
        &self.response
    }
}

/// Turn JSON options into plain bridge options
///
/// A [`JsonBody::Value`] is serialized when the content type (explicit, or
/// `application/json` by default) ends in `json`; the content type header is
/// only added when the caller did not set one. `Accept: application/json` is
/// added unless the caller supplied an `Accept` header.
pub fn prepare_request(options: JsonRequestOptions) -> Result<RequestOptions, BridgeError> {
    let JsonRequestOptions {
        mut headers,
        body,
        query,
        timeout,
    } = options;

    let body = match body {
        None => None,
        Some(JsonBody::Raw(bytes)) => Some(bytes),
        Some(JsonBody::Value(value)) => {
            let header_val = headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or(JSON_CONTENT_TYPE)
                .to_string();
            let content_type = media_type(&header_val);
            if !content_type.ends_with("json") {
                return Err(BridgeError::Body(format!(
                    "JSON value cannot be sent as {}",
                    content_type
                )));
            }

            let encoded = to_vec_spaced(&value).map_err(|e| BridgeError::Body(e.to_string()))?;
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE_UTF8));
            }
            Some(Bytes::from(encoded))
        }
    };

    if !headers.contains_key(ACCEPT) {
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_CONTENT_TYPE));
    }

    Ok(RequestOptions {
        headers,
        body,
        query,
        timeout,
    })
}

/// Decode a response body as JSON if its content type says it is JSON
///
/// The `charset` parameter selects the decoding (UTF-8 by default).
pub fn decode_json(headers: &HeaderMap, body: &[u8]) -> Option<Value> {
    let header_val = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");

    if !media_type(header_val).ends_with("json") {
        return None;
    }

    let charset = header_val
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().strip_prefix("charset="))
        .map(|value| value.trim().trim_matches('"').to_ascii_lowercase())
        .next()
        .unwrap_or_else(|| "utf-8".to_string());

    let text = decode_text(&charset, body)?;
    serde_json::from_str(&text).ok()
}

fn media_type(header_val: &str) -> &str {
    header_val.split(';').next().unwrap_or("").trim()
}

fn decode_text(charset: &str, body: &[u8]) -> Option<String> {
    match charset {
        "utf-8" | "utf8" => std::str::from_utf8(body).ok().map(str::to_string),
        "us-ascii" | "ascii" => body
            .is_ascii()
            .then(|| String::from_utf8_lossy(body).into_owned()),
        "iso-8859-1" | "latin-1" | "latin1" => Some(body.iter().map(|&b| b as char).collect()),
        _ => None,
    }
}

/// Writes `", "` between items and `": "` after keys
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

fn to_vec_spaced(value: &Value) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

/// A [`Bridge`] that speaks JSON
pub struct JsonBridge {
    bridge: Bridge,
}

impl JsonBridge {
    pub fn new(bridge: Bridge) -> Self {
        Self { bridge }
    }

    pub fn into_inner(self) -> Bridge {
        self.bridge
    }

    pub fn request(
        &mut self,
        method: Method,
        path: &str,
        options: JsonRequestOptions,
    ) -> Result<JsonResponse, BridgeError> {
        let options = prepare_request(options)?;
        let response = self.bridge.request(method, path, options)?;
        let json = decode_json(&response.headers, &response.body);
        Ok(JsonResponse { response, json })
    }

    pub fn delete(&mut self, path: &str, options: JsonRequestOptions) -> Result<JsonResponse, BridgeError> {
        self.request(Method::DELETE, path, options)
    }

    pub fn get(&mut self, path: &str, options: JsonRequestOptions) -> Result<JsonResponse, BridgeError> {
        self.request(Method::GET, path, options)
    }

    pub fn post(
        &mut self,
        path: &str,
        body: impl Into<JsonBody>,
        options: JsonRequestOptions,
    ) -> Result<JsonResponse, BridgeError> {
        self.request(Method::POST, path, options.body(body))
    }

    pub fn put(
        &mut self,
        path: &str,
        body: impl Into<JsonBody>,
        options: JsonRequestOptions,
    ) -> Result<JsonResponse, BridgeError> {
        self.request(Method::PUT, path, options.body(body))
    }
}

impl Deref for JsonBridge {
    type Target = Bridge;

    fn deref(&self) -> &Self::Target {
        &self.bridge
    }
}

impl DerefMut for JsonBridge {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.bridge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_without_body_only_sets_accept() {
        let options = prepare_request(JsonRequestOptions::new()).unwrap();
        assert!(options.body.is_none());
        assert_eq!(options.headers.len(), 1);
        assert_eq!(options.headers[ACCEPT], "application/json");
    }

    #[test]
    fn test_json_body_is_serialized() {
        let options =
            prepare_request(JsonRequestOptions::new().body(json!({"foo": "bar"}))).unwrap();

        assert_eq!(options.body.unwrap(), Bytes::from(r#"{"foo": "bar"}"#));
        assert_eq!(options.headers[CONTENT_TYPE], "application/json; charset=utf-8");
        assert_eq!(options.headers[ACCEPT], "application/json");
    }

    #[test]
    fn test_nested_values_use_spaced_separators() {
        let encoded = to_vec_spaced(&json!({"a": [1, 2, {"b": null}], "c": true})).unwrap();
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            r#"{"a": [1, 2, {"b": null}], "c": true}"#
        );
    }

    #[test]
    fn test_custom_json_mime_type_is_kept() {
        let options = prepare_request(
            JsonRequestOptions::new()
                .header("content-type", "application/vnd.example.login+json")
                .body(json!({"foo": "bar"})),
        )
        .unwrap();

        assert_eq!(options.body.unwrap(), Bytes::from(r#"{"foo": "bar"}"#));
        assert_eq!(
            options.headers[CONTENT_TYPE],
            "application/vnd.example.login+json"
        );
    }

    #[test]
    fn test_raw_body_passes_unaltered() {
        let options = prepare_request(
            JsonRequestOptions::new()
                .header("content-type", "application/x-www-form-urlencoded")
                .body("a=1&b=2"),
        )
        .unwrap();

        assert_eq!(options.body.unwrap(), Bytes::from("a=1&b=2"));
        assert_eq!(
            options.headers[CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
        assert_eq!(options.headers[ACCEPT], "application/json");
    }

    #[test]
    fn test_value_with_non_json_content_type_is_rejected() {
        let err = prepare_request(
            JsonRequestOptions::new()
                .header("content-type", "text/plain")
                .body(json!([1])),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::Body(_)));
    }

    #[test]
    fn test_custom_accept_header_is_kept() {
        let options =
            prepare_request(JsonRequestOptions::new().header("accept", "text/html")).unwrap();
        assert_eq!(options.headers.len(), 1);
        assert_eq!(options.headers[ACCEPT], "text/html");
    }

    #[test]
    fn test_decode_json_response() {
        let decoded = decode_json(
            &headers(&[("content-type", "application/json; charset=utf8")]),
            br#"{"body":"value"}"#,
        );
        assert_eq!(decoded, Some(json!({"body": "value"})));
    }

    #[test]
    fn test_decode_latin1_response() {
        let decoded = decode_json(
            &headers(&[("content-type", "application/json; charset=ISO-8859-1")]),
            b"{\"name\":\"Jos\xe9\"}",
        );
        assert_eq!(decoded, Some(json!({"name": "José"})));
    }

    #[test]
    fn test_decode_non_json_is_none() {
        assert_eq!(
            decode_json(&headers(&[("content-type", "text/plain")]), b"{}"),
            None
        );
        assert_eq!(decode_json(&HeaderMap::new(), b"{}"), None);
    }

    #[test]
    fn test_decode_failures_are_none() {
        let json_headers = headers(&[("content-type", "application/json")]);
        assert_eq!(decode_json(&json_headers, b"{not json"), None);
        assert_eq!(decode_json(&json_headers, b"\xff\xfe"), None);

        let unknown = headers(&[("content-type", "application/json; charset=koi8-r")]);
        assert_eq!(decode_json(&unknown, b"{}"), None);
    }
}
