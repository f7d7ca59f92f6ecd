//! JSON bridge end-to-end tests

use std::time::Duration;

use hyper::StatusCode;
use serde_json::json;
use standin::{Bridge, BridgeConfig, BridgeError, JsonBridge, JsonRequestOptions};
use standin_e2e::{EchoApplication, RecordingApplication};

/// Initialize tracing for tests
fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("standin=debug,standin_e2e=debug")
        .with_test_writer()
        .try_init();
}

fn start<A: standin::Application>(application: A) -> JsonBridge {
    let mut bridge =
        Bridge::new(BridgeConfig::default().with_request_timeout(Duration::from_secs(5)));
    bridge.start(application).expect("Failed to start bridge");
    JsonBridge::new(bridge)
}

#[test]
fn test_json_post_encodes_value() {
    init_test();

    let mut bridge = start(EchoApplication);
    let resp = bridge
        .post("/users", json!({"name": "test"}), JsonRequestOptions::new())
        .expect("POST failed");

    assert_eq!(resp.status, StatusCode::OK);
    let echo = resp.json.clone().expect("Response was not decoded");
    assert_eq!(echo["method"], "POST");
    assert_eq!(echo["path"], "/users");
    assert_eq!(echo["content_type"], "application/json; charset=utf-8");
    assert_eq!(echo["accept"], "application/json");
    assert_eq!(echo["body"], r#"{"name": "test"}"#);
}

#[test]
fn test_json_get_sends_accept_only() {
    init_test();

    let mut bridge = start(EchoApplication);
    let resp = bridge.get("/users", JsonRequestOptions::new()).unwrap();

    let echo = resp.json.clone().unwrap();
    assert_eq!(echo["method"], "GET");
    assert_eq!(echo["accept"], "application/json");
    assert_eq!(echo["body"], "");
}

#[test]
fn test_json_caller_headers_win() {
    init_test();

    let mut bridge = start(EchoApplication);
    let resp = bridge
        .put(
            "/users/1",
            json!([1, 2]),
            JsonRequestOptions::new()
                .header("Content-Type", "application/vnd.api+json")
                .header("Accept", "text/plain"),
        )
        .unwrap();

    let echo = resp.json.clone().unwrap();
    assert_eq!(echo["content_type"], "application/vnd.api+json");
    assert_eq!(echo["accept"], "text/plain");
    assert_eq!(echo["body"], "[1, 2]");
}

#[test]
fn test_json_raw_body_passes_through() {
    init_test();

    let mut bridge = start(EchoApplication);
    let resp = bridge
        .post(
            "/raw",
            "not json at all",
            JsonRequestOptions::new().header("Content-Type", "text/plain"),
        )
        .unwrap();

    let echo = resp.json.clone().unwrap();
    assert_eq!(echo["content_type"], "text/plain");
    assert_eq!(echo["body"], "not json at all");
}

#[test]
fn test_json_value_with_foreign_content_type_is_rejected() {
    init_test();

    let mut bridge = start(EchoApplication);
    let err = bridge
        .post(
            "/users",
            json!({"a": 1}),
            JsonRequestOptions::new().header("Content-Type", "text/plain"),
        )
        .unwrap_err();
    assert!(matches!(err, BridgeError::Body(_)));
}

#[test]
fn test_json_non_json_response_is_not_decoded() {
    init_test();

    let app = RecordingApplication::new();
    app.add_response_header("Content-Type", "text/plain");
    app.set_response_body("{\"looks\": \"like json\"}");

    let mut bridge = start(app);
    let resp = bridge.get("/plain", JsonRequestOptions::new()).unwrap();

    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.json.is_none());
    assert_eq!(resp.text(), "{\"looks\": \"like json\"}");
}

#[test]
fn test_json_latin1_response_is_decoded() {
    init_test();

    let app = RecordingApplication::new();
    app.add_response_header("Content-Type", "application/json; charset=iso-8859-1");
    app.set_response_body(b"{\"name\": \"caf\xe9\"}".to_vec());

    let mut bridge = start(app);
    let resp = bridge.get("/cafe", JsonRequestOptions::new()).unwrap();

    assert_eq!(resp.json.clone().unwrap()["name"], "café");
}
