//! Synchronous test driver for async HTTP applications
//!
//! [`Bridge`] runs an [`Application`] on its own single-threaded tokio
//! runtime and exposes blocking, deadline-bounded request methods to test
//! code. [`JsonBridge`] layers JSON encoding and decoding on top, and
//! [`run_fixture`] wraps the whole thing in an arrange/act/assert lifecycle.

mod application;
mod bridge;
pub mod completion;
mod config;
mod error;
mod fixture;
mod json;

pub use application::{application_fn, Application, FnApplication};
pub use bridge::{Bridge, BridgeResponse, BridgeState, RequestOptions};
pub use config::{BridgeConfig, BridgeSettings, DEFAULT_REQUEST_TIMEOUT};
pub use error::BridgeError;
pub use fixture::{run_fixture, BridgeFixture, Fixture};
pub use json::{decode_json, prepare_request, JsonBody, JsonBridge, JsonRequestOptions, JsonResponse};
