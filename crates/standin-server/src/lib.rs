//! Programmable HTTP stand-in server
//!
//! A [`ServiceLayer`] stands in for any number of upstream HTTP services
//! during a test. Each named service gets its own ephemeral loopback port,
//! responses are queued ahead of time per method and resource, and every
//! inbound request is recorded for later assertions.

mod error;
mod exchange;
mod http_plane;
mod listener;
mod queue;
mod recorder;
mod registry;
mod service_layer;

// Re-export public types
pub use error::{ServiceError, UnexpectedRequest};
pub use exchange::{InboundRequest, Request, Response, UNSPECIFIED_REASON};
pub use queue::{ResponseQueue, RouteKey};
pub use recorder::{RecordedRequest, RequestHistory};
pub use registry::{ServiceRecord, ServiceRegistry};
pub use service_layer::ServiceLayer;

pub use hyper::Method;
