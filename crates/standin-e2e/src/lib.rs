//! End-to-end test utilities for standin
//!
//! Sample applications the bridge can drive: one that records what it
//! receives, one that never answers, one that echoes requests back as JSON,
//! and a gateway that forwards to an upstream stand-in service.

pub mod applications;
pub mod gateway;

pub use applications::{EchoApplication, RecordedCall, RecordingApplication, StalledApplication};
pub use gateway::GatewayApplication;
