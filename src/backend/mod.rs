//! Backend module - Outbound HTTP forwarding to service instances

pub mod forwarder;

pub use forwarder::{ForwardedResponse, Forwarder};
