//! Outbound Throttle - Request Pacing for HTTP Clients
//!
//! This crate wraps an HTTP transport and paces the requests that go through
//! it. Each request is matched against method and path prefix rules; matching
//! requests are admitted by a single-token bucket and either wait for their
//! slot or are rejected, depending on whether over-queueing is allowed.

pub mod config;
pub mod error;
pub mod throttle;

pub use config::ThrottleConfig;
pub use error::{Result, SendError, ThrottleError};
pub use throttle::{ThrottlingPolicy, ThrottlingTransport, Transport};
