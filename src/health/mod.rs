//! Health monitoring
//!
//! Apatelets keep a websocket open to the control plane over which they
//! report their [`HealthStatus`](crate::models::HealthStatus) every second.
//! The control plane answers every report with a heartbeat, records the
//! status in the store, and periodically evicts unhealthy nodes.

pub mod client;
pub mod server;
pub mod watchdog;

pub use client::{ErrorCallback, HealthClient, HealthStream};
pub use server::{serve_stream, StreamSettings};
pub use watchdog::Watchdog;

/// Route of the health stream on the control plane
pub const HEALTH_STREAM_PATH: &str = "/api/v1/health/stream";
