//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → server.rs (Axum handler: routing key, balance, inc/done bracket,
//!       header annotation, failure boundary)
//!     → forwarder.rs (base-URI rewrite, hyper client, response streaming)
//!     → Response to client
//! ```
//!
//! # Design Decisions
//! - Forwarding is an opaque trait seam so tests can substitute doubles
//! - The forwarding-handle table is built once and never shrinks; only
//!   strategy membership changes with liveness
//! - Every per-request failure becomes a 502 without touching other
//!   requests

pub mod forwarder;
pub mod server;

use thiserror::Error;

use crate::balancer::BalancerError;

pub use forwarder::{Forwarder, ForwardError, HttpForwarder};
pub use server::HttpServer;

/// Construction-time errors; any of these aborts startup.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid backend target {url}: {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error(transparent)]
    Balancer(#[from] BalancerError),
}
