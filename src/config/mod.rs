//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! TOML file → loader.rs (read + parse)
//!     → validation.rs (semantic checks, all errors collected)
//!     → schema.rs types handed to startup
//! ```
//!
//! # Design Decisions
//! - Serde handles syntax; validation handles semantics
//! - Every section has sane defaults so partial files work
//! - Construction-time errors are fatal; config is never reloaded at runtime

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BalancerConfig, HealthCheckConfig, ListenerConfig, ObservabilityConfig, ProxyConfig,
    TimeoutConfig,
};
