//! Load-balancing reverse proxy library.

pub mod balancer;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod proxy;

pub use config::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::HttpServer;
