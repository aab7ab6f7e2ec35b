//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives → routing key derived (client IP)
//!     → active strategy maps key to a backend:
//!         - random.rs (uniform pick, key ignored)
//!         - consistent_hash.rs (ring lookup, sticky per key)
//!     → dispatcher brackets the forward with inc()/done()
//!
//! Health monitor → add()/remove() on liveness transitions
//! ```
//!
//! # Design Decisions
//! - Strategies are trait objects behind `Arc`; selection and membership
//!   mutation share one reader/writer lock per strategy
//! - The health monitor is the only runtime writer of membership
//! - Algorithm chosen once at startup, by name, via the factory registry

pub mod consistent_hash;
pub mod random;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use thiserror::Error;

pub use consistent_hash::ConsistentHash;
pub use random::Random;

/// Registry name of the uniform-random strategy.
pub const RANDOM: &str = "random";

/// Registry name of the consistent-hash strategy.
pub const CONSISTENT_HASH: &str = "consistent-hash";

/// Errors produced by strategy construction and selection.
#[derive(Debug, Error)]
pub enum BalancerError {
    /// Selection was attempted against an empty membership set.
    #[error("no host available")]
    NoHost,

    /// No factory is registered under the requested algorithm name.
    #[error("unknown balancer algorithm: {0}")]
    UnknownAlgorithm(String),
}

/// A pluggable backend-selection strategy.
///
/// `balance` is called concurrently from every in-flight request, while
/// `add`/`remove` arrive from the health monitor as backends change
/// liveness. The `inc`/`done` hooks bracket each forwarded request so a
/// future connection-counting strategy can slot in without changing the
/// dispatcher contract.
pub trait Balancer: Send + Sync + std::fmt::Debug {
    /// Add a backend to the active membership. Idempotent.
    fn add(&self, key: &str);

    /// Drop a backend from the active membership. No-op if absent.
    fn remove(&self, key: &str);

    /// Map a routing key to a member backend.
    fn balance(&self, key: &str) -> Result<String, BalancerError>;

    /// Bracket-open hook, called once before each forward.
    fn inc(&self, _key: &str) {}

    /// Bracket-close hook, runs exactly once per successful `balance`.
    fn done(&self, _key: &str) {}
}

/// Constructor signature registered per algorithm name.
pub type Factory = fn(Vec<String>) -> Arc<dyn Balancer>;

/// Name-keyed table of strategy factories.
///
/// The process-wide instance is populated with the built-ins once and never
/// mutated afterwards; registration happens before any build.
#[derive(Default)]
pub struct Registry {
    table: HashMap<&'static str, Factory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate an algorithm name with its factory.
    pub fn register(&mut self, name: &'static str, factory: Factory) {
        self.table.insert(name, factory);
    }

    pub fn contains(&self, algorithm: &str) -> bool {
        self.table.contains_key(algorithm)
    }

    /// Build a strategy by name over the initial backend set.
    pub fn build(
        &self,
        algorithm: &str,
        hosts: Vec<String>,
    ) -> Result<Arc<dyn Balancer>, BalancerError> {
        let factory = self
            .table
            .get(algorithm)
            .ok_or_else(|| BalancerError::UnknownAlgorithm(algorithm.to_string()))?;
        Ok(factory(hosts))
    }
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut registry = Registry::new();
        registry.register(RANDOM, Random::build);
        registry.register(CONSISTENT_HASH, ConsistentHash::build);
        registry
    })
}

/// Whether a factory is registered under `algorithm` in the process-wide
/// registry.
pub fn is_registered(algorithm: &str) -> bool {
    registry().contains(algorithm)
}

/// Build a strategy from the process-wide registry.
pub fn build(algorithm: &str, hosts: Vec<String>) -> Result<Arc<dyn Balancer>, BalancerError> {
    registry().build(algorithm, hosts)
}
