//! Uniform-random selection strategy.

use std::sync::{Arc, Mutex, RwLock};

use crate::balancer::{Balancer, BalancerError};

/// Picks a uniformly random member on every call, ignoring the routing key.
///
/// Each instance owns its random source so concurrent instances never share
/// RNG state.
#[derive(Debug)]
pub struct Random {
    hosts: RwLock<Vec<String>>,
    rng: Mutex<fastrand::Rng>,
}

impl Random {
    pub fn new(hosts: Vec<String>) -> Self {
        Self {
            hosts: RwLock::new(hosts),
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Factory registered under [`crate::balancer::RANDOM`].
    pub fn build(hosts: Vec<String>) -> Arc<dyn Balancer> {
        Arc::new(Self::new(hosts))
    }
}

impl Balancer for Random {
    fn add(&self, key: &str) {
        let mut hosts = self.hosts.write().unwrap();
        if !hosts.iter().any(|h| h == key) {
            hosts.push(key.to_string());
        }
    }

    fn remove(&self, key: &str) {
        // Clears every occurrence, defensive against duplicate entries.
        self.hosts.write().unwrap().retain(|h| h != key);
    }

    fn balance(&self, _key: &str) -> Result<String, BalancerError> {
        let hosts = self.hosts.read().unwrap();
        if hosts.is_empty() {
            return Err(BalancerError::NoHost);
        }
        let idx = self.rng.lock().unwrap().usize(..hosts.len());
        Ok(hosts[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_returns_a_member() {
        let lb = Random::new(vec!["h1".into(), "h2".into()]);
        for _ in 0..50 {
            let picked = lb.balance("ignored").unwrap();
            assert!(picked == "h1" || picked == "h2");
        }
    }

    #[test]
    fn empty_membership_is_no_host() {
        let lb = Random::new(vec![]);
        assert!(matches!(lb.balance("any"), Err(BalancerError::NoHost)));
    }

    #[test]
    fn remove_last_member_then_no_host() {
        let lb = Random::new(vec!["h1".into()]);
        lb.remove("h1");
        assert!(matches!(lb.balance("any"), Err(BalancerError::NoHost)));
    }

    #[test]
    fn add_is_idempotent() {
        let lb = Random::new(vec![]);
        lb.add("h1");
        lb.add("h1");
        // A single remove clears the key entirely, so no duplicate was kept.
        lb.remove("h1");
        assert!(matches!(lb.balance("any"), Err(BalancerError::NoHost)));
    }

    #[test]
    fn remove_absent_key_is_noop() {
        let lb = Random::new(vec!["h1".into()]);
        lb.remove("h2");
        assert_eq!(lb.balance("any").unwrap(), "h1");
    }
}
