//! Consistent-hash selection strategy.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use crate::balancer::{Balancer, BalancerError};

/// Virtual positions placed on the ring per backend. More positions smooth
/// the load split between members at the cost of a larger ring.
const VIRTUAL_NODES: usize = 100;

#[derive(Debug)]
struct Ring {
    /// Hash-space position → owning backend, ordered for clockwise walks.
    positions: BTreeMap<u64, String>,
    /// Current members, consulted to keep add/remove idempotent.
    members: HashSet<String>,
}

/// Maps each routing key to the backend owning the next ring position
/// clockwise. Selection is a pure function of the ring state and key, and
/// removing a backend only remaps the keys that were assigned to it.
#[derive(Debug)]
pub struct ConsistentHash {
    ring: RwLock<Ring>,
}

impl ConsistentHash {
    pub fn new(hosts: Vec<String>) -> Self {
        let ch = Self {
            ring: RwLock::new(Ring {
                positions: BTreeMap::new(),
                members: HashSet::new(),
            }),
        };
        for host in hosts {
            ch.add(&host);
        }
        ch
    }

    /// Factory registered under [`crate::balancer::CONSISTENT_HASH`].
    pub fn build(hosts: Vec<String>) -> Arc<dyn Balancer> {
        Arc::new(Self::new(hosts))
    }
}

fn position(input: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    hasher.finish()
}

impl Balancer for ConsistentHash {
    fn add(&self, key: &str) {
        let mut ring = self.ring.write().unwrap();
        if !ring.members.insert(key.to_string()) {
            return;
        }
        for i in 0..VIRTUAL_NODES {
            ring.positions
                .insert(position(&format!("{key}#{i}")), key.to_string());
        }
    }

    fn remove(&self, key: &str) {
        let mut ring = self.ring.write().unwrap();
        if !ring.members.remove(key) {
            return;
        }
        ring.positions.retain(|_, owner| owner != key);
    }

    fn balance(&self, key: &str) -> Result<String, BalancerError> {
        let ring = self.ring.read().unwrap();
        if ring.positions.is_empty() {
            return Err(BalancerError::NoHost);
        }
        let hash = position(key);
        // Next position clockwise, wrapping to the ring start.
        let owner = ring
            .positions
            .range(hash..)
            .next()
            .or_else(|| ring.positions.iter().next())
            .map(|(_, owner)| owner.clone());
        owner.ok_or(BalancerError::NoHost)
    }
}
