//! Backend liveness bookkeeping.

use std::collections::HashMap;
use std::sync::RwLock;

/// Recorded reachability per backend.
///
/// Written only by each backend's own monitor task; reads are frequent and
/// concurrent, so a reader/writer lock keeps them from blocking each other.
pub struct LivenessMap {
    alive: RwLock<HashMap<String, bool>>,
}

impl LivenessMap {
    /// Start with every configured backend optimistically marked alive.
    pub fn new(hosts: &[String]) -> Self {
        let alive = hosts.iter().map(|h| (h.clone(), true)).collect();
        Self {
            alive: RwLock::new(alive),
        }
    }

    pub fn is_alive(&self, host: &str) -> bool {
        self.alive.read().unwrap().get(host).copied().unwrap_or(false)
    }

    pub fn set_alive(&self, host: &str, alive: bool) {
        self.alive.write().unwrap().insert(host.to_string(), alive);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_optimistically_alive() {
        let map = LivenessMap::new(&["h1".to_string(), "h2".to_string()]);
        assert!(map.is_alive("h1"));
        assert!(map.is_alive("h2"));
        assert!(!map.is_alive("unknown"));
    }

    #[test]
    fn flips_track_latest_write() {
        let map = LivenessMap::new(&["h1".to_string()]);
        map.set_alive("h1", false);
        assert!(!map.is_alive("h1"));
        map.set_alive("h1", true);
        assert!(map.is_alive("h1"));
    }
}
