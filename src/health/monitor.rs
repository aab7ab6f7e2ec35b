//! Active health monitoring.
//!
//! # Responsibilities
//! - Run one long-lived probe task per backend
//! - Drive the alive/dead state machine and keep strategy membership in sync

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time;

use crate::balancer::Balancer;
use crate::config::HealthCheckConfig;
use crate::health::state::LivenessMap;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

pub struct HealthMonitor {
    balancer: Arc<dyn Balancer>,
    liveness: Arc<LivenessMap>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(
        balancer: Arc<dyn Balancer>,
        liveness: Arc<LivenessMap>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            balancer,
            liveness,
            config,
        }
    }

    /// Spawn one independent monitor task per backend. Tasks run until the
    /// shutdown signal fires.
    pub fn spawn(self, hosts: Vec<String>, shutdown: &Shutdown) {
        tracing::info!(
            interval_secs = self.config.interval_secs,
            backends = hosts.len(),
            "Health monitor starting"
        );
        for host in hosts {
            tokio::spawn(watch_backend(
                host,
                self.balancer.clone(),
                self.liveness.clone(),
                self.config.clone(),
                shutdown.subscribe(),
            ));
        }
    }
}

/// Per-backend probe loop.
///
/// A failed probe while the backend is recorded alive removes it from the
/// balancer; a successful probe while recorded dead adds it back. Matching
/// results cause no membership mutation and no event.
async fn watch_backend(
    host: String,
    balancer: Arc<dyn Balancer>,
    liveness: Arc<LivenessMap>,
    config: HealthCheckConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = time::interval(Duration::from_secs(config.interval_secs));
    let timeout = Duration::from_secs(config.timeout_secs);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reachable = probe(&host, timeout).await;
                if !reachable && liveness.is_alive(&host) {
                    tracing::warn!(host = %host, "backend unreachable, removing from rotation");
                    liveness.set_alive(&host, false);
                    balancer.remove(&host);
                    metrics::record_backend_health(&host, false);
                } else if reachable && !liveness.is_alive(&host) {
                    tracing::info!(host = %host, "backend reachable again, restoring to rotation");
                    liveness.set_alive(&host, true);
                    balancer.add(&host);
                    metrics::record_backend_health(&host, true);
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!(host = %host, "health monitor task stopping");
                break;
            }
        }
    }
}

/// Liveness probe: a TCP connect to the backend authority within the
/// configured timeout. The outcome is state-machine input, never an error.
async fn probe(host: &str, timeout: Duration) -> bool {
    matches!(
        time::timeout(timeout, TcpStream::connect(host)).await,
        Ok(Ok(_))
    )
}
