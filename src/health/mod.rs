//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! One monitor task per backend (monitor.rs):
//!     Periodic TCP probe
//!     → Compare result against recorded liveness (state.rs)
//!     → On transition: flip liveness, add/remove balancer membership,
//!       log and update the health gauge
//! ```
//!
//! # Design Decisions
//! - Single-tick transitions: one failed probe removes a backend, one
//!   successful probe restores it
//! - Probe failures are state-machine input, not errors; the next tick
//!   retries
//! - Liveness is recorded separately from strategy membership and diffed
//!   against each probe result, so no-op ticks cause no membership churn

pub mod monitor;
pub mod state;

pub use monitor::HealthMonitor;
pub use state::LivenessMap;
