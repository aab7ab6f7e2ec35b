//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Ctrl+C → Shutdown::trigger()
//!     → broadcast to every subscriber:
//!         health monitor tasks exit their probe loops
//!         the serve loop stops accepting and drains
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
