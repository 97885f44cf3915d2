//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Accelerator (tables, probe, selector, cache, handler)
//!            → probe ticker spawned under the shutdown token
//!
//! Shutdown (shutdown.rs):
//!     Root token cancelled → probe ticker, connection races and the
//!     status server stop → remaining tasks drained with a deadline
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → root token cancelled
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Accelerator, StartupError};
