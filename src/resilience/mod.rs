//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Tracked request:
//!     → timeouts.rs (attempt budget: overall deadline, tightening
//!       per-attempt timeout, non-success retried)
//!     → race.rs (one clone per relay candidate, first success wins)
//!
//! Other requests:
//!     → race.rs with zero or one candidate (plain send)
//! ```
//!
//! # Design Decisions
//! - Every attempt and every race clone runs under a child token of the
//!   caller's token, so caller cancellation reaches all of them
//! - Race losers are cancelled, never awaited

pub mod race;
pub mod timeouts;

pub use race::RequestRacer;
pub use timeouts::AttemptBudget;
