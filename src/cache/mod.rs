//! Short-lived response cache.
//!
//! # Data Flow
//! ```text
//! Eligible GET (not an archive)
//!     → store.rs lookup by URL
//!         hit: entry.rs hands out one of its reads
//!         miss: request proceeds; a successful response is buffered,
//!               stored with a TTL and re-served from the buffer
//! Feature toggle changes → clear()
//! ```
//!
//! # Design Decisions
//! - Each entry serves at most `max_usage_count` reads so the origin is
//!   re-consulted even inside the TTL
//! - Use counters are atomic; no lock is held across an await

pub mod entry;
pub mod store;

pub use entry::CachedEntry;
pub use store::{Buffered, ResponseCache};
