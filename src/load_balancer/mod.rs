//! Relay selection subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream target URL
//!     → rewrite.rs (feature gate, upstream check, raw URL normalization)
//!     → selector.rs (filter dead/excluded, archive preference):
//!         - pick: random within the tie-break window of the fastest
//!         - pick_many: fastest first, for racing
//!     → relay URI = prefix + normalized target
//! ```
//!
//! # Design Decisions
//! - Selection is stateless; latencies come from the health table
//! - Dead relays are excluded from selection
//! - Callers pass an exclusion set so repeated picks never repeat a relay

pub mod rewrite;
pub mod selector;

pub use rewrite::{normalize_raw_url, RelayRewriter};
pub use selector::RelaySelector;
