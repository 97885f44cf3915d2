//! Target classification.
//!
//! # Data Flow
//! ```text
//! Outgoing request URL
//!     → matcher.rs (upstream? official repository? archive? image?)
//!     → registry.rs (tracked plugin listing? first or third party?)
//!     → handler picks cache policy, retry budget and relay strategy
//! ```
//!
//! # Design Decisions
//! - Matchers are plain string checks; no regex on the hot path
//! - The registry is an atomically swapped snapshot

pub mod matcher;
pub mod registry;

pub use matcher::{looks_resolvable, Matcher, PrefixMatcher, SuffixMatcher};
pub use registry::{RepositoryRegistry, TrackedRepository};
