//! Outbound network layer.
//!
//! # Data Flow
//! ```text
//! hyper-util Client asks for a connection to a URI
//!     → connector.rs (scheme, host, port, optional TLS)
//!     → racer.rs (staggered connect across addresses)
//!         → dns.rs (resolve, edge substitution, family interleave)
//!         → penalty.rs (recently failed addresses go last)
//!     → first live stream handed back to hyper
//! ```
//!
//! # Design Decisions
//! - One penalty box per process, injected by the composition root
//! - Resolution sits behind the `Resolve` trait so tests run without DNS
//! - Cancelling the shared token aborts every attempt of a race

pub mod connector;
pub mod dns;
pub mod penalty;
pub mod racer;

pub use connector::RacingConnector;
pub use dns::{DnsPreference, Resolve, SystemResolver};
pub use penalty::AddressPenaltyBox;
pub use racer::{AddressRacer, ConnectError};
