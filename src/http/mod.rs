//! HTTP request path.
//!
//! # Data Flow
//! ```text
//! Host request + send function
//!     → handler.rs (cache, relay choice, budget, fallback)
//!     → request.rs (buffered template, one clone per attempt)
//!     → transport.rs (next hop: hyper client over the racing connector)
//!     → response.rs (synthesized answers)
//! ```

pub mod handler;
pub mod request;
pub mod response;
pub mod transport;

pub use handler::AccelerationHandler;
pub use request::RequestTemplate;
pub use transport::{HyperTransport, Transport, TransportFuture};
