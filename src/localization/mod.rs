//! Response body post-processing.
//!
//! The handler hands a successful body to a `ResponseRewriter` after the
//! fetch and before caching. The handler decides whether a URL qualifies;
//! rewriters only transform bytes.

pub mod translator;

use bytes::Bytes;

pub use translator::{DescriptionTranslator, LocalizationError};

pub trait ResponseRewriter: Send + Sync {
    /// New body for `url`, or `None` to keep the original.
    fn rewrite(&self, url: &str, body: &Bytes) -> Option<Bytes>;
}
