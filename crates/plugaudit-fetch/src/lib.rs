//! Plugin bundle retrieval.
//!
//! Downloads bundle archives with bounded retry, unpacks them into
//! per-request scratch directories and hands back the bundle root.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extract;
pub mod retriever;
pub mod retry;

pub use error::{Result, RetrievalError};
pub use extract::FetchedBundle;
pub use retriever::{BundleRetriever, HttpRetriever};
pub use retry::RetryPolicy;
