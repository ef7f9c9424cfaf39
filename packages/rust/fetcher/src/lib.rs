//! Single-document retrieval with retry.
//!
//! This crate provides:
//! - [`transport`]: the GET capability ([`Transport`]) and its reqwest implementation
//! - [`backoff`]: pluggable waits between attempts ([`FixedDelay`], [`ExponentialBackoff`])
//! - [`fetcher`]: [`DocumentFetcher`], which turns one index into one [`FetchOutcome`]
//!
//! [`FetchOutcome`]: harvester_shared::FetchOutcome

pub mod backoff;
pub mod fetcher;
pub mod transport;

pub use backoff::{Backoff, ExponentialBackoff, FixedDelay, backoff_from_config};
pub use fetcher::{DocumentFetcher, Fetch};
pub use transport::{HttpTransport, Transport};
