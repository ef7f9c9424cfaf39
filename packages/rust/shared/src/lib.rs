//! Shared types, error model, and configuration for the harvester.
//!
//! This crate is the foundation depended on by all other harvester crates.
//! It provides:
//! - [`HarvestError`]: the unified error type
//! - Domain types ([`Index`], [`FetchOutcome`], [`FetchResults`], [`ProductSource`], [`RunId`])
//! - Configuration ([`AppConfig`], [`HarvestConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackoffKind, DefaultsConfig, HarvestConfig, HttpConfig, LocationPreset,
    MAX_WORKERS, PoolConfig, RetryConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{HarvestError, Result};
pub use types::{FetchOutcome, FetchResults, Index, ProductSource, RunId};
