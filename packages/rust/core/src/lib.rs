//! Harvest orchestration: bounded fetch pool, result aggregation, and the
//! end-to-end pipeline.

pub mod aggregator;
pub mod pipeline;
pub mod pool;
pub mod summary;

pub use aggregator::{AggregateOptions, Artifact, ResultAggregator};
pub use pipeline::{HarvestOutput, Harvester, ProgressReporter, SilentProgress};
pub use pool::{FALLBACK_WORKERS, PoolReport, PoolRun, WorkerPool, auto_worker_count, worker_count_for};
pub use summary::{FailedIndex, RunSummary};
