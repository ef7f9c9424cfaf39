//! Per-run summary and gap report.

use chrono::{DateTime, Utc};
use harvester_shared::{FetchOutcome, FetchResults, Index, RunId};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::aggregator::Artifact;
use crate::pool::PoolReport;

/// An index whose retries were exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedIndex {
    pub index: Index,
    pub cause: String,
}

/// What a run discovered, fetched, and left out.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    /// Product label, e.g. `OKX/NYC/CLI`.
    pub source: String,
    pub started_at: DateTime<Utc>,
    /// Upper bound `N` reported by discovery.
    pub discovered: u32,
    pub dispatched: usize,
    pub succeeded: usize,
    /// Indices retrieved without a payload.
    pub missing: Vec<Index>,
    /// Indices that exhausted their retries.
    pub failed: Vec<FailedIndex>,
    /// Dispatched indices with no outcome at all (worker panic or abort).
    pub absent: Vec<Index>,
    /// Total bytes of successful payloads.
    pub payload_bytes: usize,
    pub elapsed_ms: u64,
    /// SHA-256 of the artifact text, hex encoded.
    pub artifact_sha256: String,
    /// Why the run stopped early, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<String>,
}

impl RunSummary {
    pub(crate) fn new(
        run_id: RunId,
        source: String,
        started_at: DateTime<Utc>,
        discovered: u32,
    ) -> Self {
        Self {
            run_id,
            source,
            started_at,
            discovered,
            dispatched: 0,
            succeeded: 0,
            missing: Vec::new(),
            failed: Vec::new(),
            absent: Vec::new(),
            payload_bytes: 0,
            elapsed_ms: 0,
            artifact_sha256: compute_hash(""),
            interrupted: None,
        }
    }

    /// Fill in counts and gap lists from the finished run.
    pub(crate) fn record(&mut self, results: &FetchResults, pool: &PoolReport, artifact: &Artifact) {
        self.dispatched = pool.dispatched.len();

        for (index, outcome) in results.iter() {
            match outcome {
                FetchOutcome::Success(text) => {
                    self.succeeded += 1;
                    self.payload_bytes += text.len();
                }
                FetchOutcome::Missing => self.missing.push(index),
                FetchOutcome::Failed(cause) => self.failed.push(FailedIndex {
                    index,
                    cause: cause.clone(),
                }),
            }
        }

        self.absent = pool.absent();
        self.artifact_sha256 = compute_hash(artifact.as_str());
    }

    /// Whether every discovered index produced a document.
    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none() && self.succeeded as u64 == u64::from(self.discovered)
    }
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
