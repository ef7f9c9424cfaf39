//! End-to-end harvest: discovery → worker pool → aggregation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use harvester_discovery::RangeDiscoverer;
use harvester_fetcher::{DocumentFetcher, Fetch, HttpTransport, Transport, backoff_from_config};
use harvester_layout::{PageLayout, ProductPageLayout};
use harvester_shared::{
    FetchOutcome, FetchResults, HarvestConfig, HarvestError, Index, ProductSource, Result, RunId,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::aggregator::{AggregateOptions, Artifact, ResultAggregator};
use crate::pool::{PoolReport, WorkerPool};
use crate::summary::RunSummary;

/// Progress callback for reporting harvest status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once the index range is known.
    fn discovered(&self, total: u32);
    /// Called as each index completes, in completion order.
    fn document_completed(&self, index: Index, outcome: &FetchOutcome, completed: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn discovered(&self, _total: u32) {}
    fn document_completed(
        &self,
        _index: Index,
        _outcome: &FetchOutcome,
        _completed: usize,
        _total: usize,
    ) {
    }
    fn done(&self, _summary: &RunSummary) {}
}

/// Result of one harvest run.
#[derive(Debug)]
pub struct HarvestOutput {
    pub artifact: Artifact,
    pub results: FetchResults,
    pub summary: RunSummary,
}

/// One product's discovery, fetcher, pool, and aggregator, wired together.
pub struct Harvester {
    source: ProductSource,
    discoverer: RangeDiscoverer,
    fetcher: Arc<dyn Fetch>,
    pool: WorkerPool,
    aggregator: ResultAggregator,
    deadline: Option<Duration>,
}

impl Harvester {
    /// Assemble a harvester from explicit parts.
    pub fn new(
        source: ProductSource,
        discoverer: RangeDiscoverer,
        fetcher: Arc<dyn Fetch>,
        pool: WorkerPool,
        aggregator: ResultAggregator,
    ) -> Self {
        Self {
            source,
            discoverer,
            fetcher,
            pool,
            aggregator,
            deadline: None,
        }
    }

    /// Build the HTTP-backed harvester described by `config`.
    pub fn from_config(source: ProductSource, config: &HarvestConfig) -> Result<Self> {
        config.validate()?;

        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.timeout)?);
        let layout: Arc<dyn PageLayout> = Arc::new(ProductPageLayout::default());

        let discoverer = RangeDiscoverer::new(transport.clone(), layout.clone());
        let fetcher = DocumentFetcher::new(source.clone(), transport, layout)
            .with_backoff(Arc::from(backoff_from_config(config)));

        let pool = match config.workers {
            Some(n) => WorkerPool::new(n),
            None => WorkerPool::auto(),
        };

        let aggregator = ResultAggregator::new(AggregateOptions {
            tag: config.tag.clone(),
            wrap: config.wrap.clone(),
        });

        Ok(Self::new(source, discoverer, Arc::new(fetcher), pool, aggregator)
            .with_deadline(config.deadline))
    }

    /// Bound the whole run, discovery included.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn source(&self) -> &ProductSource {
        &self.source
    }

    pub fn pool(&self) -> WorkerPool {
        self.pool
    }

    /// Run the full harvest.
    ///
    /// 1. Discovery: learn `N` (fatal on failure)
    /// 2. Dispatch indices `1..=N` across the pool
    /// 3. Drain outcomes into a result set
    /// 4. Aggregate successes into the artifact
    ///
    /// Cancellation or the deadline during the fetch phase stops the run
    /// early but still aggregates what was collected; the summary's
    /// `interrupted` field says why.
    #[instrument(skip_all, fields(source = %self.source.label()))]
    pub async fn run(
        &self,
        cancel: CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<HarvestOutput> {
        let start = Instant::now();
        let deadline = self.deadline.map(|d| start + d);
        let run_id = RunId::new();

        info!(%run_id, workers = self.pool.workers(), "starting harvest");

        // --- Phase 1: Discovery ---
        progress.phase("Discovering versions");
        let total = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(HarvestError::Cancelled("cancelled during discovery".into()));
            }
            _ = deadline_reached(deadline) => {
                return Err(HarvestError::Cancelled("deadline exceeded during discovery".into()));
            }
            total = self.discoverer.discover(&self.source) => total?,
        };
        progress.discovered(total);

        let mut summary = RunSummary::new(run_id, self.source.label(), Utc::now(), total);
        let mut results = FetchResults::new();
        let mut pool_report = PoolReport::default();

        // --- Phase 2: Fetch ---
        if total == 0 {
            warn!("no versions discovered, nothing to fetch");
        } else {
            info!(total_versions = total, "fetching versions");
            progress.phase("Downloading reports");

            let pool_cancel = cancel.child_token();
            let mut run = self
                .pool
                .run(Index::range(total), self.fetcher.clone(), pool_cancel.clone());
            let expected = total as usize;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled(), if summary.interrupted.is_none() => {
                        warn!(collected = results.len(), "harvest cancelled");
                        summary.interrupted = Some("cancelled".into());
                        pool_cancel.cancel();
                    }
                    _ = deadline_reached(deadline), if summary.interrupted.is_none() => {
                        warn!(collected = results.len(), "harvest deadline exceeded");
                        summary.interrupted = Some("deadline exceeded".into());
                        pool_cancel.cancel();
                    }
                    next = run.next() => {
                        let Some((index, outcome)) = next else { break };
                        progress.document_completed(index, &outcome, results.len() + 1, expected);
                        debug!(%index, success = outcome.is_success(), "outcome collected");
                        if let Err(e) = results.record(index, outcome) {
                            error!(error = %e, "dropping duplicate outcome");
                        }
                    }
                }
            }

            pool_report = run.finish().await;
        }

        // --- Phase 3: Aggregate ---
        progress.phase("Assembling artifact");
        let artifact = self.aggregator.aggregate(&results);

        summary.record(&results, &pool_report, &artifact);
        summary.elapsed_ms = start.elapsed().as_millis() as u64;

        progress.done(&summary);

        info!(
            %run_id,
            discovered = summary.discovered,
            succeeded = summary.succeeded,
            missing = summary.missing.len(),
            failed = summary.failed.len(),
            absent = summary.absent.len(),
            elapsed_ms = summary.elapsed_ms,
            "harvest complete"
        );

        Ok(HarvestOutput {
            artifact,
            results,
            summary,
        })
    }
}

/// Resolves at `deadline`; never resolves without one.
async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
