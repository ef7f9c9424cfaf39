//! Bounded-concurrency worker pool.
//!
//! [`WorkerPool::run`] dispatches one [`Fetch`] call per distinct index,
//! never more than `workers` at a time, and streams `(Index, FetchOutcome)`
//! pairs back in completion order. Ordering is left to the aggregator.
//!
//! A panic inside a fetch is caught at the task boundary, logged, and the
//! index simply produces no outcome. It is reported in [`PoolReport::panicked`].

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use harvester_fetcher::Fetch;
use harvester_shared::{FetchOutcome, Index, MAX_WORKERS};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Worker count used when host parallelism is unknown.
pub const FALLBACK_WORKERS: usize = 5;

/// Workers per available core; fetches are I/O bound.
const WORKERS_PER_CORE: usize = 5;

/// Worker count for a host with `parallelism` cores.
pub fn worker_count_for(parallelism: Option<usize>) -> usize {
    match parallelism {
        Some(cores) => cores.saturating_mul(WORKERS_PER_CORE).clamp(1, MAX_WORKERS),
        None => FALLBACK_WORKERS,
    }
}

/// Worker count derived from this host's available parallelism.
pub fn auto_worker_count() -> usize {
    worker_count_for(std::thread::available_parallelism().ok().map(|n| n.get()))
}

// ---------------------------------------------------------------------------
// PoolReport
// ---------------------------------------------------------------------------

/// What the pool did with the indices it was given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Indices handed to a worker, ascending.
    pub dispatched: Vec<Index>,
    /// Indices whose fetch returned an outcome.
    pub completed: BTreeSet<Index>,
    /// Indices whose fetch panicked.
    pub panicked: BTreeSet<Index>,
}

impl PoolReport {
    /// Dispatched indices that produced no outcome (panicked or aborted).
    pub fn absent(&self) -> Vec<Index> {
        self.dispatched
            .iter()
            .copied()
            .filter(|i| !self.completed.contains(i))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PoolRun
// ---------------------------------------------------------------------------

/// A running dispatch. Drain outcomes with [`PoolRun::next`], then call
/// [`PoolRun::finish`] for the dispatch report.
pub struct PoolRun {
    outcomes: mpsc::Receiver<(Index, FetchOutcome)>,
    supervisor: JoinHandle<PoolReport>,
}

impl PoolRun {
    /// Next completed outcome, or `None` once every worker has finished.
    pub async fn next(&mut self) -> Option<(Index, FetchOutcome)> {
        self.outcomes.recv().await
    }

    /// Wait for the supervisor and return what was dispatched.
    ///
    /// Outcomes not yet drained are discarded.
    pub async fn finish(self) -> PoolReport {
        drop(self.outcomes);
        match self.supervisor.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "pool supervisor failed");
                PoolReport::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

/// Runs fetches with at most `workers` in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// Pool with an explicit worker count, clamped to `1..=MAX_WORKERS`.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.clamp(1, MAX_WORKERS),
        }
    }

    /// Pool sized from host parallelism.
    pub fn auto() -> Self {
        Self::new(auto_worker_count())
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Dispatch one fetch per distinct index.
    ///
    /// Cancelling `cancel` stops further dispatch and aborts in-flight fetches.
    /// Must be called within a tokio runtime.
    pub fn run<I>(&self, indices: I, fetcher: Arc<dyn Fetch>, cancel: CancellationToken) -> PoolRun
    where
        I: IntoIterator<Item = Index>,
    {
        let indices: BTreeSet<Index> = indices.into_iter().collect();
        // Room for every outcome, so a finished fetch never waits on the
        // receiver and cannot be lost to an abort.
        let (tx, rx) = mpsc::channel(indices.len().max(1));
        let semaphore = Arc::new(Semaphore::new(self.workers));

        info!(
            workers = self.workers,
            total = indices.len(),
            "using workers for fetching versions"
        );

        let supervisor = tokio::spawn(supervise(indices, fetcher, semaphore, tx, cancel));

        PoolRun {
            outcomes: rx,
            supervisor,
        }
    }
}

/// Outcome of one worker task, as seen by the supervisor.
enum TaskEnd {
    Completed(Index),
    Panicked(Index),
}

async fn supervise(
    indices: BTreeSet<Index>,
    fetcher: Arc<dyn Fetch>,
    semaphore: Arc<Semaphore>,
    tx: mpsc::Sender<(Index, FetchOutcome)>,
    cancel: CancellationToken,
) -> PoolReport {
    let mut report = PoolReport::default();
    let mut tasks = JoinSet::new();

    for index in indices {
        // Acquire before spawning so only `workers` tasks ever exist at once.
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(next = %index, "dispatch cancelled");
                break;
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        report.dispatched.push(index);
        let fetcher = fetcher.clone();
        let tx = tx.clone();

        tasks.spawn(async move {
            let result = AssertUnwindSafe(fetcher.fetch(index)).catch_unwind().await;
            drop(permit);

            match result {
                Ok(outcome) => {
                    // Capacity covers every index; only a closed receiver fails.
                    let _ = tx.try_send((index, outcome));
                    TaskEnd::Completed(index)
                }
                Err(payload) => {
                    error!(%index, panic = %panic_message(payload.as_ref()), "fetch task panicked");
                    TaskEnd::Panicked(index)
                }
            }
        });
    }
    drop(tx);

    let mut aborting = false;
    loop {
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled(), if !aborting => {
                aborting = true;
                warn!(in_flight = tasks.len(), "aborting in-flight fetches");
                tasks.abort_all();
                continue;
            }
            joined = tasks.join_next() => joined,
        };

        match joined {
            None => break,
            Some(Ok(TaskEnd::Completed(index))) => {
                report.completed.insert(index);
            }
            Some(Ok(TaskEnd::Panicked(index))) => {
                report.panicked.insert(index);
            }
            Some(Err(e)) if e.is_cancelled() => {}
            Some(Err(e)) => error!(error = %e, "worker task failed"),
        }
    }

    debug!(
        dispatched = report.dispatched.len(),
        completed = report.completed.len(),
        panicked = report.panicked.len(),
        "pool drained"
    );
    report
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
