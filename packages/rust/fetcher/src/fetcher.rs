//! Fetch-with-retry for a single index.

use std::sync::Arc;

use async_trait::async_trait;
use harvester_layout::PageLayout;
use harvester_shared::{FetchOutcome, Index, ProductSource};
use tracing::{debug, error, instrument, warn};

use crate::backoff::{Backoff, FixedDelay};
use crate::transport::Transport;

/// Anything the worker pool can run once per index.
///
/// Implementations classify every expected failure into the returned
/// outcome; they do not return errors.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, index: Index) -> FetchOutcome;
}

/// Retrieves one versioned document and extracts its payload.
pub struct DocumentFetcher {
    source: ProductSource,
    transport: Arc<dyn Transport>,
    layout: Arc<dyn PageLayout>,
    backoff: Arc<dyn Backoff>,
}

impl DocumentFetcher {
    /// Create a fetcher using the default fixed-delay policy (3 attempts, 2 s).
    pub fn new(
        source: ProductSource,
        transport: Arc<dyn Transport>,
        layout: Arc<dyn PageLayout>,
    ) -> Self {
        Self {
            source,
            transport,
            layout,
            backoff: Arc::new(FixedDelay::default()),
        }
    }

    /// Replace the retry policy.
    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn source(&self) -> &ProductSource {
        &self.source
    }
}

#[async_trait]
impl Fetch for DocumentFetcher {
    #[instrument(skip_all, fields(source = %self.source.label(), index = %index))]
    async fn fetch(&self, index: Index) -> FetchOutcome {
        let url = self.source.document_url(index);
        let max_attempts = self.backoff.max_attempts();
        let mut attempt = 1;

        loop {
            match self.transport.get(&url).await {
                Ok(body) => {
                    // Absence of a payload is final, not transient.
                    return match self.layout.extract_payload(&body) {
                        Some(text) => {
                            debug!(attempt, bytes = text.len(), "document fetched");
                            FetchOutcome::Success(text)
                        }
                        None => {
                            warn!(%index, "no data found for version");
                            FetchOutcome::Missing
                        }
                    };
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        %index,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "fetch attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        %index,
                        attempts = attempt,
                        error = %e,
                        "failed to fetch version after all attempts"
                    );
                    return FetchOutcome::Failed(e.to_string());
                }
            }
        }
    }
}
