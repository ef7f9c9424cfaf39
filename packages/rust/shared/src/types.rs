//! Core domain types for a harvest run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{HarvestError, Result};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one harvest run (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Position of one document in the remote sequence. Valid indices are `1..=N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Index(u32);

impl Index {
    /// The resource every discovery reads.
    pub const FIRST: Index = Index(1);

    /// Create an index, rejecting zero.
    pub fn new(value: u32) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    /// The raw numeric value.
    pub fn get(self) -> u32 {
        self.0
    }

    /// All indices in `1..=upper`. Empty when `upper` is zero.
    pub fn range(upper: u32) -> impl Iterator<Item = Index> + Clone {
        (1..=upper).map(Index)
    }
}

impl std::fmt::Display for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// FetchOutcome
// ---------------------------------------------------------------------------

/// Result of the complete fetch-with-retry sequence for one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// The payload was found; holds the trimmed text.
    Success(String),
    /// The page was retrieved but carried no payload block.
    Missing,
    /// Every attempt failed at the transport level; holds the last error.
    Failed(String),
}

impl FetchOutcome {
    /// Whether this outcome contributes a block to the artifact.
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }

    /// The payload text, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            FetchOutcome::Success(text) => Some(text),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// FetchResults
// ---------------------------------------------------------------------------

/// Outcomes keyed by index. Each index may be recorded exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResults {
    outcomes: BTreeMap<Index, FetchOutcome>,
}

impl FetchResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for `index`. A second outcome for the same index is rejected.
    pub fn record(&mut self, index: Index, outcome: FetchOutcome) -> Result<()> {
        if self.outcomes.contains_key(&index) {
            return Err(HarvestError::validation(format!(
                "duplicate outcome for index {index}"
            )));
        }
        self.outcomes.insert(index, outcome);
        Ok(())
    }

    pub fn get(&self, index: Index) -> Option<&FetchOutcome> {
        self.outcomes.get(&index)
    }

    pub fn contains(&self, index: Index) -> bool {
        self.outcomes.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Outcomes in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (Index, &FetchOutcome)> {
        self.outcomes.iter().map(|(i, o)| (*i, o))
    }

    /// Successful payloads in ascending index order.
    pub fn successes(&self) -> impl Iterator<Item = (Index, &str)> {
        self.iter().filter_map(|(i, o)| o.text().map(|t| (i, t)))
    }
}

impl FromIterator<(Index, FetchOutcome)> for FetchResults {
    /// Later duplicates are dropped; the first recorded outcome wins.
    fn from_iter<T: IntoIterator<Item = (Index, FetchOutcome)>>(iter: T) -> Self {
        let mut results = FetchResults::new();
        for (index, outcome) in iter {
            if let Err(e) = results.record(index, outcome) {
                tracing::warn!(%index, error = %e, "dropping duplicate outcome");
            }
        }
        results
    }
}

// ---------------------------------------------------------------------------
// ProductSource
// ---------------------------------------------------------------------------

/// One publisher/category pair whose versioned documents are harvested.
///
/// Document URLs are built by substituting the index into the `version`
/// query parameter of `base_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSource {
    /// Product endpoint, e.g. `https://forecast.weather.gov/product.php`.
    pub base_url: Url,
    /// Issuing site code (`OKX`).
    pub site: String,
    /// Issuing office (`NYC`).
    pub issued_by: String,
    /// Product category (`CLI`).
    pub product: String,
}

impl ProductSource {
    pub fn new(
        base_url: Url,
        site: impl Into<String>,
        issued_by: impl Into<String>,
        product: impl Into<String>,
    ) -> Self {
        Self {
            base_url,
            site: site.into(),
            issued_by: issued_by.into(),
            product: product.into(),
        }
    }

    /// URL of the document at `index`.
    pub fn document_url(&self, index: Index) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("site", &self.site)
            .append_pair("issuedby", &self.issued_by)
            .append_pair("product", &self.product)
            .append_pair("format", "TXT")
            .append_pair("version", &index.to_string())
            .append_pair("glossary", "0");
        url
    }

    /// URL read by discovery (the first version page lists all versions).
    pub fn discovery_url(&self) -> Url {
        self.document_url(Index::FIRST)
    }

    /// Short label for logs and summaries, e.g. `OKX/NYC/CLI`.
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.site, self.issued_by, self.product)
    }
}
