//! Reassembles fetched documents into one ordered artifact.
//!
//! Only `Success` outcomes are emitted. Gaps are left silent: a missing or
//! failed index simply has no block. Each block is tagged with its index:
//!
//! ```text
//! <version_1>
//! ...payload...
//! </version_1>
//!
//! <version_3>
//! ...payload...
//! </version_3>
//! ```

use harvester_shared::{FetchResults, Index};

/// Formatting options for the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Block tag prefix.
    pub tag: String,
    /// Outer container tag; `None` leaves the blocks unwrapped.
    pub wrap: Option<String>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            tag: "version".into(),
            wrap: None,
        }
    }
}

/// The ordered, delimited concatenation of all successful documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    text: String,
    indices: Vec<Index>,
}

impl Artifact {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Indices that have a block, ascending.
    pub fn indices(&self) -> &[Index] {
        &self.indices
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The text enclosed in an `outer` container. Empty stays empty.
    pub fn wrapped(&self, outer: &str) -> String {
        if self.is_empty() {
            return String::new();
        }
        enclose(outer, &self.text)
    }
}

fn enclose(outer: &str, body: &str) -> String {
    format!("<{outer}>\n\n{body}\n\n</{outer}>")
}

/// Turns a result set into an [`Artifact`].
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    options: AggregateOptions,
}

impl ResultAggregator {
    pub fn new(options: AggregateOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AggregateOptions {
        &self.options
    }

    /// Build the artifact. Deterministic for a given result set.
    pub fn aggregate(&self, results: &FetchResults) -> Artifact {
        let tag = &self.options.tag;
        let (indices, blocks): (Vec<Index>, Vec<String>) = results
            .successes()
            .map(|(index, text)| (index, format!("<{tag}_{index}>\n{text}\n</{tag}_{index}>")))
            .unzip();

        if blocks.is_empty() {
            return Artifact::default();
        }

        let joined = blocks.join("\n\n");
        let text = match &self.options.wrap {
            Some(outer) => enclose(outer, &joined),
            None => joined,
        };

        Artifact { text, indices }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvester_shared::FetchOutcome;

    fn idx(n: u32) -> Index {
        Index::new(n).unwrap()
    }

    fn scenario_a() -> FetchResults {
        // Recorded in completion order, not index order.
        [
            (idx(3), FetchOutcome::Success("gamma".into())),
            (idx(2), FetchOutcome::Missing),
            (idx(1), FetchOutcome::Success("alpha".into())),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn blocks_in_ascending_order_without_gaps() {
        let artifact = ResultAggregator::default().aggregate(&scenario_a());
        assert_eq!(
            artifact.as_str(),
            "<version_1>\nalpha\n</version_1>\n\n<version_3>\ngamma\n</version_3>"
        );
        assert_eq!(artifact.indices(), &[idx(1), idx(3)]);
    }

    #[test]
    fn failed_outcomes_are_excluded() {
        let results: FetchResults = [
            (idx(1), FetchOutcome::Failed("HTTP 502".into())),
            (idx(2), FetchOutcome::Success("beta".into())),
        ]
        .into_iter()
        .collect();

        let artifact = ResultAggregator::default().aggregate(&results);
        assert!(!artifact.as_str().contains("version_1"));
        assert!(!artifact.as_str().contains("HTTP 502"));
        assert_eq!(artifact.indices(), &[idx(2)]);
    }

    #[test]
    fn empty_results_give_empty_artifact() {
        let artifact = ResultAggregator::default().aggregate(&FetchResults::new());
        assert!(artifact.is_empty());
        assert_eq!(artifact.as_str(), "");
    }

    #[test]
    fn wrap_stays_empty_without_documents() {
        let aggregator = ResultAggregator::new(AggregateOptions {
            wrap: Some("clip".into()),
            ..AggregateOptions::default()
        });
        let results: FetchResults = [(idx(1), FetchOutcome::Missing)].into_iter().collect();
        assert!(aggregator.aggregate(&results).is_empty());
    }

    #[test]
    fn wrap_encloses_joined_blocks() {
        let aggregator = ResultAggregator::new(AggregateOptions {
            tag: "version".into(),
            wrap: Some("clip".into()),
        });
        let artifact = aggregator.aggregate(&scenario_a());
        assert_eq!(
            artifact.as_str(),
            "<clip>\n\n<version_1>\nalpha\n</version_1>\n\n<version_3>\ngamma\n</version_3>\n\n</clip>"
        );
    }

    #[test]
    fn wrapped_copy_matches_wrapped_aggregation() {
        let plain = ResultAggregator::default().aggregate(&scenario_a());
        let wrapped = ResultAggregator::new(AggregateOptions {
            wrap: Some("clip".into()),
            ..AggregateOptions::default()
        })
        .aggregate(&scenario_a());

        assert_eq!(plain.wrapped("clip"), wrapped.as_str());
        assert_eq!(Artifact::default().wrapped("clip"), "");
    }

    #[test]
    fn custom_tag() {
        let aggregator = ResultAggregator::new(AggregateOptions {
            tag: "issue".into(),
            wrap: None,
        });
        let results: FetchResults = [(idx(10), FetchOutcome::Success("x".into()))]
            .into_iter()
            .collect();
        assert_eq!(aggregator.aggregate(&results).as_str(), "<issue_10>\nx\n</issue_10>");
    }

    #[test]
    fn reaggregation_is_byte_identical() {
        let aggregator = ResultAggregator::default();
        let results = scenario_a();
        assert_eq!(aggregator.aggregate(&results), aggregator.aggregate(&results));
    }

    #[test]
    fn numeric_not_lexicographic_order() {
        let results: FetchResults = [
            (idx(10), FetchOutcome::Success("ten".into())),
            (idx(9), FetchOutcome::Success("nine".into())),
        ]
        .into_iter()
        .collect();

        let artifact = ResultAggregator::default().aggregate(&results);
        let nine = artifact.as_str().find("nine").unwrap();
        let ten = artifact.as_str().find("ten").unwrap();
        assert!(nine < ten);
    }
}
