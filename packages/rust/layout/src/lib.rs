//! Page layout adapters.
//!
//! The fetch, retry, and aggregation logic never touches markup directly.
//! Everything it needs from a page goes through [`PageLayout`]:
//! - [`PageLayout::extract_payload`]: the document text, if the page carries one
//! - [`PageLayout::extract_version_count`]: the highest version listed on the page
//!
//! [`ProductPageLayout`] implements both for the product pages of the
//! forecast office site (`<pre class="glossaryProduct">` plus a
//! `Versions:` link block).

mod product;

use harvester_shared::Result;

pub use product::ProductPageLayout;

/// Extracts the pieces of a page the harvester cares about.
pub trait PageLayout: Send + Sync {
    /// Trimmed payload text, or `None` when the page holds no document.
    fn extract_payload(&self, body: &str) -> Option<String>;

    /// The numeric value of the last link in the version list.
    ///
    /// Errors when the list is absent or its last entry is not a number.
    fn extract_version_count(&self, body: &str) -> Result<u32>;

    /// Short identifier for logging.
    fn name(&self) -> &str;
}
