//! Layout of the forecast office product pages.
//!
//! A product page wraps the bulletin in `<pre class="glossaryProduct">` and
//! lists every published version as links inside a `<div>` labelled
//! `Versions:`, oldest-numbered last.

use std::sync::LazyLock;

use harvester_shared::{HarvestError, Result};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::PageLayout;

/// Default payload container.
const PAYLOAD_SELECTOR: &str = "pre.glossaryProduct";

/// Default visible label of the version block.
const VERSION_LABEL: &str = "Versions:";

static DIV_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").expect("div selector"));

static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("a selector"));

/// Layout adapter for product pages.
#[derive(Debug, Clone)]
pub struct ProductPageLayout {
    payload: Selector,
    version_label: String,
}

impl ProductPageLayout {
    /// Create an adapter with a custom payload selector and version label.
    pub fn new(payload_selector: &str, version_label: impl Into<String>) -> Result<Self> {
        let payload = Selector::parse(payload_selector).map_err(|e| {
            HarvestError::config(format!("invalid payload selector '{payload_selector}': {e}"))
        })?;
        Ok(Self {
            payload,
            version_label: version_label.into(),
        })
    }

    /// The innermost labelled `<div>` that holds version links.
    ///
    /// The label may sit in a child of its own with the links as siblings,
    /// so a labelled div without links falls back to its labelled ancestors.
    fn version_block<'a>(&self, doc: &'a Html) -> Result<ElementRef<'a>> {
        let labelled: Vec<ElementRef<'a>> = doc
            .select(&DIV_SEL)
            .filter(|div| self.has_label(div))
            .collect();
        if labelled.is_empty() {
            return Err(HarvestError::parse(format!(
                "no block labelled '{}'",
                self.version_label
            )));
        }

        labelled
            .iter()
            .copied()
            .filter(|div| has_links(div))
            .find(|div| {
                !div.select(&DIV_SEL)
                    .any(|inner| self.has_label(&inner) && has_links(&inner))
            })
            .ok_or_else(|| HarvestError::parse("version block contains no links"))
    }

    fn has_label(&self, el: &ElementRef<'_>) -> bool {
        el.text().collect::<String>().contains(&self.version_label)
    }
}

fn has_links(el: &ElementRef<'_>) -> bool {
    el.select(&LINK_SEL).next().is_some()
}

impl Default for ProductPageLayout {
    fn default() -> Self {
        Self {
            payload: Selector::parse(PAYLOAD_SELECTOR).expect("payload selector"),
            version_label: VERSION_LABEL.to_string(),
        }
    }
}

impl PageLayout for ProductPageLayout {
    fn extract_payload(&self, body: &str) -> Option<String> {
        let doc = Html::parse_document(body);
        let text = doc
            .select(&self.payload)
            .next()?
            .text()
            .collect::<String>();
        let trimmed = text.trim();

        if trimmed.is_empty() {
            debug!("payload container is empty");
            return None;
        }
        Some(trimmed.to_string())
    }

    fn extract_version_count(&self, body: &str) -> Result<u32> {
        let doc = Html::parse_document(body);

        let block = self.version_block(&doc)?;
        let last = block
            .select(&LINK_SEL)
            .last()
            .ok_or_else(|| HarvestError::parse("version block contains no links"))?;

        let text = last.text().collect::<String>();
        let text = text.trim();
        text.parse::<u32>()
            .map_err(|e| HarvestError::parse(format!("invalid version number '{text}': {e}")))
    }

    fn name(&self) -> &str {
        "product-page"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(versions: &str, payload: &str) -> String {
        format!(
            r#"<html><body>
            <div id="content">
                <div class="versions">Versions: {versions}</div>
                <pre class="glossaryProduct">{payload}</pre>
            </div>
            </body></html>"#
        )
    }

    #[test]
    fn extracts_trimmed_payload() {
        let layout = ProductPageLayout::default();
        let body = page("", "\n\n  CLIMATE REPORT\n  MAXIMUM 84  \n\n");
        assert_eq!(
            layout.extract_payload(&body).as_deref(),
            Some("CLIMATE REPORT\n  MAXIMUM 84")
        );
    }

    #[test]
    fn missing_payload_is_none() {
        let layout = ProductPageLayout::default();
        let body = "<html><body><pre>plain pre without class</pre></body></html>";
        assert!(layout.extract_payload(body).is_none());
    }

    #[test]
    fn blank_payload_is_none() {
        let layout = ProductPageLayout::default();
        assert!(layout.extract_payload(&page("", "   \n ")).is_none());
    }

    #[test]
    fn version_count_is_last_link() {
        let layout = ProductPageLayout::default();
        let body = page(
            r#"<a href="?version=1">1</a> <a href="?version=2">2</a> <a href="?version=48">48</a>"#,
            "x",
        );
        assert_eq!(layout.extract_version_count(&body).unwrap(), 48);
    }

    #[test]
    fn version_count_ignores_links_outside_block() {
        let layout = ProductPageLayout::default();
        let body = r##"<html><body><div id="wrap">
            <a href="/home">Home</a>
            <div>Versions: <a href="#">1</a> <a href="#">2</a></div>
            <a href="/about">About</a>
        </div></body></html>"##;
        assert_eq!(layout.extract_version_count(body).unwrap(), 2);
    }

    #[test]
    fn version_count_label_in_own_div() {
        let layout = ProductPageLayout::default();
        let body = r#"<html><body><div id="localcontent">
            <div class="label">Versions:</div>
            <a href="?version=1">1</a> <a href="?version=2">2</a> <a href="?version=3">3</a>
        </div></body></html>"#;
        assert_eq!(layout.extract_version_count(body).unwrap(), 3);
    }

    #[test]
    fn version_count_prefers_innermost_block_with_links() {
        let layout = ProductPageLayout::default();
        let body = r#"<html><body><div id="page">
            <a href="/home">Home</a>
            <div>Versions: <a href="?version=1">1</a> <a href="?version=9">9</a></div>
        </div></body></html>"#;
        assert_eq!(layout.extract_version_count(body).unwrap(), 9);
    }

    #[test]
    fn version_count_missing_marker() {
        let layout = ProductPageLayout::default();
        let err = layout
            .extract_version_count("<html><body><div>nothing</div></body></html>")
            .unwrap_err();
        assert!(err.to_string().contains("Versions:"));
    }

    #[test]
    fn version_count_without_links() {
        let layout = ProductPageLayout::default();
        assert!(layout.extract_version_count(&page("none yet", "x")).is_err());
    }

    #[test]
    fn version_count_rejects_non_numeric() {
        let layout = ProductPageLayout::default();
        let body = page(r##"<a href="#">1</a> <a href="#">latest</a>"##, "x");
        let err = layout.extract_version_count(&body).unwrap_err();
        assert!(err.to_string().contains("latest"));
    }

    #[test]
    fn custom_selector_and_label() {
        let layout = ProductPageLayout::new("div.bulletin", "Issues:").unwrap();
        let body = r#"<div class="bulletin"> hello </div><div>Issues: <a>7</a></div>"#;
        assert_eq!(layout.extract_payload(body).as_deref(), Some("hello"));
        assert_eq!(layout.extract_version_count(body).unwrap(), 7);
    }

    #[test]
    fn invalid_selector_is_config_error() {
        assert!(ProductPageLayout::new("pre[", "Versions:").is_err());
    }
}
