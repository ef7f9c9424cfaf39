//! Index range discovery.
//!
//! Before any document is fetched, the harvester reads the first version of
//! a product once and learns from its version list how many versions exist.
//! Discovery makes a single attempt and never retries.

use std::sync::Arc;

use harvester_fetcher::Transport;
use harvester_layout::PageLayout;
use harvester_shared::{HarvestError, ProductSource, Result};
use tracing::{error, info, instrument};

/// Learns the inclusive upper bound `N` of valid indices for a product.
pub struct RangeDiscoverer {
    transport: Arc<dyn Transport>,
    layout: Arc<dyn PageLayout>,
}

impl RangeDiscoverer {
    pub fn new(transport: Arc<dyn Transport>, layout: Arc<dyn PageLayout>) -> Self {
        Self { transport, layout }
    }

    /// Perform exactly one retrieval of the discovery URL and return `N`.
    ///
    /// Transport failures, a missing version block, and an unparsable last
    /// entry all surface as [`HarvestError::DiscoveryFailed`].
    #[instrument(skip_all, fields(source = %source.label()))]
    pub async fn discover(&self, source: &ProductSource) -> Result<u32> {
        let url = source.discovery_url();
        info!(%url, layout = self.layout.name(), "discovering version count");

        let body = self.transport.get(&url).await.map_err(|e| {
            error!(%url, error = %e, "failed to fetch total versions");
            HarvestError::discovery(url.as_str(), e.to_string())
        })?;

        let count = self.layout.extract_version_count(&body).map_err(|e| {
            error!(%url, error = %e, "could not find version information");
            HarvestError::discovery(url.as_str(), e.to_string())
        })?;

        info!(total_versions = count, "version count discovered");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use harvester_fetcher::HttpTransport;
    use harvester_layout::ProductPageLayout;
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> ProductSource {
        ProductSource::new(
            Url::parse(&format!("{}/product.php", server.uri())).unwrap(),
            "OKX",
            "NYC",
            "CLI",
        )
    }

    fn discoverer() -> RangeDiscoverer {
        RangeDiscoverer::new(
            Arc::new(HttpTransport::new(Duration::from_secs(5)).unwrap()),
            Arc::new(ProductPageLayout::default()),
        )
    }

    const VERSION_PAGE: &str = r#"<html><body>
        <div id="versions">Versions: <a href="?version=1">1</a> <a href="?version=2">2</a>
        <a href="?version=3">3</a></div>
        <pre class="glossaryProduct">CLIMATE SUMMARY</pre>
    </body></html>"#;

    #[tokio::test]
    async fn discovers_count_from_first_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/product.php"))
            .and(query_param("version", "1"))
            .and(query_param("site", "OKX"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VERSION_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let n = discoverer().discover(&source(&server)).await.unwrap();
        assert_eq!(n, 3);
    }

    #[tokio::test]
    async fn transport_failure_is_discovery_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let err = discoverer().discover(&source(&server)).await.unwrap_err();
        assert!(matches!(err, HarvestError::DiscoveryFailed { .. }));
    }

    #[tokio::test]
    async fn missing_marker_is_discovery_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body><div>hi</div></body></html>"),
            )
            .mount(&server)
            .await;

        let err = discoverer().discover(&source(&server)).await.unwrap_err();
        match err {
            HarvestError::DiscoveryFailed { reason, .. } => assert!(reason.contains("Versions:")),
            other => panic!("expected DiscoveryFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparsable_number_is_discovery_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r##"<div>Versions: <a href="#">1</a> <a href="#">next</a></div>"##,
            ))
            .mount(&server)
            .await;

        let err = discoverer().discover(&source(&server)).await.unwrap_err();
        assert!(matches!(err, HarvestError::DiscoveryFailed { .. }));
    }

    /// Always fails and counts calls.
    struct DownTransport(AtomicU32);

    #[async_trait]
    impl Transport for DownTransport {
        async fn get(&self, _url: &Url) -> Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(HarvestError::Network("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn discovery_does_not_retry() {
        let transport = Arc::new(DownTransport(AtomicU32::new(0)));
        let discoverer =
            RangeDiscoverer::new(transport.clone(), Arc::new(ProductPageLayout::default()));
        let source = ProductSource::new(
            Url::parse("https://forecast.example.com/product.php").unwrap(),
            "OKX",
            "NYC",
            "CLI",
        );

        assert!(discoverer.discover(&source).await.is_err());
        assert_eq!(transport.0.load(Ordering::SeqCst), 1);
    }
}
