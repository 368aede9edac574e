// Re-export modules
pub mod config;
pub mod coordinator;
pub mod detail;
pub mod error;
pub mod fetcher;
pub mod listing;
pub mod parsers;
pub mod results;
pub mod store;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used types for convenience
pub use config::HarvestConfig;
pub use coordinator::{Coordinator, HarvestReport};
pub use error::{FetchError, HarvestError};
pub use listing::{ExhaustReason, WalkEnd};
pub use results::{ItemRecord, ListingEntry};

use fetcher::{Connector, WebDriverConnector};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Main builder for a harvest run
pub struct Harvest {
    base_url: Option<String>,
    config: Option<HarvestConfig>,
    max_pages: Option<u32>,
    detail_concurrency: Option<usize>,
    output_path: Option<PathBuf>,
    webdriver_url: Option<String>,
    headless: bool,
    cancel: CancellationToken,
}

impl Harvest {
    /// Create a new Harvest builder for the listing at `base_url`
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: Some(base_url.to_string()),
            ..Self::unconfigured()
        }
    }

    /// A builder whose base URL comes from a configuration file
    pub fn unconfigured() -> Self {
        Self {
            base_url: None,
            config: None,
            max_pages: None,
            detail_concurrency: None,
            output_path: None,
            webdriver_url: None,
            headless: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the maximum number of listing pages to walk
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Set how many detail pages are fetched at once
    pub fn with_detail_concurrency(mut self, concurrency: usize) -> Self {
        self.detail_concurrency = Some(concurrency);
        self
    }

    /// Set where the records are written
    pub fn with_output(mut self, path: impl AsRef<Path>) -> Self {
        self.output_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the WebDriver endpoint, overriding config and environment
    pub fn with_webdriver_url(mut self, url: &str) -> Self {
        self.webdriver_url = Some(url.to_string());
        self
    }

    /// Run the browser without a window
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Stop between pages and items once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set the configuration; explicit builder settings still win
    pub fn with_config(mut self, config: HarvestConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load configuration from a file
    pub fn with_config_file(self, path: impl AsRef<Path>) -> Result<Self, HarvestError> {
        let config = HarvestConfig::from_file(path)?;
        Ok(self.with_config(config))
    }

    /// Load configuration from a string
    pub fn with_config_str(self, config_str: &str) -> Result<Self, HarvestError> {
        let config = HarvestConfig::from_json(config_str)?;
        Ok(self.with_config(config))
    }

    /// The configuration the run will use, with every override applied
    pub fn resolve_config(&self) -> Result<HarvestConfig, HarvestError> {
        let mut config = match (&self.config, &self.base_url) {
            (Some(config), Some(base_url)) => HarvestConfig {
                base_url: base_url.clone(),
                ..config.clone()
            },
            (Some(config), None) => config.clone(),
            (None, Some(base_url)) => HarvestConfig::new(base_url),
            (None, None) => {
                return Err(HarvestError::Config(
                    "no base URL given and no configuration loaded".into(),
                ));
            }
        };

        if let Some(max_pages) = self.max_pages {
            config.max_pages = max_pages;
        }
        if let Some(concurrency) = self.detail_concurrency {
            config.detail_concurrency = concurrency;
        }
        if let Some(path) = &self.output_path {
            config.output_path = path.clone();
        }
        if self.headless {
            config.browser.headless = true;
        }

        // Override the WebDriver URL with an environment variable if provided
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                config.webdriver_url = webdriver_url;
            }
        }
        if let Some(url) = &self.webdriver_url {
            config.webdriver_url = url.clone();
        }

        Ok(config)
    }

    /// Run the harvest against a WebDriver server
    pub async fn run(self) -> Result<HarvestReport, HarvestError> {
        let config = self.resolve_config()?;
        let connector = WebDriverConnector::new(&config.webdriver_url, &config.browser);
        ::log::info!("Using WebDriver at {}", connector.webdriver_url());
        self.run_with(config, connector).await
    }

    async fn run_with<C: Connector>(
        self,
        config: HarvestConfig,
        connector: C,
    ) -> Result<HarvestReport, HarvestError> {
        Coordinator::new(config, connector)
            .with_cancellation(self.cancel)
            .run()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeoutConfig;
    use crate::testing::{MockConnector, MockSite, detail_html, listing_html};

    #[test]
    fn test_builder_overrides_config() {
        let harvest = Harvest::unconfigured()
            .with_config_str(r#"{"base_url": "https://catalog.test/", "max_pages": 9}"#)
            .unwrap()
            .with_max_pages(2)
            .with_detail_concurrency(3)
            .with_output("out/items.json")
            .with_webdriver_url("http://localhost:9999")
            .with_headless(true);

        let config = harvest.resolve_config().unwrap();
        assert_eq!(config.base_url, "https://catalog.test/");
        assert_eq!(config.max_pages, 2);
        assert_eq!(config.detail_concurrency, 3);
        assert_eq!(config.output_path, PathBuf::from("out/items.json"));
        assert_eq!(config.webdriver_url, "http://localhost:9999");
        assert!(config.browser.headless);
    }

    #[test]
    fn test_base_url_argument_wins_over_config() {
        let config = Harvest::new("https://catalog.test/b/")
            .with_config(HarvestConfig::new("https://catalog.test/a/"))
            .resolve_config()
            .unwrap();
        assert_eq!(config.base_url, "https://catalog.test/b/");
    }

    #[test]
    fn test_missing_base_url_is_config_error() {
        assert!(matches!(
            Harvest::unconfigured().resolve_config(),
            Err(HarvestError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_run_with_mock_browser() {
        let base = "https://catalog.test/topic/ai/";
        let site = MockSite::new();
        site.page(base, &listing_html(&[("rust", "Rust")], None));
        site.page(
            "https://catalog.test/course/rust/",
            &detail_html("7 students", "€9,99"),
        );

        let dir = tempfile::tempdir().unwrap();
        let mut config = HarvestConfig::new(base);
        config.timeouts = TimeoutConfig::instant();
        config.selectors.interstitial = None;
        config.output_path = dir.path().join("items.json");

        let report = Harvest::new(base)
            .run_with(config, MockConnector::new(site))
            .await
            .unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].current_price.as_deref(), Some("9.99"));
        assert_eq!(
            report.walk_end,
            WalkEnd::Exhausted(ExhaustReason::NoNextControl { page: 1 })
        );
    }
}
