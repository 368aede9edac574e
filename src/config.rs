use crate::error::HarvestError;
use crate::fetcher::Locator;
use crate::parsers::Query;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a harvest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// URL of the first listing page
    pub base_url: String,

    /// Maximum number of listing pages to walk
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Query parameter carrying the page number for pages 2 and up
    #[serde(default = "default_page_param")]
    pub page_param: String,

    /// Where the JSON array of records is written
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Number of detail pages fetched at once, each with its own session
    #[serde(default = "default_detail_concurrency")]
    pub detail_concurrency: usize,

    /// Rewrite the output file after this many new records
    #[serde(default)]
    pub checkpoint_every: Option<usize>,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub selectors: SelectorConfig,
}

/// Browser launch options sent as WebDriver capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub headless: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: Option<String>,

    /// Extra Chrome command-line switches
    #[serde(default = "default_browser_args")]
    pub args: Vec<String>,
}

/// Every wait in the pipeline, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_listing_ready_ms")]
    pub listing_ready_ms: u64,

    #[serde(default = "default_detail_ready_ms")]
    pub detail_ready_ms: u64,

    /// How long to look for the interstitial prompt before moving on
    #[serde(default = "default_interstitial_ms")]
    pub interstitial_ms: u64,

    /// How long each next-page strategy may take to produce a clickable control
    #[serde(default = "default_next_control_ms")]
    pub next_control_ms: u64,

    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,

    /// Pause after the listing readiness marker appears
    #[serde(default = "default_listing_settle_ms")]
    pub listing_settle_ms: u64,

    /// Pause after the detail readiness marker appears, for late content
    #[serde(default = "default_detail_settle_ms")]
    pub detail_settle_ms: u64,

    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,

    #[serde(default = "default_next_page_settle_ms")]
    pub next_page_settle_ms: u64,

    /// Extra loads of a detail page whose readiness marker never showed up
    #[serde(default)]
    pub readiness_retries: u32,
}

/// Structural queries for listing and detail pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub listing_container: String,
    pub listing_link: String,
    /// Subtree excluded from titles (screen-reader helper text)
    pub listing_title_hidden: String,
    /// Marker of a listing page that rendered with no results
    pub listing_no_results: Option<String>,

    /// Next-page strategies, tried in declaration order
    pub next_page: Vec<String>,

    /// The "open external application?" prompt's dismiss button
    pub interstitial: Option<Locator>,

    pub detail_ready: String,
    pub enrollment: String,
    pub language: String,
    /// Label removed from the language text
    pub language_label: String,
    pub rating: String,

    pub objectives_section: String,
    pub objectives_list: String,
    pub objectives_item: String,
    pub objectives_item_content: String,

    pub description_section: String,
    pub description_content: String,
    pub description_blocks: String,
    /// Boilerplate heading where the description is cut
    pub description_cutoff: String,

    pub requirements_title: String,
    pub requirements_list: String,
    pub requirements_item: String,

    pub price_container: String,
    pub current_price: String,
    pub original_price: String,
    pub discount: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            user_agent: default_user_agent(),
            args: default_browser_args(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            listing_ready_ms: default_listing_ready_ms(),
            detail_ready_ms: default_detail_ready_ms(),
            interstitial_ms: default_interstitial_ms(),
            next_control_ms: default_next_control_ms(),
            poll_ms: default_poll_ms(),
            listing_settle_ms: default_listing_settle_ms(),
            detail_settle_ms: default_detail_settle_ms(),
            scroll_settle_ms: default_scroll_settle_ms(),
            next_page_settle_ms: default_next_page_settle_ms(),
            readiness_retries: 0,
        }
    }
}

impl TimeoutConfig {
    pub fn listing_ready(&self) -> Duration {
        Duration::from_millis(self.listing_ready_ms)
    }

    pub fn detail_ready(&self) -> Duration {
        Duration::from_millis(self.detail_ready_ms)
    }

    pub fn interstitial(&self) -> Duration {
        Duration::from_millis(self.interstitial_ms)
    }

    pub fn next_control(&self) -> Duration {
        Duration::from_millis(self.next_control_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }

    pub fn listing_settle(&self) -> Duration {
        Duration::from_millis(self.listing_settle_ms)
    }

    pub fn detail_settle(&self) -> Duration {
        Duration::from_millis(self.detail_settle_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn next_page_settle(&self) -> Duration {
        Duration::from_millis(self.next_page_settle_ms)
    }

    /// Timeouts short enough for in-memory sessions
    #[cfg(test)]
    pub fn instant() -> Self {
        Self {
            listing_ready_ms: 40,
            detail_ready_ms: 40,
            interstitial_ms: 0,
            next_control_ms: 0,
            poll_ms: 5,
            listing_settle_ms: 0,
            detail_settle_ms: 0,
            scroll_settle_ms: 0,
            next_page_settle_ms: 0,
            readiness_retries: 0,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            listing_container: "div[data-purpose='container']".to_string(),
            listing_link: "h3[data-purpose='course-title-url'] a".to_string(),
            listing_title_hidden: ".ud-sr-only".to_string(),
            listing_no_results: None,
            next_page: vec![
                "a[aria-label='next page']".to_string(),
                "a[data-page='+1']".to_string(),
                "a[rel='next']".to_string(),
                "a[aria-label='Next page']".to_string(),
                "button[aria-label='Next page']".to_string(),
                "a[aria-label='Page suivante']".to_string(),
                "button[aria-label='Page suivante']".to_string(),
                "a[data-purpose='pagination-button-next']".to_string(),
                "button[data-purpose='pagination-button-next']".to_string(),
                "a.pagination_next__aBqfT".to_string(),
                "a:has(svg use[xlink\\:href='#icon-next'])".to_string(),
                "button:has(svg use[xlink\\:href='#icon-next'])".to_string(),
            ],
            interstitial: Some(Locator::XPath(
                "//button[text()='Annuler'] | //button[text()='Cancel']".to_string(),
            )),
            detail_ready: "div[data-purpose='enrollment']".to_string(),
            enrollment: "div[data-purpose='enrollment']".to_string(),
            language: "div[data-purpose='lead-course-locale']".to_string(),
            language_label: "Course Language".to_string(),
            rating: "span[data-purpose='rating-number']".to_string(),
            objectives_section: "div.what-you-will-learn--what-will-you-learn--jsm83".to_string(),
            objectives_list: "ul.ud-unstyled-list, ul.what-you-will-learn--objectives-list--qsvE2"
                .to_string(),
            objectives_item: "li".to_string(),
            objectives_item_content: "div.ud-block-list-item-content".to_string(),
            description_section: "div[data-purpose='course-description']".to_string(),
            description_content: "div[data-purpose='safely-set-inner-html:description:description']"
                .to_string(),
            description_blocks: "p, li, h1, h2, h3, h4, h5, h6".to_string(),
            description_cutoff: "Who this course is for:".to_string(),
            requirements_title: "h2[data-purpose='requirements-title']".to_string(),
            requirements_list: "ul.ud-unstyled-list".to_string(),
            requirements_item: "div.ud-block-list-item-content".to_string(),
            price_container: "div[data-purpose='price-text-container']".to_string(),
            current_price: "div[data-purpose='course-price-text']".to_string(),
            original_price: "div[data-purpose='course-old-price-text']".to_string(),
            discount: "div[data-purpose='discount-percentage']".to_string(),
        }
    }
}

impl SelectorConfig {
    /// Compiles the selectors that are only ever sent to the browser.
    ///
    /// The ones extracted with `scraper` are compiled by the listing walker
    /// and detail harvester themselves. XPath locators are left to the
    /// WebDriver.
    pub fn validate(&self) -> Result<(), HarvestError> {
        Query::parse_all(&self.next_page)?;
        Query::parse(&self.detail_ready)?;
        if let Some(css) = &self.listing_no_results {
            Query::parse(css)?;
        }
        if let Some(Locator::Css(css)) = &self.interstitial {
            Query::parse(css)?;
        }
        Ok(())
    }
}

impl HarvestConfig {
    /// Create a new configuration with default values
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            max_pages: default_max_pages(),
            page_param: default_page_param(),
            output_path: default_output_path(),
            webdriver_url: default_webdriver_url(),
            detail_concurrency: default_detail_concurrency(),
            checkpoint_every: None,
            browser: BrowserConfig::default(),
            timeouts: TimeoutConfig::default(),
            selectors: SelectorConfig::default(),
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, HarvestError> {
        let path = path.as_ref();
        let mut contents = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|e| HarvestError::Config(format!("cannot read {}: {}", path.display(), e)))?;

        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, HarvestError> {
        serde_json::from_str(json).map_err(|e| HarvestError::Config(e.to_string()))
    }

    /// Checks the values that cannot be expressed in the type
    pub fn validate(&self) -> Result<(), HarvestError> {
        let base = url::Url::parse(&self.base_url).map_err(|e| {
            HarvestError::Config(format!("base_url `{}` is not a URL: {}", self.base_url, e))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(HarvestError::Config(format!(
                "base_url `{}` must be http or https",
                self.base_url
            )));
        }
        if self.max_pages == 0 {
            return Err(HarvestError::Config("max_pages must be at least 1".into()));
        }
        if self.detail_concurrency == 0 {
            return Err(HarvestError::Config(
                "detail_concurrency must be at least 1".into(),
            ));
        }
        if self.checkpoint_every == Some(0) {
            return Err(HarvestError::Config(
                "checkpoint_every must be at least 1".into(),
            ));
        }
        self.selectors.validate()
    }
}

/// Default value for max_pages
fn default_max_pages() -> u32 {
    5
}

fn default_page_param() -> String {
    "p".to_string()
}

fn default_output_path() -> PathBuf {
    PathBuf::from("items.json")
}

/// Default value for webdriver_url
fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_detail_concurrency() -> usize {
    1
}

fn default_user_agent() -> Option<String> {
    Some(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
            .to_string(),
    )
}

fn default_browser_args() -> Vec<String> {
    [
        "--no-sandbox",
        "--disable-dev-shm-usage",
        "--start-maximized",
        "--disable-blink-features=AutomationControlled",
        "--disable-infobars",
        "--disable-extensions",
        "--log-level=3",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

fn default_listing_ready_ms() -> u64 {
    30_000
}

fn default_detail_ready_ms() -> u64 {
    20_000
}

fn default_interstitial_ms() -> u64 {
    5_000
}

fn default_next_control_ms() -> u64 {
    10_000
}

fn default_poll_ms() -> u64 {
    250
}

fn default_listing_settle_ms() -> u64 {
    2_000
}

fn default_detail_settle_ms() -> u64 {
    5_000
}

fn default_scroll_settle_ms() -> u64 {
    1_000
}

fn default_next_page_settle_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_json_uses_defaults() {
        let config = HarvestConfig::from_json(r#"{"base_url": "https://example.com/topic/ai/"}"#)
            .unwrap();
        assert_eq!(config.max_pages, 5);
        assert_eq!(config.page_param, "p");
        assert_eq!(config.webdriver_url, "http://localhost:4444");
        assert_eq!(config.detail_concurrency, 1);
        assert_eq!(config.timeouts.detail_ready(), Duration::from_secs(20));
        assert_eq!(config.selectors.next_page.len(), 12);
        assert!(config.browser.args.contains(&"--no-sandbox".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_nested_sections() {
        let config = HarvestConfig::from_json(
            r#"{
                "base_url": "https://example.com/topic/ai/",
                "max_pages": 2,
                "timeouts": {"detail_ready_ms": 500},
                "selectors": {"next_page": ["a.next"]}
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_pages, 2);
        assert_eq!(config.timeouts.detail_ready_ms, 500);
        assert_eq!(config.timeouts.listing_ready_ms, 30_000);
        assert_eq!(config.selectors.next_page, vec!["a.next".to_string()]);
        assert_eq!(
            config.selectors.detail_ready,
            "div[data-purpose='enrollment']"
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = HarvestConfig::new("not a url");
        assert!(config.validate().is_err());

        config = HarvestConfig::new("ftp://example.com/");
        assert!(config.validate().is_err());

        config = HarvestConfig::new("https://example.com/");
        config.max_pages = 0;
        assert!(config.validate().is_err());

        config = HarvestConfig::new("https://example.com/");
        config.detail_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_compiles_browser_selectors() {
        let mut config = HarvestConfig::new("https://example.com/");
        assert!(config.selectors.validate().is_ok());

        config.selectors.next_page = vec!["a.next".to_string(), "a[[".to_string()];
        assert!(matches!(
            config.validate(),
            Err(HarvestError::Selector { selector, .. }) if selector == "a[["
        ));

        config = HarvestConfig::new("https://example.com/");
        config.selectors.detail_ready = "div[[".to_string();
        assert!(matches!(config.validate(), Err(HarvestError::Selector { .. })));

        config = HarvestConfig::new("https://example.com/");
        config.selectors.listing_no_results = Some("p..empty".to_string());
        assert!(matches!(config.validate(), Err(HarvestError::Selector { .. })));

        config = HarvestConfig::new("https://example.com/");
        config.selectors.interstitial = Some(Locator::css("button[["));
        assert!(matches!(config.validate(), Err(HarvestError::Selector { .. })));

        // XPath is not checked locally
        config.selectors.interstitial = Some(Locator::XPath("//button[".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.json");
        std::fs::write(
            &path,
            r#"{"base_url": "https://example.com/topic/ai/", "output_path": "out.json"}"#,
        )
        .unwrap();

        let config = HarvestConfig::from_file(&path).unwrap();
        assert_eq!(config.output_path, PathBuf::from("out.json"));

        let missing = HarvestConfig::from_file(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(HarvestError::Config(_))));
    }
}
