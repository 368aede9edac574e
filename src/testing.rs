//! In-memory browser used by the unit tests.
//!
//! A `MockSite` maps URLs to fixed HTML. Sessions evaluate CSS locators
//! against the HTML of their current page with `scraper`, so fixtures behave
//! like a rendered page without a WebDriver. XPath locators never match.

use crate::error::{FetchError, HarvestError};
use crate::fetcher::{Connector, Locator, Session};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct SiteState {
    pages: HashMap<String, String>,
    visits: Vec<String>,
    clicks: Vec<Locator>,
    lose_session_once: HashSet<String>,
    panic_on: HashSet<String>,
    cancel_on: Option<(String, CancellationToken)>,
}

#[derive(Clone, Default)]
pub struct MockSite {
    state: Arc<Mutex<SiteState>>,
}

impl MockSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` at `url`; unknown URLs render an empty page
    pub fn page(&self, url: &str, html: &str) {
        self.lock().pages.insert(url.to_string(), html.to_string());
    }

    /// The next visit to `url` reports a lost WebDriver session
    pub fn lose_session_on(&self, url: &str) {
        self.lock().lose_session_once.insert(url.to_string());
    }

    /// Visiting `url` panics the calling task
    pub fn panic_on(&self, url: &str) {
        self.lock().panic_on.insert(url.to_string());
    }

    /// Cancel `token` when `url` is visited
    pub fn cancel_on(&self, url: &str, token: CancellationToken) {
        self.lock().cancel_on = Some((url.to_string(), token));
    }

    pub fn visits(&self) -> Vec<String> {
        self.lock().visits.clone()
    }

    pub fn clicks(&self) -> Vec<Locator> {
        self.lock().clicks.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SiteState> {
        self.state.lock().unwrap()
    }
}

pub struct MockSession {
    site: MockSite,
    current: Mutex<Option<String>>,
}

impl MockSession {
    pub fn new(site: MockSite) -> Self {
        Self {
            site,
            current: Mutex::new(None),
        }
    }

    fn html(&self) -> String {
        let current = self.current.lock().unwrap().clone();
        current
            .and_then(|url| self.site.lock().pages.get(&url).cloned())
            .unwrap_or_else(|| "<html><body></body></html>".to_string())
    }

    fn matches(&self, locator: &Locator) -> bool {
        let Locator::Css(css) = locator else {
            return false;
        };
        let Ok(selector) = Selector::parse(css) else {
            return false;
        };
        let doc = Html::parse_document(&self.html());
        doc.select(&selector).next().is_some()
    }
}

#[async_trait]
impl Session for MockSession {
    async fn goto(&self, url: &str) -> Result<(), FetchError> {
        let (lost, panic, cancel) = {
            let mut site = self.site.lock();
            site.visits.push(url.to_string());
            let lost = site.lose_session_once.remove(url);
            let panic = site.panic_on.contains(url);
            let cancel = site
                .cancel_on
                .as_ref()
                .filter(|(target, _)| target == url)
                .map(|(_, token)| token.clone());
            (lost, panic, cancel)
        };

        if let Some(token) = cancel {
            token.cancel();
        }
        if panic {
            panic!("mock browser crashed on {url}");
        }
        if lost {
            return Err(FetchError::SessionLost(format!("session dropped on {url}")));
        }

        *self.current.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn is_present(&self, locator: &Locator) -> Result<bool, FetchError> {
        Ok(self.matches(locator))
    }

    async fn is_clickable(&self, locator: &Locator) -> Result<bool, FetchError> {
        Ok(self.matches(locator))
    }

    async fn scroll_into_view(&self, locator: &Locator) -> Result<bool, FetchError> {
        Ok(self.matches(locator))
    }

    async fn click(&self, locator: &Locator) -> Result<bool, FetchError> {
        if !self.matches(locator) {
            return Ok(false);
        }
        self.site.lock().clicks.push(locator.clone());
        Ok(true)
    }

    async fn source(&self) -> Result<String, FetchError> {
        Ok(self.html())
    }

    async fn close(&self) -> Result<(), FetchError> {
        Ok(())
    }
}

/// Hands out sessions on a shared [`MockSite`]
pub struct MockConnector {
    site: MockSite,
    available: bool,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(site: MockSite) -> Self {
        Self {
            site,
            available: true,
            connects: AtomicUsize::new(0),
        }
    }

    /// A connector whose browser runtime cannot be started
    pub fn unavailable() -> Self {
        Self {
            site: MockSite::new(),
            available: false,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Session = MockSession;

    async fn connect(&self) -> Result<MockSession, HarvestError> {
        if !self.available {
            return Err(HarvestError::RuntimeUnavailable {
                endpoint: "mock://browser".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MockSession::new(self.site.clone()))
    }
}

/// Listing page fixture with `items` cards of `(slug, title)` and, when
/// `next` is set, a control matching that CSS class.
pub fn listing_html(items: &[(&str, &str)], next: Option<&str>) -> String {
    let cards = items
        .iter()
        .map(|(slug, title)| {
            format!(
                r#"<div data-purpose="container">
                     <h3 data-purpose="course-title-url">
                       <a href="/course/{slug}/">{title}<div class="ud-sr-only">Course link</div></a>
                     </h3>
                   </div>"#
            )
        })
        .collect::<String>();
    let next = next
        .map(|class| format!(r#"<a class="{class}" href="?p=next">Next</a>"#))
        .unwrap_or_default();
    format!("<html><body><main>{cards}</main><nav>{next}</nav></body></html>")
}

/// Detail page fixture with every field populated
pub fn detail_html(students: &str, price: &str) -> String {
    format!(
        r#"<html><body>
  <div data-purpose="lead-course-locale">Course Language English</div>
  <span data-purpose="rating-number">4.6</span>
  <div data-purpose="enrollment">{students}</div>
  <div class="what-you-will-learn--what-will-you-learn--jsm83">
    <ul class="ud-unstyled-list">
      <li><div class="ud-block-list-item-content">Write safe concurrent code</div></li>
      <li><div class="ud-block-list-item-content">  </div></li>
      <li><div class="ud-block-list-item-content">Use the borrow checker</div></li>
    </ul>
  </div>
  <div data-purpose="course-description">
    <div data-purpose="safely-set-inner-html:description:description">
      <p>A practical course.</p>
      <ul><li>Projects</li><li>Quizzes</li></ul>
      <h2>Who this course is for:</h2>
      <ul><li>Beginners</li></ul>
    </div>
  </div>
  <h2 data-purpose="requirements-title">Requirements</h2>
  <ul class="ud-unstyled-list">
    <li><div class="ud-block-list-item-content">A computer</div></li>
  </ul>
  <div data-purpose="price-text-container">
    <div data-purpose="course-price-text"><span>Current price</span><span>{price}</span></div>
    <div data-purpose="course-old-price-text"><s>€84,99</s></div>
    <div data-purpose="discount-percentage"> 76% off </div>
  </div>
</body></html>"#
    )
}
