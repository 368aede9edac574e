pub mod webdriver;

pub use webdriver::{WebDriverConnector, WebDriverSession};

use crate::error::{FetchError, HarvestError};
use crate::utils::{poll_until, settle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How an element is located in the live browser page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: &str) -> Self {
        Locator::Css(selector.to_string())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css:{}", s),
            Locator::XPath(s) => write!(f, "xpath:{}", s),
        }
    }
}

/// One live browser session (a WebDriver session or a tab).
///
/// All calls act on the session's current page. Implementations map "no such
/// element" to `Ok(false)` and keep `Err` for failures of the session itself.
#[async_trait]
pub trait Session: Send + Sync {
    /// Navigate the session to `url`
    async fn goto(&self, url: &str) -> Result<(), FetchError>;

    /// Whether at least one element matches
    async fn is_present(&self, locator: &Locator) -> Result<bool, FetchError>;

    /// Whether the first match is displayed and enabled
    async fn is_clickable(&self, locator: &Locator) -> Result<bool, FetchError>;

    /// Scroll the first match into view; `Ok(false)` if it vanished
    async fn scroll_into_view(&self, locator: &Locator) -> Result<bool, FetchError>;

    /// Click the first match; `Ok(false)` if it is missing or not clickable
    async fn click(&self, locator: &Locator) -> Result<bool, FetchError>;

    /// Serialized DOM of the current page
    async fn source(&self) -> Result<String, FetchError>;

    /// End the session
    async fn close(&self) -> Result<(), FetchError>;
}

/// Opens new browser sessions.
///
/// The coordinator opens one session for the listing walk, and one more per
/// extra detail worker.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: Session + 'static;

    /// Start a session, failing with [`HarvestError::RuntimeUnavailable`]
    async fn connect(&self) -> Result<Self::Session, HarvestError>;
}

/// A page whose readiness marker has appeared
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
    /// Index of the readiness locator that matched
    pub matched: usize,
}

/// Parameters for one [`PageFetcher::load`]
#[derive(Debug, Clone)]
pub struct LoadRequest<'a> {
    pub url: &'a str,
    /// Any of these marks the page as ready; checked in order
    pub readiness: &'a [Locator],
    pub timeout: Duration,
    /// Pause after readiness before the DOM is captured
    pub settle: Duration,
    pub dismiss_interstitial: bool,
}

/// Loads pages into a session and waits for them to be usable
#[derive(Debug, Clone)]
pub struct PageFetcher {
    poll: Duration,
    interstitial: Option<Locator>,
    interstitial_timeout: Duration,
}

impl PageFetcher {
    pub fn new(poll: Duration) -> Self {
        Self {
            poll,
            interstitial: None,
            interstitial_timeout: Duration::ZERO,
        }
    }

    /// Look for (and dismiss) this prompt after navigation when asked to
    pub fn with_interstitial(mut self, locator: Option<Locator>, timeout: Duration) -> Self {
        self.interstitial = locator;
        self.interstitial_timeout = timeout;
        self
    }

    /// Navigates to `request.url` and waits for the first readiness locator.
    ///
    /// Returns [`FetchError::Timeout`] if none appears within the timeout.
    pub async fn load<S: Session>(
        &self,
        session: &S,
        request: &LoadRequest<'_>,
    ) -> Result<RenderedPage, FetchError> {
        ::log::debug!("LOAD: {}", request.url);
        session.goto(request.url).await?;

        if request.dismiss_interstitial {
            self.dismiss_interstitial(session).await;
        }

        let readiness = request.readiness;
        let matched = poll_until(request.timeout, self.poll, move || {
            first_present(session, readiness)
        })
        .await?;

        let Some(matched) = matched else {
            return Err(FetchError::Timeout {
                url: request.url.to_string(),
                selectors: describe(readiness),
                timeout: request.timeout,
            });
        };
        ::log::trace!("{} ready via {}", request.url, readiness[matched]);

        settle(request.settle).await;
        let html = session.source().await?;

        Ok(RenderedPage {
            url: request.url.to_string(),
            html,
            matched,
        })
    }

    /// Waits up to `timeout` for `locator` to become clickable, then scrolls
    /// it into view and clicks it. `Ok(false)` when it never became usable.
    pub async fn click_when_ready<S: Session>(
        &self,
        session: &S,
        locator: &Locator,
        timeout: Duration,
        scroll_settle: Duration,
    ) -> Result<bool, FetchError> {
        let ready = poll_until(timeout, self.poll, move || async move {
            Ok::<_, FetchError>(session.is_clickable(locator).await?.then_some(()))
        })
        .await?;
        if ready.is_none() {
            return Ok(false);
        }

        if !session.scroll_into_view(locator).await? {
            return Ok(false);
        }
        settle(scroll_settle).await;
        session.click(locator).await
    }

    /// Best-effort dismissal of the "open external application?" prompt.
    /// Never fails: a missing prompt or a failed click is only logged.
    async fn dismiss_interstitial<S: Session>(&self, session: &S) {
        let Some(locator) = &self.interstitial else {
            return;
        };

        match self
            .click_when_ready(session, locator, self.interstitial_timeout, Duration::ZERO)
            .await
        {
            Ok(true) => ::log::info!("Dismissed interstitial prompt ({})", locator),
            Ok(false) => ::log::debug!("No interstitial prompt detected"),
            Err(e) => ::log::debug!("Could not dismiss interstitial prompt: {}", e),
        }
    }
}

/// Index of the first locator with a match on the current page
async fn first_present<S: Session>(
    session: &S,
    locators: &[Locator],
) -> Result<Option<usize>, FetchError> {
    for (idx, locator) in locators.iter().enumerate() {
        if session.is_present(locator).await? {
            return Ok(Some(idx));
        }
    }
    Ok(None)
}

fn describe(locators: &[Locator]) -> String {
    locators
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
