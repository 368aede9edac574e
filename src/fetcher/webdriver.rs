use crate::config::BrowserConfig;
use crate::error::{FetchError, HarvestError};
use crate::fetcher::{Connector, Locator, Session};
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::{Client, ClientBuilder};
use serde_json::{Map, Value, json};

/// Endpoints tried when the configured WebDriver refuses a session
const FALLBACK_WEBDRIVER_URLS: [&str; 2] = [
    "http://localhost:9515", // ChromeDriver default
    "http://127.0.0.1:4444", // Try with IP instead of localhost
];

/// A session on a WebDriver server (ChromeDriver, geckodriver, Selenium)
pub struct WebDriverSession {
    client: Client,
    endpoint: String,
}

impl WebDriverSession {
    async fn find(&self, locator: &Locator) -> Result<Option<Element>, FetchError> {
        match self.client.find(to_webdriver(locator)).await {
            Ok(element) => Ok(Some(element)),
            Err(e) if e.is_no_such_element() => Ok(None),
            Err(e) => Err(command_error(e, "finding", locator)),
        }
    }
}

fn to_webdriver(locator: &Locator) -> fantoccini::Locator<'_> {
    match locator {
        Locator::Css(s) => fantoccini::Locator::Css(s),
        Locator::XPath(s) => fantoccini::Locator::XPath(s),
    }
}

/// Errors that mean the element is there but cannot take the click right now
fn is_transient_click_error(error: &CmdError) -> bool {
    error.is_no_such_element()
        || error.is_stale_element_reference()
        || error.is_element_not_interactable()
        || matches!(error, CmdError::Standard(w) if w.error == ErrorStatus::ElementClickIntercepted)
}

/// Errors after which the session cannot be used again
fn is_session_lost(error: &CmdError) -> bool {
    if error.is_invalid_session_id() || matches!(error, CmdError::Lost(_)) {
        return true;
    }
    // Grid nodes and older drivers report a vanished session as plain text
    let msg = error.to_string();
    msg.contains("Unable to find session") || msg.contains("session deleted")
}

/// Maps a WebDriver failure, separating lost sessions from other errors
fn command_error(error: CmdError, context: &str, target: &dyn std::fmt::Display) -> FetchError {
    let msg = error.to_string();
    if is_session_lost(&error) {
        ::log::warn!("Lost session while {} {}", context, target);
        FetchError::SessionLost(msg)
    } else {
        FetchError::Command(format!("{} {}: {}", context, target, msg))
    }
}

#[async_trait]
impl Session for WebDriverSession {
    async fn goto(&self, url: &str) -> Result<(), FetchError> {
        self.client
            .goto(url)
            .await
            .map_err(|e| match command_error(e, "accessing", &url) {
                FetchError::Command(reason) => FetchError::Navigation {
                    url: url.to_string(),
                    reason,
                },
                other => other,
            })
    }

    async fn is_present(&self, locator: &Locator) -> Result<bool, FetchError> {
        Ok(self.find(locator).await?.is_some())
    }

    async fn is_clickable(&self, locator: &Locator) -> Result<bool, FetchError> {
        let Some(element) = self.find(locator).await? else {
            return Ok(false);
        };

        let displayed = match element.is_displayed().await {
            Ok(displayed) => displayed,
            Err(e) if is_transient_click_error(&e) => return Ok(false),
            Err(e) => return Err(command_error(e, "inspecting", locator)),
        };
        if !displayed {
            return Ok(false);
        }

        match element.is_enabled().await {
            Ok(enabled) => Ok(enabled),
            Err(e) if is_transient_click_error(&e) => Ok(false),
            Err(e) => Err(command_error(e, "inspecting", locator)),
        }
    }

    async fn scroll_into_view(&self, locator: &Locator) -> Result<bool, FetchError> {
        let Some(element) = self.find(locator).await? else {
            return Ok(false);
        };
        let arg = serde_json::to_value(&element)
            .map_err(|e| FetchError::Command(format!("serializing element: {}", e)))?;

        match self
            .client
            .execute("arguments[0].scrollIntoView(true);", vec![arg])
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_transient_click_error(&e) => Ok(false),
            Err(e) => Err(command_error(e, "scrolling to", locator)),
        }
    }

    async fn click(&self, locator: &Locator) -> Result<bool, FetchError> {
        let Some(element) = self.find(locator).await? else {
            return Ok(false);
        };

        match element.click().await {
            Ok(_) => Ok(true),
            Err(e) if is_transient_click_error(&e) => {
                ::log::debug!("Click on {} not accepted: {}", locator, e);
                Ok(false)
            }
            Err(e) => Err(command_error(e, "clicking", locator)),
        }
    }

    async fn source(&self) -> Result<String, FetchError> {
        self.client
            .source()
            .await
            .map_err(|e| command_error(e, "getting source for", &"current page"))
    }

    async fn close(&self) -> Result<(), FetchError> {
        self.client
            .clone()
            .close()
            .await
            .map_err(|e| command_error(e, "closing", &self.endpoint))
    }
}

/// Starts Chrome sessions on a WebDriver server
#[derive(Debug, Clone)]
pub struct WebDriverConnector {
    webdriver_url: String,
    capabilities: Map<String, Value>,
}

impl WebDriverConnector {
    pub fn new(webdriver_url: &str, browser: &BrowserConfig) -> Self {
        Self {
            webdriver_url: webdriver_url.to_string(),
            capabilities: chrome_capabilities(browser),
        }
    }

    pub fn webdriver_url(&self) -> &str {
        &self.webdriver_url
    }

    async fn try_connect(&self, url: &str) -> Result<Client, String> {
        let mut builder = ClientBuilder::native();
        builder.capabilities(self.capabilities.clone());
        builder.connect(url).await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Connector for WebDriverConnector {
    type Session = WebDriverSession;

    async fn connect(&self) -> Result<WebDriverSession, HarvestError> {
        let first_error = match self.try_connect(&self.webdriver_url).await {
            Ok(client) => {
                ::log::debug!("Connected to WebDriver at {}", self.webdriver_url);
                return Ok(WebDriverSession {
                    client,
                    endpoint: self.webdriver_url.clone(),
                });
            }
            Err(e) => {
                ::log::error!(
                    "Failed to connect to WebDriver at {}: {}",
                    self.webdriver_url,
                    e
                );
                e
            }
        };

        for url in FALLBACK_WEBDRIVER_URLS {
            if url == self.webdriver_url {
                continue;
            }

            ::log::info!("Trying fallback WebDriver URL: {}", url);
            if let Ok(client) = self.try_connect(url).await {
                ::log::debug!("Connected to fallback WebDriver at {}", url);
                return Ok(WebDriverSession {
                    client,
                    endpoint: url.to_string(),
                });
            }
        }

        ::log::error!(
            "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
        );
        Err(HarvestError::RuntimeUnavailable {
            endpoint: self.webdriver_url.clone(),
            reason: first_error,
        })
    }
}

/// `goog:chromeOptions` capabilities for the configured launch options
pub fn chrome_capabilities(browser: &BrowserConfig) -> Map<String, Value> {
    let mut args = browser.args.clone();
    if browser.headless && !args.iter().any(|a| a.starts_with("--headless")) {
        args.push("--headless=new".to_string());
    }
    if let Some(agent) = &browser.user_agent {
        args.push(format!("--user-agent={}", agent));
    }

    let mut capabilities = Map::new();
    capabilities.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
    capabilities
}
