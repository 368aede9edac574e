use crate::config::{HarvestConfig, TimeoutConfig};
use crate::error::HarvestError;
use crate::fetcher::{LoadRequest, Locator, PageFetcher, Session};
use crate::parsers::{Document, Query, find_all, find_one, text, text_excluding};
use crate::results::ListingEntry;
use crate::utils::{page_url, settle};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Compiled queries for listing pages
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    pub container: Query,
    pub link: Query,
    pub title_hidden: Query,
}

impl ListingSelectors {
    pub fn compile(config: &HarvestConfig) -> Result<Self, HarvestError> {
        let selectors = &config.selectors;
        Ok(Self {
            container: Query::parse(&selectors.listing_container)?,
            link: Query::parse(&selectors.listing_link)?,
            title_hidden: Query::parse(&selectors.listing_title_hidden)?,
        })
    }
}

/// What one listing page yielded
#[derive(Debug, Clone, Default)]
pub struct PageExtraction {
    /// Item containers found, including ones whose link was unusable
    pub containers: usize,
    pub entries: Vec<ListingEntry>,
}

/// Extracts item summaries from a rendered listing page.
///
/// Containers without a usable link are skipped; they never reach the
/// detail stage.
pub fn extract_entries(html: &str, page_url: &Url, selectors: &ListingSelectors) -> PageExtraction {
    let doc = Document::parse(html);
    let containers = find_all(doc.root(), &selectors.container);

    let entries = containers
        .iter()
        .filter_map(|card| {
            let Some(anchor) = find_one(*card, &selectors.link) else {
                ::log::debug!("Listing card without a title link on {}", page_url);
                return None;
            };
            let title = text::non_empty(text_excluding(anchor, &selectors.title_hidden));

            let Some(url) = anchor
                .value()
                .attr("href")
                .and_then(|href| resolve_link(page_url, href))
            else {
                ::log::info!(
                    "No usable URL for listing item {:?}, skipping",
                    title.as_deref().unwrap_or("N/A")
                );
                return None;
            };

            Some(ListingEntry::new(title, url))
        })
        .collect::<Vec<_>>();

    PageExtraction {
        containers: containers.len(),
        entries,
    }
}

/// Resolves an item link against the page it was found on.
///
/// Only http(s) targets can be visited; fragments are dropped.
pub fn resolve_link(page_url: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let mut resolved = page_url.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

/// Why the walk stopped before reaching the page limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExhaustReason {
    /// The page (or its readiness marker) could not be loaded
    LoadFailed { page: u32, reason: String },
    /// The page rendered with no item containers
    NoResults { page: u32 },
    /// No next-page strategy found a control
    NoNextControl { page: u32 },
    /// Cancelled before loading this page
    Cancelled { page: u32 },
}

/// How a listing walk ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEnd {
    /// The configured page limit was reached
    Done,
    Exhausted(ExhaustReason),
}

impl std::fmt::Display for WalkEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalkEnd::Done => write!(f, "page limit reached"),
            WalkEnd::Exhausted(ExhaustReason::LoadFailed { page, reason }) => {
                write!(f, "page {} failed to load ({})", page, reason)
            }
            WalkEnd::Exhausted(ExhaustReason::NoResults { page }) => {
                write!(f, "no results on page {}", page)
            }
            WalkEnd::Exhausted(ExhaustReason::NoNextControl { page }) => {
                write!(f, "no next-page control after page {}", page)
            }
            WalkEnd::Exhausted(ExhaustReason::Cancelled { page }) => {
                write!(f, "cancelled before page {}", page)
            }
        }
    }
}

/// States of the per-page walk
#[derive(Debug)]
enum WalkState {
    Loading(u32),
    Extracting { page: u32, url: Url, html: String },
    Advancing(u32),
    NextPage(u32),
    Done,
    Exhausted(ExhaustReason),
}

/// Strategies tried while leaving one listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
    pub page: u32,
    /// Strategy indices in the order they were tried
    pub attempted: Vec<usize>,
    /// The strategy whose control was clicked
    pub chosen: Option<usize>,
}

impl NavigationState {
    fn new(page: u32) -> Self {
        Self {
            page,
            attempted: Vec::new(),
            chosen: None,
        }
    }
}

/// Result of walking the listing
#[derive(Debug, Clone)]
pub struct ListingOutcome {
    /// Entries in discovery order, duplicates included
    pub entries: Vec<ListingEntry>,
    pub pages_visited: u32,
    pub navigation: Vec<NavigationState>,
    pub end: WalkEnd,
}

/// Walks the paginated listing, one page at a time
pub struct ListingWalker {
    fetcher: PageFetcher,
    base_url: Url,
    page_param: String,
    max_pages: u32,
    selectors: ListingSelectors,
    readiness: Vec<Locator>,
    strategies: Vec<Locator>,
    timeouts: TimeoutConfig,
}

impl ListingWalker {
    pub fn new(config: &HarvestConfig, fetcher: PageFetcher) -> Result<Self, HarvestError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| HarvestError::Config(format!("invalid base_url: {}", e)))?;

        let mut readiness = vec![Locator::css(&config.selectors.listing_container)];
        if let Some(empty) = &config.selectors.listing_no_results {
            readiness.push(Locator::css(empty));
        }

        Ok(Self {
            fetcher,
            base_url,
            page_param: config.page_param.clone(),
            max_pages: config.max_pages,
            selectors: ListingSelectors::compile(config)?,
            readiness,
            strategies: config
                .selectors
                .next_page
                .iter()
                .map(|s| Locator::css(s))
                .collect(),
            timeouts: config.timeouts.clone(),
        })
    }

    /// Walks listing pages until the page limit, the end of results, a load
    /// failure or cancellation. Entries found before the stop are kept.
    pub async fn walk<S: Session>(&self, session: &S, cancel: &CancellationToken) -> ListingOutcome {
        let mut entries = Vec::new();
        let mut navigation = Vec::new();
        let mut pages_visited = 0;
        let mut state = WalkState::Loading(1);

        let end = loop {
            state = match state {
                WalkState::Loading(page) => self.load(session, page, cancel).await,
                WalkState::Extracting { page, url, html } => {
                    pages_visited += 1;
                    let extraction = extract_entries(&html, &url, &self.selectors);
                    if extraction.containers == 0 {
                        ::log::info!("No item containers on page {}, end of results", page);
                        WalkState::Exhausted(ExhaustReason::NoResults { page })
                    } else {
                        ::log::info!(
                            "Found {} items on listing page {}",
                            extraction.entries.len(),
                            page
                        );
                        entries.extend(extraction.entries);
                        WalkState::Advancing(page)
                    }
                }
                WalkState::Advancing(page) => {
                    if page >= self.max_pages {
                        ::log::info!("Reached the maximum of {} pages", self.max_pages);
                        WalkState::Done
                    } else {
                        let nav = self.advance(session, page).await;
                        let chosen = nav.chosen;
                        navigation.push(nav);
                        match chosen {
                            Some(_) => WalkState::NextPage(page + 1),
                            None => WalkState::Exhausted(ExhaustReason::NoNextControl { page }),
                        }
                    }
                }
                WalkState::NextPage(page) => WalkState::Loading(page),
                WalkState::Done => break WalkEnd::Done,
                WalkState::Exhausted(reason) => break WalkEnd::Exhausted(reason),
            };
        };

        ::log::info!(
            "Listing walk finished after {} pages with {} entries: {}",
            pages_visited,
            entries.len(),
            end
        );

        ListingOutcome {
            entries,
            pages_visited,
            navigation,
            end,
        }
    }

    async fn load<S: Session>(&self, session: &S, page: u32, cancel: &CancellationToken) -> WalkState {
        if cancel.is_cancelled() {
            return WalkState::Exhausted(ExhaustReason::Cancelled { page });
        }

        let url = page_url(&self.base_url, &self.page_param, page);
        ::log::info!("Loading listing page {}/{}: {}", page, self.max_pages, url);

        let request = LoadRequest {
            url: url.as_str(),
            readiness: &self.readiness,
            timeout: self.timeouts.listing_ready(),
            settle: self.timeouts.listing_settle(),
            dismiss_interstitial: true,
        };
        match self.fetcher.load(session, &request).await {
            Ok(rendered) => WalkState::Extracting {
                page,
                url,
                html: rendered.html,
            },
            Err(e) => {
                ::log::warn!("Stopping listing walk at page {}: {}", page, e);
                WalkState::Exhausted(ExhaustReason::LoadFailed {
                    page,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Tries each next-page strategy in declaration order; the first one
    /// that clicks a control wins.
    async fn advance<S: Session>(&self, session: &S, page: u32) -> NavigationState {
        let mut nav = NavigationState::new(page);

        for (idx, strategy) in self.strategies.iter().enumerate() {
            nav.attempted.push(idx);
            ::log::debug!("Looking for next-page control with {}", strategy);

            match self
                .fetcher
                .click_when_ready(
                    session,
                    strategy,
                    self.timeouts.next_control(),
                    self.timeouts.scroll_settle(),
                )
                .await
            {
                Ok(true) => {
                    ::log::info!("Clicked next-page control via {}", strategy);
                    settle(self.timeouts.next_page_settle()).await;
                    nav.chosen = Some(idx);
                    return nav;
                }
                Ok(false) => continue,
                Err(e) => {
                    ::log::warn!("Unexpected error with next-page strategy {}: {}", strategy, e);
                    continue;
                }
            }
        }

        ::log::info!(
            "No next-page control found after page {} ({} strategies tried)",
            page,
            nav.attempted.len()
        );
        nav
    }
}
