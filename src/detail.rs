use crate::config::{HarvestConfig, SelectorConfig, TimeoutConfig};
use crate::error::{FetchError, HarvestError};
use crate::fetcher::{LoadRequest, Locator, PageFetcher, Session};
use crate::parsers::normalize;
use crate::parsers::{
    Document, Query, block_texts, find_all, find_one, next_sibling_matching, text, text_of,
};
use crate::results::{ItemRecord, ListingEntry};
use scraper::ElementRef;

/// Compiled queries for detail pages
#[derive(Debug, Clone)]
pub struct DetailSelectors {
    enrollment: Query,
    language: Query,
    language_label: String,
    rating: Query,
    objectives_section: Query,
    objectives_list: Query,
    objectives_item: Query,
    objectives_item_content: Query,
    description_section: Query,
    description_content: Query,
    description_blocks: Query,
    description_cutoff: String,
    requirements_title: Query,
    requirements_list: Query,
    requirements_item: Query,
    price_container: Query,
    current_price: Query,
    original_price: Query,
    discount: Query,
}

impl DetailSelectors {
    pub fn compile(selectors: &SelectorConfig) -> Result<Self, HarvestError> {
        Ok(Self {
            enrollment: Query::parse(&selectors.enrollment)?,
            language: Query::parse(&selectors.language)?,
            language_label: selectors.language_label.clone(),
            rating: Query::parse(&selectors.rating)?,
            objectives_section: Query::parse(&selectors.objectives_section)?,
            objectives_list: Query::parse(&selectors.objectives_list)?,
            objectives_item: Query::parse(&selectors.objectives_item)?,
            objectives_item_content: Query::parse(&selectors.objectives_item_content)?,
            description_section: Query::parse(&selectors.description_section)?,
            description_content: Query::parse(&selectors.description_content)?,
            description_blocks: Query::parse(&selectors.description_blocks)?,
            description_cutoff: selectors.description_cutoff.clone(),
            requirements_title: Query::parse(&selectors.requirements_title)?,
            requirements_list: Query::parse(&selectors.requirements_list)?,
            requirements_item: Query::parse(&selectors.requirements_item)?,
            price_container: Query::parse(&selectors.price_container)?,
            current_price: Query::parse(&selectors.current_price)?,
            original_price: Query::parse(&selectors.original_price)?,
            discount: Query::parse(&selectors.discount)?,
        })
    }
}

/// Builds the record for `entry` from its rendered detail page.
///
/// Every field is looked up on its own; a missing node leaves only that
/// field absent.
pub fn extract_record(html: &str, entry: &ListingEntry, selectors: &DetailSelectors) -> ItemRecord {
    let doc = Document::parse(html);
    let root = doc.root();

    let (current_price, original_price, discount_percentage) = prices(root, selectors);

    let record = ItemRecord {
        title: entry.title.clone(),
        url: entry.url.clone(),
        students_enrolled: students_enrolled(root, selectors),
        what_you_will_learn: objectives(root, selectors),
        description: description(root, selectors),
        current_price,
        original_price,
        discount_percentage,
        requirements: requirements(root, selectors),
        language: language(root, selectors),
        rating: find_one(root, &selectors.rating).and_then(|node| text::non_empty(text_of(node))),
    };

    if record.rating.is_none() {
        ::log::debug!("No rating on {}", entry.url);
    }
    record
}

fn students_enrolled(root: ElementRef<'_>, selectors: &DetailSelectors) -> Option<u64> {
    let Some(node) = find_one(root, &selectors.enrollment) else {
        ::log::debug!("Enrollment region not found");
        return None;
    };

    let raw = text_of(node);
    let count = normalize::enrollment_count(&raw);
    if count.is_none() {
        ::log::debug!("Cannot read an enrollment count from {:?}", raw);
    }
    count
}

fn language(root: ElementRef<'_>, selectors: &DetailSelectors) -> Option<String> {
    let node = find_one(root, &selectors.language)?;
    text::non_empty(text::strip_label(&text_of(node), &selectors.language_label))
}

fn objectives(root: ElementRef<'_>, selectors: &DetailSelectors) -> Vec<String> {
    let Some(list) = find_one(root, &selectors.objectives_section)
        .and_then(|section| find_one(section, &selectors.objectives_list))
    else {
        ::log::debug!("Objectives list not found");
        return Vec::new();
    };

    text::clean_items(
        find_all(list, &selectors.objectives_item)
            .into_iter()
            .filter_map(|item| find_one(item, &selectors.objectives_item_content))
            .map(text_of),
    )
}

fn description(root: ElementRef<'_>, selectors: &DetailSelectors) -> Option<String> {
    let Some(content) = find_one(root, &selectors.description_section)
        .and_then(|section| find_one(section, &selectors.description_content))
    else {
        ::log::debug!("Description content not found");
        return None;
    };

    let joined = text::join_paragraphs(&block_texts(content, &selectors.description_blocks));
    let kept = if selectors.description_cutoff.is_empty() {
        joined.trim()
    } else {
        text::truncate_at(&joined, &selectors.description_cutoff)
    };
    text::non_empty(kept.to_string())
}

fn requirements(root: ElementRef<'_>, selectors: &DetailSelectors) -> Vec<String> {
    let Some(list) = find_one(root, &selectors.requirements_title)
        .and_then(|title| next_sibling_matching(title, &selectors.requirements_list))
    else {
        ::log::debug!("Requirements list not found");
        return Vec::new();
    };

    text::clean_items(
        find_all(list, &selectors.requirements_item)
            .into_iter()
            .map(text_of),
    )
}

fn prices(
    root: ElementRef<'_>,
    selectors: &DetailSelectors,
) -> (Option<String>, Option<String>, Option<String>) {
    let Some(container) = find_one(root, &selectors.price_container) else {
        ::log::debug!("Price container not found");
        return (None, None, None);
    };

    let raw = |query: &Query| find_one(container, query).map(text_of);

    let current = normalize::optional_price(raw(&selectors.current_price).as_deref());
    let original = normalize::optional_price(raw(&selectors.original_price).as_deref());
    let discount = raw(&selectors.discount).and_then(text::non_empty);
    (current, original, discount)
}

/// Fetches detail pages and turns them into records
pub struct DetailHarvester {
    fetcher: PageFetcher,
    selectors: DetailSelectors,
    readiness: Vec<Locator>,
    timeouts: TimeoutConfig,
}

impl DetailHarvester {
    pub fn new(config: &HarvestConfig, fetcher: PageFetcher) -> Result<Self, HarvestError> {
        Ok(Self {
            fetcher,
            selectors: DetailSelectors::compile(&config.selectors)?,
            readiness: vec![Locator::css(&config.selectors.detail_ready)],
            timeouts: config.timeouts.clone(),
        })
    }

    /// Loads the detail page of `entry` and extracts its record.
    ///
    /// A readiness timeout is retried `readiness_retries` times. Errors are
    /// returned so the caller can tell a lost session from a bad page.
    pub async fn harvest<S: Session>(
        &self,
        session: &S,
        entry: &ListingEntry,
    ) -> Result<ItemRecord, FetchError> {
        let request = LoadRequest {
            url: &entry.url,
            readiness: &self.readiness,
            timeout: self.timeouts.detail_ready(),
            settle: self.timeouts.detail_settle(),
            dismiss_interstitial: false,
        };

        let mut attempt = 0;
        let page = loop {
            match self.fetcher.load(session, &request).await {
                Ok(page) => break page,
                Err(e) if e.is_timeout() && attempt < self.timeouts.readiness_retries => {
                    attempt += 1;
                    ::log::info!(
                        "Retrying {} ({}/{}): {}",
                        entry.url,
                        attempt,
                        self.timeouts.readiness_retries,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        };

        Ok(extract_record(&page.html, entry, &self.selectors))
    }

    /// Turns a failed harvest into an all-absent record
    pub fn record_or_absent(
        entry: &ListingEntry,
        result: Result<ItemRecord, FetchError>,
    ) -> ItemRecord {
        match result {
            Ok(record) => record,
            Err(e) => {
                ::log::warn!("Recording {} with absent details: {}", entry.url, e);
                ItemRecord::absent(entry)
            }
        }
    }
}
