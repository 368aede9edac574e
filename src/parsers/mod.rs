pub mod html;
pub mod normalize;
pub mod text;

#[cfg(test)]
mod tests;

pub use html::{
    Document, block_texts, find_all, find_one, next_sibling_matching, text_excluding, text_of,
};

use crate::error::HarvestError;
use scraper::{ElementRef, Selector};

/// A compiled structural query.
///
/// Queries are compiled once when the configuration is loaded so that a typo
/// in a selector fails the run up front instead of silently matching nothing
/// on every page.
#[derive(Debug, Clone)]
pub struct Query {
    source: String,
    selector: Selector,
}

impl Query {
    /// Compiles a CSS selector
    pub fn parse(source: &str) -> Result<Self, HarvestError> {
        let selector = Selector::parse(source).map_err(|e| HarvestError::Selector {
            selector: source.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            selector,
        })
    }

    /// Compiles every selector in order, failing on the first invalid one
    pub fn parse_all<S: AsRef<str>>(sources: &[S]) -> Result<Vec<Self>, HarvestError> {
        sources.iter().map(|s| Self::parse(s.as_ref())).collect()
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Whether the element itself matches this query
    pub fn matches(&self, element: &ElementRef<'_>) -> bool {
        self.selector.matches(element)
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
