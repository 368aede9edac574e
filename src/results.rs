use serde::{Deserialize, Serialize};

/// An item summary discovered on a listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// Title shown on the listing card (if available)
    pub title: Option<String>,

    /// Absolute URL of the item's detail page
    pub url: String,
}

impl ListingEntry {
    pub fn new(title: Option<String>, url: String) -> Self {
        Self { title, url }
    }
}

/// The harvested record for one item.
///
/// Every field is always serialized. Fields that could not be recovered are
/// written as `null` (or `[]` for lists) so consumers never branch on missing
/// keys and can tell "not found" apart from zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub title: Option<String>,
    pub url: String,
    pub students_enrolled: Option<u64>,
    pub what_you_will_learn: Vec<String>,
    pub description: Option<String>,

    /// Normalized numeric text such as `"19.99"`; coercion is left to consumers
    pub current_price: Option<String>,
    pub original_price: Option<String>,
    pub discount_percentage: Option<String>,
    pub requirements: Vec<String>,
    pub language: Option<String>,
    pub rating: Option<String>,
}

impl ItemRecord {
    /// A record carrying only the listing data, with every detail field absent
    pub fn absent(entry: &ListingEntry) -> Self {
        Self {
            title: entry.title.clone(),
            url: entry.url.clone(),
            students_enrolled: None,
            what_you_will_learn: Vec::new(),
            description: None,
            current_price: None,
            original_price: None,
            discount_percentage: None,
            requirements: Vec::new(),
            language: None,
            rating: None,
        }
    }

    /// True when no detail field was recovered
    pub fn is_detail_absent(&self) -> bool {
        self.students_enrolled.is_none()
            && self.what_you_will_learn.is_empty()
            && self.description.is_none()
            && self.current_price.is_none()
            && self.original_price.is_none()
            && self.discount_percentage.is_none()
            && self.requirements.is_empty()
            && self.language.is_none()
            && self.rating.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::BTreeSet;

    fn keys(record: &ItemRecord) -> BTreeSet<String> {
        match serde_json::to_value(record).unwrap() {
            Value::Object(map) => map.keys().cloned().collect(),
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn test_absent_record_keeps_listing_data() {
        let entry = ListingEntry::new(
            Some("Rust for Beginners".to_string()),
            "https://example.com/course/rust/".to_string(),
        );
        let record = ItemRecord::absent(&entry);
        assert_eq!(record.title.as_deref(), Some("Rust for Beginners"));
        assert_eq!(record.url, entry.url);
        assert!(record.is_detail_absent());
    }

    #[test]
    fn test_schema_is_identical_for_full_and_absent_records() {
        let entry = ListingEntry::new(None, "https://example.com/course/a/".to_string());
        let absent = ItemRecord::absent(&entry);
        let full = ItemRecord {
            title: Some("A".to_string()),
            url: entry.url.clone(),
            students_enrolled: Some(1200),
            what_you_will_learn: vec!["Ownership".to_string()],
            description: Some("About the course".to_string()),
            current_price: Some("19.99".to_string()),
            original_price: Some("89.99".to_string()),
            discount_percentage: Some("78% off".to_string()),
            requirements: vec!["A computer".to_string()],
            language: Some("English".to_string()),
            rating: Some("4.6".to_string()),
        };

        assert_eq!(keys(&absent), keys(&full));
        assert_eq!(keys(&absent).len(), 11);
    }

    #[test]
    fn test_absent_fields_serialize_as_null_and_empty() {
        let entry = ListingEntry::new(None, "https://example.com/course/a/".to_string());
        let value = serde_json::to_value(ItemRecord::absent(&entry)).unwrap();
        assert_eq!(value["students_enrolled"], Value::Null);
        assert_eq!(value["current_price"], Value::Null);
        assert_eq!(value["requirements"], Value::Array(Vec::new()));
        assert_eq!(value["url"], "https://example.com/course/a/");
    }
}
