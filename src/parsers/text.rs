/// Separator placed between paragraphs of a joined description
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Collapses every run of whitespace into a single space and trims the ends
pub fn collapse_whitespace(segment: &str) -> String {
    segment.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Joins paragraphs with exactly one empty line between them.
///
/// Paragraphs are whitespace-normalized first and empty ones are skipped, so
/// the result never contains more than one consecutive blank line.
pub fn join_paragraphs<S: AsRef<str>>(paragraphs: &[S]) -> String {
    paragraphs
        .iter()
        .map(|p| collapse_whitespace(p.as_ref()))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(PARAGRAPH_SEPARATOR)
}

/// Cuts `text` at the first occurrence of `marker`, trimming what remains
pub fn truncate_at<'a>(text: &'a str, marker: &str) -> &'a str {
    match text.find(marker) {
        Some(idx) => text[..idx].trim(),
        None => text.trim(),
    }
}

/// Removes every occurrence of a label (e.g. an aria prefix) and trims
pub fn strip_label(text: &str, label: &str) -> String {
    if label.is_empty() {
        return text.trim().to_string();
    }
    collapse_whitespace(&text.replace(label, " "))
}

/// Trims each item and drops the empty ones
pub fn clean_items<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| collapse_whitespace(item.as_ref()))
        .filter(|item| !item.is_empty())
        .collect()
}

/// Wraps a possibly empty string as an optional value
pub fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}
