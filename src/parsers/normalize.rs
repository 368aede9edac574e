use regex::Regex;
use std::sync::LazyLock;

/// Canonical value for a price advertised as free
pub const FREE_PRICE: &str = "0.00";

static NON_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9.,]+").expect("static pattern"));

static FREE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(free|gratuit|gratis)\b").expect("static pattern"));

/// Parses an enrollment count such as `"12,345 students"`.
///
/// Every non-digit is stripped before parsing. Text without digits (or too
/// large for the counter) is absent rather than zero.
pub fn enrollment_count(raw: &str) -> Option<u64> {
    let digits = raw
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>();
    digits.parse::<u64>().ok()
}

/// Normalizes a displayed price into plain numeric text.
///
/// Currency symbols and words are removed and the decimal separator is
/// rewritten to `.`:
///
/// - `"€19.99"` becomes `"19.99"`
/// - `"19,99 €"` becomes `"19.99"`
/// - `"1.234,56"` becomes `"1234.56"`
/// - `"Free"` becomes [`FREE_PRICE`]
///
/// Any other text without digits is absent.
pub fn price(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if !raw.chars().any(|c| c.is_ascii_digit()) {
        return FREE_LABEL.is_match(raw).then(|| FREE_PRICE.to_string());
    }

    let kept = NON_NUMERIC.replace_all(raw, "");
    let kept = kept.trim_matches(|c| c == '.' || c == ',');
    let decimal_at = decimal_separator(kept);

    let normalized = kept
        .char_indices()
        .filter_map(|(idx, ch)| {
            if ch.is_ascii_digit() {
                Some(ch)
            } else if Some(idx) == decimal_at {
                Some('.')
            } else {
                None
            }
        })
        .collect::<String>();

    Some(normalized)
}

/// Same as [`price`] for a value that may not have been found at all
pub fn optional_price(raw: Option<&str>) -> Option<String> {
    raw.and_then(price)
}

/// Byte offset of the separator acting as the decimal point, if any.
///
/// With both `,` and `.` present the last one is the decimal point. A lone
/// kind of separator is a decimal point when it occurs once; a single comma
/// additionally needs one or two digits after it, otherwise it groups
/// thousands (`"1,299"`).
fn decimal_separator(kept: &str) -> Option<usize> {
    let last_dot = kept.rfind('.');
    let last_comma = kept.rfind(',');

    match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => Some(dot.max(comma)),
        (Some(dot), None) => (kept.matches('.').count() == 1).then_some(dot),
        (None, Some(comma)) => {
            let fraction = kept.len() - comma - 1;
            (kept.matches(',').count() == 1 && (1..=2).contains(&fraction)).then_some(comma)
        }
        (None, None) => None,
    }
}
