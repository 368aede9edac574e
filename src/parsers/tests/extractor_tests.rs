use crate::parsers::{
    Document, Query, block_texts, find_all, find_one, next_sibling_matching, text_excluding,
    text_of,
};

const PAGE: &str = r#"
<html><body>
  <h3 data-purpose="course-title-url">
    <a href="/course/rust/">Rust   Fundamentals<div class="ud-sr-only">Screen reader note</div></a>
  </h3>
  <h2 data-purpose="requirements-title">Requirements</h2>
  <p>Not the list</p>
  <ul class="ud-unstyled-list">
    <li><div class="ud-block-list-item-content"> A computer </div></li>
    <li><div class="ud-block-list-item-content"></div></li>
  </ul>
  <div id="description">
    <p>Intro with <strong>bold</strong> text.</p>
    <div>
      <ul><li>First point</li><li><p>Second point</p></li></ul>
      <span>Loose span</span>
    </div>
    <h3>Heading</h3>
  </div>
</body></html>
"#;

#[test]
fn test_find_one_and_find_all() {
    let doc = Document::parse(PAGE);
    let items = Query::parse("div.ud-block-list-item-content").unwrap();
    assert_eq!(find_all(doc.root(), &items).len(), 2);

    let missing = Query::parse("div[data-purpose='discount-percentage']").unwrap();
    assert!(find_one(doc.root(), &missing).is_none());
    assert!(find_all(doc.root(), &missing).is_empty());
}

#[test]
fn test_text_is_whitespace_normalized() {
    let doc = Document::parse(PAGE);
    let items = Query::parse("div.ud-block-list-item-content").unwrap();
    let first = find_one(doc.root(), &items).unwrap();
    assert_eq!(text_of(first), "A computer");
}

#[test]
fn test_text_excluding_hidden_helper() {
    let doc = Document::parse(PAGE);
    let link = Query::parse("h3[data-purpose='course-title-url'] a").unwrap();
    let hidden = Query::parse(".ud-sr-only").unwrap();
    let anchor = find_one(doc.root(), &link).unwrap();

    assert_eq!(text_excluding(anchor, &hidden), "Rust Fundamentals");
    assert_eq!(text_of(anchor), "Rust FundamentalsScreen reader note");
}

#[test]
fn test_next_sibling_matching_skips_other_siblings() {
    let doc = Document::parse(PAGE);
    let title = Query::parse("h2[data-purpose='requirements-title']").unwrap();
    let list = Query::parse("ul.ud-unstyled-list").unwrap();

    let heading = find_one(doc.root(), &title).unwrap();
    let found = next_sibling_matching(heading, &list).unwrap();
    assert_eq!(found.value().name(), "ul");

    let nothing = Query::parse("table").unwrap();
    assert!(next_sibling_matching(heading, &nothing).is_none());
}

#[test]
fn test_block_texts_keeps_each_text_once() {
    let doc = Document::parse(PAGE);
    let root = find_one(doc.root(), &Query::parse("#description").unwrap()).unwrap();
    let blocks = Query::parse("p, li, h1, h2, h3, h4, h5, h6").unwrap();

    assert_eq!(
        block_texts(root, &blocks),
        vec![
            "Intro with bold text.".to_string(),
            "First point".to_string(),
            "Second point".to_string(),
            "Loose span".to_string(),
            "Heading".to_string(),
        ]
    );
}

#[test]
fn test_extraction_is_repeatable() {
    let first = Document::parse(PAGE);
    let second = Document::parse(PAGE);
    let items = Query::parse("div.ud-block-list-item-content").unwrap();

    let a = find_all(first.root(), &items)
        .into_iter()
        .map(text_of)
        .collect::<Vec<_>>();
    let b = find_all(second.root(), &items)
        .into_iter()
        .map(text_of)
        .collect::<Vec<_>>();
    assert_eq!(a, b);
}

#[test]
fn test_invalid_selector_is_rejected() {
    let err = Query::parse("div[[").unwrap_err();
    assert!(err.to_string().contains("div[["));
}
