use crate::parsers::Query;
use crate::parsers::text;
use scraper::{ElementRef, Html};

/// A parsed page.
///
/// `scraper::Html` is not `Send`, so a document is always parsed, queried and
/// dropped inside synchronous code and never held across an `.await`.
pub struct Document {
    html: Html,
}

impl Document {
    /// Parses a full HTML document
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    /// The `<html>` element, used as the starting point for queries
    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }
}

/// First descendant of `root` matching `query`
pub fn find_one<'a>(root: ElementRef<'a>, query: &Query) -> Option<ElementRef<'a>> {
    root.select(query.selector()).next()
}

/// All descendants of `root` matching `query`, in document order
pub fn find_all<'a>(root: ElementRef<'a>, query: &Query) -> Vec<ElementRef<'a>> {
    root.select(query.selector()).collect()
}

/// First sibling after `node` that matches `query`
pub fn next_sibling_matching<'a>(node: ElementRef<'a>, query: &Query) -> Option<ElementRef<'a>> {
    node.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|sibling| query.matches(sibling))
}

/// Text content of a node with whitespace collapsed
pub fn text_of(node: ElementRef<'_>) -> String {
    text::collapse_whitespace(&node.text().collect::<String>())
}

/// Text content of a node, skipping any subtree matching `exclude`
///
/// Used for titles that carry screen-reader-only helper text next to the
/// visible label.
pub fn text_excluding(node: ElementRef<'_>, exclude: &Query) -> String {
    let root_id = node.id();
    let visible = node
        .descendants()
        .filter_map(|n| {
            let fragment = n.value().as_text()?;
            let hidden = n
                .ancestors()
                .take_while(|a| a.id() != root_id)
                .filter_map(ElementRef::wrap)
                .any(|el| exclude.matches(&el));
            (!hidden).then(|| &**fragment)
        })
        .collect::<String>();

    text::collapse_whitespace(&visible)
}

/// Text of every block-level node below `root`.
///
/// A node matching `block` is taken whole. Any other element is descended
/// into when it contains blocks, and taken whole when it does not. Empty
/// texts are dropped. This keeps each piece of text exactly once even when
/// blocks nest inside one another.
pub fn block_texts(root: ElementRef<'_>, block: &Query) -> Vec<String> {
    let mut out = Vec::new();
    collect_blocks(root, block, &mut out);
    out
}

fn collect_blocks(node: ElementRef<'_>, block: &Query, out: &mut Vec<String>) {
    for child in node.children().filter_map(ElementRef::wrap) {
        if block.matches(&child) || find_one(child, block).is_none() {
            let text = text_of(child);
            if !text.is_empty() {
                out.push(text);
            }
        } else {
            collect_blocks(child, block, out);
        }
    }
}
