//! Segmentation of a trim page into raw label/value text blocks.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::catalog::collapse_whitespace;

static BLOCK_ELEMENTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr, li, p, dl").expect("valid block selector"));

/// Text of one page element. Label and value are often concatenated with no
/// separator, e.g. `transmission typeautomatic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFieldBlock {
    pub text: String,
}

impl RawFieldBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Splits a document into blocks in document order: every table row, list
/// item and paragraph, plus each `dt`/`dd` pair of definition lists. Text
/// nodes are joined as they appear in the markup and whitespace runs are
/// collapsed.
pub fn split_blocks(html: &str) -> Vec<RawFieldBlock> {
    let doc = Html::parse_document(html);
    let mut blocks = Vec::new();
    for el in doc.select(&BLOCK_ELEMENTS) {
        if el.value().name() == "dl" {
            push_definitions(el, &mut blocks);
        } else {
            let text = element_text(el);
            if !text.is_empty() {
                blocks.push(RawFieldBlock::new(text));
            }
        }
    }
    blocks
}

fn push_definitions(dl: ElementRef<'_>, blocks: &mut Vec<RawFieldBlock>) {
    let mut term: Option<String> = None;
    for child in dl.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "dt" => {
                if let Some(t) = term.take().filter(|t| !t.is_empty()) {
                    blocks.push(RawFieldBlock::new(t));
                }
                term = Some(element_text(child));
            }
            "dd" => {
                let value = element_text(child);
                let text = match term.take() {
                    Some(t) => format!("{}{}", t, value),
                    None => value,
                };
                if !text.is_empty() {
                    blocks.push(RawFieldBlock::new(text));
                }
            }
            _ => {}
        }
    }
    if let Some(t) = term.filter(|t| !t.is_empty()) {
        blocks.push(RawFieldBlock::new(t));
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}
