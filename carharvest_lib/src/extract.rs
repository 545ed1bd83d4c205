//! Schema-driven extraction of one trim page into a `TypedRecord`.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use catalog_client::Document;
use regex::Regex;
use serde::Serialize;

use crate::blocks::{split_blocks, RawFieldBlock};
use crate::field_mapping::{DataType, FieldMapping, FieldRule};
use crate::record::{FieldValue, TrimIdentity, TypedRecord};

static NUMERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("valid numeral regex"));

/// Remainders that mean "feature not present" for bool rules (compared lowercased).
const NEGATIVE_MARKERS: &[&str] = &["no", "false", "n/a", "not available", "none", "-", "✗", "×"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Label found but nothing followed it.
    EmptyValue,
    /// Numeric rule whose text holds no (or not enough) numerals.
    NoNumeral,
    /// Numeral present but not representable in the column type.
    OutOfRange,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WarningKind::EmptyValue => "empty value",
            WarningKind::NoNumeral => "no numeral",
            WarningKind::OutOfRange => "out of range",
        };
        f.write_str(s)
    }
}

/// A column that degraded to its default while extracting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldWarning {
    pub column: String,
    pub kind: WarningKind,
    /// Text that followed the label on the page.
    pub raw: String,
}

impl fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} in {:?}", self.column, self.kind, self.raw)
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub record: TypedRecord,
    pub warnings: Vec<FieldWarning>,
}

/// Applies a `FieldMapping` to trim pages.
pub struct FieldExtractor<'m> {
    mapping: &'m FieldMapping,
    labels: Vec<&'m str>,
    /// For each label, the longer labels of the mapping that start with it.
    extensions: HashMap<&'m str, Vec<&'m str>>,
}

impl<'m> FieldExtractor<'m> {
    pub fn new(mapping: &'m FieldMapping) -> Self {
        let labels: Vec<&str> = mapping.labels().collect();
        let extensions = labels
            .iter()
            .map(|&label| {
                let longer = labels
                    .iter()
                    .copied()
                    .filter(|other| other.len() > label.len() && other.starts_with(label))
                    .collect();
                (label, longer)
            })
            .collect();
        Self {
            mapping,
            labels,
            extensions,
        }
    }

    pub fn extract(&self, document: &Document, identity: TrimIdentity) -> Extraction {
        let blocks = split_blocks(&document.body);
        self.extract_blocks(&blocks, identity)
    }

    /// Fills a fresh record from pre-split blocks.
    pub fn extract_blocks(&self, blocks: &[RawFieldBlock], identity: TrimIdentity) -> Extraction {
        let mut record = self.mapping.empty_record(identity);
        let mut warnings = Vec::new();

        for rule in self.mapping.rules() {
            let Some(remainder) = self.locate(&rule.source_label, blocks) else {
                continue;
            };
            match parse_value(rule, remainder) {
                Ok(value) => {
                    record.set(&rule.output_column, value);
                }
                Err(kind) => warnings.push(FieldWarning {
                    column: rule.output_column.clone(),
                    kind,
                    raw: remainder.trim().to_string(),
                }),
            }
        }

        for rule in self.mapping.rules() {
            let Some(source) = &rule.fallback else {
                continue;
            };
            let current = record.get(&rule.output_column).cloned();
            if current.as_ref().is_some_and(FieldValue::is_absent) {
                if let Some(value) = record.get(source).filter(|v| !v.is_absent()).cloned() {
                    tracing::debug!(
                        "Filled {} from {} for {}",
                        rule.output_column,
                        source,
                        record.identity
                    );
                    record.set(&rule.output_column, value);
                }
            }
        }

        Extraction { record, warnings }
    }

    /// Text following `label` in the best matching block.
    ///
    /// Blocks that start with the label win over blocks that merely contain
    /// it, and occurrences that are really a longer mapped label (`fuel` inside
    /// `fuel tank capacity`) are passed over. An occurrence inside a block must
    /// start a word, and blocks that open with another field's label are not
    /// searched (`year` never matches in `warranty100000 km / 3 year(s)`).
    fn locate<'b>(&self, label: &str, blocks: &'b [RawFieldBlock]) -> Option<&'b str> {
        let longer = self.extensions.get(label).map(Vec::as_slice).unwrap_or(&[]);
        let is_longer_label = |rest: &str| longer.iter().any(|l| rest.starts_with(l));

        if let Some(block) = blocks
            .iter()
            .find(|b| b.text.starts_with(label) && !is_longer_label(&b.text))
        {
            return Some(&block.text[label.len()..]);
        }

        blocks
            .iter()
            .filter(|b| !self.owned_by_other(label, &b.text))
            .find_map(|b| {
                b.text
                    .match_indices(label)
                    .find(|(pos, _)| {
                        starts_word(&b.text, *pos) && !is_longer_label(&b.text[*pos..])
                    })
                    .map(|(pos, _)| &b.text[pos + label.len()..])
            })
    }

    /// Whether `text` opens with a mapped label other than `label` or one of its prefixes.
    fn owned_by_other(&self, label: &str, text: &str) -> bool {
        self.labels
            .iter()
            .any(|other| text.starts_with(other) && !label.starts_with(other))
    }
}

fn starts_word(text: &str, pos: usize) -> bool {
    text[..pos]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric())
}

/// Per-type coercion of the text that followed a label.
pub fn parse_value(rule: &FieldRule, remainder: &str) -> Result<FieldValue, WarningKind> {
    let text = remainder.trim();
    match rule.data_type {
        DataType::String => {
            if text.is_empty() {
                Err(WarningKind::EmptyValue)
            } else {
                Ok(FieldValue::Text(text.to_string()))
            }
        }
        DataType::Bool => Ok(FieldValue::Bool(parse_bool(text))),
        DataType::Int => {
            let numeral = nth_numeral(text, rule.segment)?;
            let digits: String = numeral
                .split('.')
                .next()
                .unwrap_or_default()
                .chars()
                .filter(char::is_ascii_digit)
                .collect();
            digits
                .parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|_| WarningKind::OutOfRange)
        }
        DataType::Float => {
            let numeral = nth_numeral(text, rule.segment)?;
            numeral
                .replace(',', "")
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| WarningKind::OutOfRange)
        }
    }
}

fn nth_numeral(text: &str, segment: Option<usize>) -> Result<&str, WarningKind> {
    let index = segment.unwrap_or(1).saturating_sub(1);
    NUMERAL
        .find_iter(text)
        .nth(index)
        .map(|m| m.as_str().trim_end_matches(','))
        .ok_or(if text.is_empty() {
            WarningKind::EmptyValue
        } else {
            WarningKind::NoNumeral
        })
}

fn parse_bool(text: &str) -> bool {
    let lowered = text.to_lowercase();
    !(lowered.is_empty() || NEGATIVE_MARKERS.contains(&lowered.as_str()))
}
