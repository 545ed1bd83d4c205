//! Declarative output schema: which page label feeds which column, and as what type.
//!
//! The mapping is loaded once at startup from YAML or CSV and is immutable for
//! the rest of the run. Any inconsistency is a load error; the harvest never
//! starts without a valid schema.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{FieldValue, TrimIdentity, TypedRecord, IDENTITY_COLUMNS};

/// Error types for field mapping loading and validation.
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Failed to read mapping file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse mapping YAML: {0}")]
    YamlParse(#[from] serde_yml::Error),
    #[error("Failed to parse mapping CSV: {0}")]
    CsvParse(#[from] csv::Error),
    #[error("Unsupported mapping file format: {0} (expected .yaml, .yml or .csv)")]
    UnsupportedFormat(String),
    #[error("Mapping declares no rules")]
    Empty,
    #[error("Rule {index} ({column}): {reason}")]
    InvalidRule {
        index: usize,
        column: String,
        reason: String,
    },
    #[error("Duplicate output column: {0}")]
    DuplicateColumn(String),
    #[error("Output column {0} collides with an identification column")]
    ReservedColumn(String),
    #[error("Source label {label:?} is declared as both {first} and {second}")]
    ConflictingLabel {
        label: String,
        first: DataType,
        second: DataType,
    },
    #[error("Column {column}: fallback {fallback} {reason}")]
    InvalidFallback {
        column: String,
        fallback: String,
        reason: String,
    },
}

/// Closed set of column types. Each variant has exactly one parser in `extract`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[serde(alias = "integer")]
    Int,
    #[serde(alias = "double")]
    Float,
    #[serde(alias = "boolean")]
    Bool,
    #[serde(alias = "str", alias = "text")]
    String,
}

impl DataType {
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Int | DataType::Float)
    }

    /// Value a column holds when its label is not found on the page.
    pub fn default_value(self) -> FieldValue {
        match self {
            DataType::Bool => FieldValue::Bool(false),
            _ => FieldValue::Absent,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Bool => "bool",
            DataType::String => "string",
        };
        f.write_str(name)
    }
}

/// One output column and how to recognize it in page text.
///
/// Header aliases accept the legacy `features_mapping.csv` layout
/// (`website,output_csv,d_type`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FieldRule {
    #[serde(alias = "output_csv")]
    pub output_column: String,
    #[serde(alias = "website")]
    pub source_label: String,
    #[serde(alias = "d_type")]
    pub data_type: DataType,
    /// 1-based index of the numeral to take from the value text. Lets two
    /// numeric rules split one block such as `100000 km / 3 year(s)`.
    #[serde(default)]
    pub segment: Option<usize>,
    /// Column whose value is copied in when this column stays absent.
    #[serde(default)]
    pub fallback: Option<String>,
}

impl FieldRule {
    pub fn new(output_column: &str, source_label: &str, data_type: DataType) -> Self {
        Self {
            output_column: output_column.to_string(),
            source_label: source_label.to_string(),
            data_type,
            segment: None,
            fallback: None,
        }
    }

    pub fn with_segment(mut self, segment: usize) -> Self {
        self.segment = Some(segment);
        self
    }

    pub fn with_fallback(mut self, column: &str) -> Self {
        self.fallback = Some(column.to_string());
        self
    }
}

#[derive(Deserialize, Debug)]
struct MappingFile {
    rules: Vec<FieldRule>,
}

/// The validated, ordered schema.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    rules: Vec<FieldRule>,
    columns: Arc<[String]>,
    by_column: HashMap<String, usize>,
    by_label: HashMap<String, Vec<usize>>,
}

impl FieldMapping {
    /// Validates rules and builds the lookup indexes.
    pub fn new(rules: Vec<FieldRule>) -> Result<Self, MappingError> {
        if rules.is_empty() {
            return Err(MappingError::Empty);
        }

        let mut by_column = HashMap::new();
        let mut by_label: HashMap<String, Vec<usize>> = HashMap::new();
        let mut label_types: HashMap<&str, DataType> = HashMap::new();
        let reserved: HashSet<&str> = IDENTITY_COLUMNS.iter().copied().collect();

        for (index, rule) in rules.iter().enumerate() {
            let invalid = |reason: &str| MappingError::InvalidRule {
                index,
                column: rule.output_column.clone(),
                reason: reason.to_string(),
            };

            if rule.output_column.trim().is_empty() {
                return Err(invalid("empty output column"));
            }
            if rule.source_label.trim().is_empty() {
                return Err(invalid("empty source label"));
            }
            if reserved.contains(rule.output_column.as_str()) {
                return Err(MappingError::ReservedColumn(rule.output_column.clone()));
            }
            match rule.segment {
                Some(0) => return Err(invalid("segment is 1-based")),
                Some(_) if !rule.data_type.is_numeric() => {
                    return Err(invalid("segment is only allowed on int or float rules"))
                }
                _ => {}
            }

            if by_column.insert(rule.output_column.clone(), index).is_some() {
                return Err(MappingError::DuplicateColumn(rule.output_column.clone()));
            }

            match label_types.get(rule.source_label.as_str()) {
                Some(&first) if first != rule.data_type => {
                    return Err(MappingError::ConflictingLabel {
                        label: rule.source_label.clone(),
                        first,
                        second: rule.data_type,
                    });
                }
                Some(_) => {}
                None => {
                    label_types.insert(&rule.source_label, rule.data_type);
                }
            }
            by_label
                .entry(rule.source_label.clone())
                .or_default()
                .push(index);
        }

        for rule in &rules {
            let Some(fallback) = &rule.fallback else {
                continue;
            };
            let reason = match by_column.get(fallback) {
                None => Some("is not a declared column"),
                Some(&i) if rules[i].data_type != rule.data_type => Some("has a different type"),
                Some(_) if fallback == &rule.output_column => Some("refers to itself"),
                Some(_) => None,
            };
            if let Some(reason) = reason {
                return Err(MappingError::InvalidFallback {
                    column: rule.output_column.clone(),
                    fallback: fallback.clone(),
                    reason: reason.to_string(),
                });
            }
        }

        let columns: Arc<[String]> = rules
            .iter()
            .map(|r| r.output_column.clone())
            .collect::<Vec<_>>()
            .into();

        Ok(Self {
            rules,
            columns,
            by_column,
            by_label,
        })
    }

    /// Loads a mapping file, choosing the parser from the extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MappingError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let mapping = match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&content)?,
            "csv" => Self::from_csv_reader(content.as_bytes())?,
            _ => return Err(MappingError::UnsupportedFormat(path.display().to_string())),
        };
        tracing::info!(
            "Loaded {} field rules from {}",
            mapping.len(),
            path.display()
        );
        Ok(mapping)
    }

    pub fn from_yaml_str(yaml_content: &str) -> Result<Self, MappingError> {
        let file: MappingFile = serde_yml::from_str(yaml_content)?;
        Self::new(file.rules)
    }

    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Self, MappingError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(reader);
        let rules = rdr
            .deserialize::<FieldRule>()
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(rules)
    }

    /// The mapping shipped with the library (`config/field_mapping.yaml`).
    pub fn builtin() -> Result<Self, MappingError> {
        Self::from_yaml_str(include_str!("../config/field_mapping.yaml"))
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn by_column(&self, column: &str) -> Option<&FieldRule> {
        self.by_column.get(column).map(|&i| &self.rules[i])
    }

    /// All rules reading from `label`, in declaration order.
    pub fn by_label(&self, label: &str) -> Vec<&FieldRule> {
        self.by_label
            .get(label)
            .map(|idx| idx.iter().map(|&i| &self.rules[i]).collect())
            .unwrap_or_default()
    }

    /// Distinct source labels.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.by_label.keys().map(String::as_str)
    }

    /// A record with every column at its type default.
    pub fn empty_record(&self, identity: TrimIdentity) -> TypedRecord {
        let values = self
            .rules
            .iter()
            .map(|r| r.data_type.default_value())
            .collect();
        TypedRecord::new(identity, Arc::clone(&self.columns), values)
    }
}
