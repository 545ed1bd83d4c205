//! Identity keys and typed output rows.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Brand slug as it appears in catalog URLs (e.g. `hyundai`).
pub type BrandId = String;

/// Model slug as it appears in catalog URLs (e.g. `Accent-RB`).
pub type ModelId = String;

/// Identification columns written ahead of the schema columns in every dataset row.
pub const IDENTITY_COLUMNS: &[&str] = &["car_brand", "car_model", "car_trim", "model_year"];

/// Composite key for one sellable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TrimIdentity {
    pub brand: BrandId,
    pub model: ModelId,
    pub trim_label: String,
    pub model_year: Option<u16>,
}

impl TrimIdentity {
    pub fn new(
        brand: impl Into<String>,
        model: impl Into<String>,
        trim_label: impl Into<String>,
        model_year: Option<u16>,
    ) -> Self {
        Self {
            brand: brand.into(),
            model: model.into(),
            trim_label: trim_label.into(),
            model_year,
        }
    }

    /// Identity cells in `IDENTITY_COLUMNS` order.
    pub fn cells(&self) -> [String; 4] {
        [
            self.brand.clone(),
            self.model.clone(),
            self.trim_label.clone(),
            self.model_year.map(|y| y.to_string()).unwrap_or_default(),
        ]
    }
}

impl fmt::Display for TrimIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.brand, self.model, self.trim_label)?;
        match self.model_year {
            Some(year) => write!(f, "/{}", year),
            None => Ok(()),
        }
    }
}

/// One parsed cell. `Absent` is the sentinel for "not found or not parsable".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Absent,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    /// CSV rendering: absent values become empty cells.
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Absent => String::new(),
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Bool(v) => v.to_string(),
            FieldValue::Text(v) => v.clone(),
        }
    }
}

/// A schema-shaped row for exactly one trim.
///
/// The column set is fixed at construction from the field mapping; `set`
/// refuses columns outside it, so a record can never grow extra keys.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRecord {
    pub identity: TrimIdentity,
    columns: Arc<[String]>,
    values: Vec<FieldValue>,
}

impl TypedRecord {
    pub(crate) fn new(identity: TrimIdentity, columns: Arc<[String]>, values: Vec<FieldValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self {
            identity,
            columns,
            values,
        }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.position(column).map(|i| &self.values[i])
    }

    /// Overwrites a column value. Returns `false` if the column is not in the schema.
    pub fn set(&mut self, column: &str, value: FieldValue) -> bool {
        match self.position(column) {
            Some(i) => {
                self.values[i] = value;
                true
            }
            None => false,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Number of columns holding a non-absent value.
    pub fn populated(&self) -> usize {
        self.values.iter().filter(|v| !v.is_absent()).count()
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TypedRecord {
        let columns: Arc<[String]> = vec!["Transmission".to_string(), "ABS".to_string()].into();
        TypedRecord::new(
            TrimIdentity::new("kia", "sportage", "GT Line", Some(2024)),
            columns,
            vec![FieldValue::Absent, FieldValue::Bool(false)],
        )
    }

    #[test]
    fn set_rejects_unknown_columns() {
        let mut rec = record();
        assert!(rec.set("Transmission", FieldValue::Text("automatic".into())));
        assert!(!rec.set("Sunroof", FieldValue::Bool(true)));
        assert_eq!(rec.columns().len(), 2);
        assert_eq!(
            rec.get("Transmission"),
            Some(&FieldValue::Text("automatic".into()))
        );
    }

    #[test]
    fn cells_render_absent_as_empty() {
        assert_eq!(FieldValue::Absent.to_cell(), "");
        assert_eq!(FieldValue::Float(6.5).to_cell(), "6.5");
        assert_eq!(FieldValue::Bool(true).to_cell(), "true");
    }

    #[test]
    fn identity_display_includes_year_when_known() {
        let id = TrimIdentity::new("kia", "sportage", "GT Line", Some(2024));
        assert_eq!(id.to_string(), "kia/sportage/GT Line/2024");
        let id = TrimIdentity::new("kia", "sportage", "GT Line", None);
        assert_eq!(id.to_string(), "kia/sportage/GT Line");
        assert_eq!(id.cells()[3], "");
    }

    #[test]
    fn absent_serializes_as_null() {
        let json = serde_json::to_string(&vec![FieldValue::Absent, FieldValue::Int(3)]).unwrap();
        assert_eq!(json, "[null,3]");
    }
}
