//! Transaction catalog: the set of entrypoints a run exercises.
//!
//! The catalog is loaded once from a JSON document of the shape
//!
//! ```text
//! { "transactions": [
//!   { "service_name": "activity", "code": 5,
//!     "input_types": [ { "type": "i32", "range": [0, 10] } ] }
//! ] }
//! ```
//!
//! and is shared read-only (`Arc<Catalog>`) by every worker. Entries with a
//! missing `service_name` or `code` are kept so they can be reported when
//! executed.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::fuzz::value_gen::InputTag;

/// A loaded, immutable transaction catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Transactions in file order. A missing key yields an empty catalog.
    #[serde(default)]
    pub transactions: Vec<TransactionSpec>,
}

impl Catalog {
    /// Load a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!("JSON file not found: {}", path.display()));
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read catalog {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parse catalog {}", path.display()))
    }

    /// Parse a catalog from JSON text.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// One configured entrypoint and its argument schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionSpec {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub input_types: Vec<InputTypeSpec>,
}

impl TransactionSpec {
    /// The `(service_name, code)` pair, if both are present and the name is
    /// non-empty.
    pub fn target(&self) -> Option<(&str, i64)> {
        let name = self.service_name.as_deref().filter(|s| !s.is_empty())?;
        Some((name, self.code?))
    }
}

/// Type tag plus constraints for one argument slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputTypeSpec {
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<(Bound, Bound)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<(Bound, Bound)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num: Option<i64>,
}

impl InputTypeSpec {
    /// Slot with only a type tag.
    pub fn of(type_name: &str) -> Self {
        Self {
            type_name: Some(type_name.to_string()),
            ..Default::default()
        }
    }

    pub fn with_range(mut self, min: impl Into<Bound>, max: impl Into<Bound>) -> Self {
        self.range = Some((min.into(), max.into()));
        self
    }

    pub fn with_length(mut self, min: u32, max: u32) -> Self {
        self.length = Some((Bound::Int(min as i64), Bound::Int(max as i64)));
        self
    }

    pub fn with_file(mut self, file: &str) -> Self {
        self.file = Some(file.to_string());
        self
    }

    pub fn with_num(mut self, num: i64) -> Self {
        self.num = Some(num);
        self
    }

    /// The parsed tag, or `None` when the type is missing or unrecognized.
    pub fn tag(&self) -> Option<InputTag> {
        self.type_name.as_deref().and_then(InputTag::parse)
    }

    /// Type name as written in the catalog, for diagnostics.
    pub fn type_label(&self) -> &str {
        self.type_name.as_deref().unwrap_or("<missing>")
    }
}

/// A numeric constraint bound. Integer bounds keep full `i64` precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    Int(i64),
    Float(f64),
}

impl Bound {
    pub fn as_i64(self) -> i64 {
        match self {
            Bound::Int(v) => v,
            // `as` saturates at the i64 limits and maps NaN to 0
            Bound::Float(v) => v as i64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Bound::Int(v) => v as f64,
            Bound::Float(v) => v,
        }
    }
}

impl From<i64> for Bound {
    fn from(v: i64) -> Self {
        Bound::Int(v)
    }
}

impl From<f64> for Bound {
    fn from(v: f64) -> Self {
        Bound::Float(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_catalog() {
        let catalog = Catalog::from_json(
            r#"{ "transactions": [
                { "service_name": "activity", "code": 5,
                  "input_types": [
                    { "type": "i32", "range": [0, 10] },
                    { "type": "f", "range": [-1.5, 2.5] },
                    { "type": "s16", "length": [3, 4] },
                    { "type": "fd", "file": "/dev/null" },
                    { "type": "nfd", "num": 3 }
                  ] }
            ] }"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 1);
        let tx = &catalog.transactions[0];
        assert_eq!(tx.target(), Some(("activity", 5)));
        assert_eq!(tx.input_types.len(), 5);
        assert_eq!(
            tx.input_types[0].range,
            Some((Bound::Int(0), Bound::Int(10)))
        );
        assert_eq!(
            tx.input_types[1].range,
            Some((Bound::Float(-1.5), Bound::Float(2.5)))
        );
        assert_eq!(tx.input_types[3].file.as_deref(), Some("/dev/null"));
        assert_eq!(tx.input_types[4].num, Some(3));
    }

    #[test]
    fn test_missing_transactions_key_is_empty() {
        let catalog = Catalog::from_json(r#"{ "other": 1 }"#).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_invalid_entries_survive_loading() {
        let catalog = Catalog::from_json(
            r#"{ "transactions": [ { "code": 1 }, { "service_name": "", "code": 2 }, { "service_name": "x" } ] }"#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 3);
        assert!(catalog.transactions.iter().all(|tx| tx.target().is_none()));
    }

    #[test]
    fn test_unknown_tag_parses_but_has_no_tag() {
        let slot: InputTypeSpec = serde_json::from_str(r#"{ "type": "bool" }"#).unwrap();
        assert_eq!(slot.tag(), None);
        assert_eq!(slot.type_label(), "bool");
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = Catalog::load(Path::new("/nonexistent/services.json")).unwrap_err();
        assert!(err.to_string().contains("JSON file not found"));
    }

    #[test]
    fn test_bound_conversions() {
        assert_eq!(Bound::Float(7.9).as_i64(), 7);
        assert_eq!(Bound::Int(3).as_f64(), 3.0);
        assert_eq!(Bound::Float(f64::MAX).as_i64(), i64::MAX);
    }
}
