use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Loosely typed value stored in a document row.
///
/// Rows carry no column types, so every cell is one of these variants and
/// numeric coercion only happens where arithmetic needs it
/// (see [`Scalar::as_number`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// One document row: column name -> value, in insertion order.
pub type Row = IndexMap<String, Scalar>;

impl Scalar {
    pub fn text(value: impl Into<String>) -> Self {
        Scalar::Text(value.into())
    }

    /// Nested arrays/objects are not interpreted; they are kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Scalar::Null,
            serde_json::Value::Bool(b) => Scalar::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => n.as_f64().map(Scalar::Float).unwrap_or(Scalar::Null),
            },
            serde_json::Value::String(s) => Scalar::Text(s.clone()),
            other => Scalar::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Null or the empty string; neither counts toward `COUNT(col)`.
    pub fn is_blank(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Numeric view used by SUM/AVG/MIN/MAX and numeric comparisons.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) if !f.is_nan() => Some(*f),
            Scalar::Text(s) => s.trim().parse::<f64>().ok().filter(|f| !f.is_nan()),
            _ => None,
        }
    }

    /// Equality used by the join: Int and Float compare numerically, null never matches.
    pub fn loosely_equals(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Null, _) | (_, Scalar::Null) => false,
            (Scalar::Int(a), Scalar::Float(b)) | (Scalar::Float(b), Scalar::Int(a)) => {
                (*a as f64) == *b
            }
            (a, b) => a == b,
        }
    }

    /// Ordering used for predicate evaluation. Numbers (including numeric text
    /// compared against a number) order numerically; text orders lexically.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Null, _) | (_, Scalar::Null) => None,
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
            (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => Some(a.to_string().cmp(&b.to_string())),
            },
        }
    }

    /// String form used inside a composite group key; null becomes "".
    pub fn key_fragment(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("NULL"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

/// Convert a JSON object into a document row. Non-object input yields an empty row.
pub fn row_from_json(value: &serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), Scalar::from_json(v)))
            .collect(),
        _ => Row::new(),
    }
}

/// A stored row as handed out by a row store. `id` is opaque.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Row,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Row) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub id: String,
    pub name: String,
    /// Known column names in declaration order.
    pub columns: Vec<String>,
}

impl TableSchema {
    pub fn new(id: impl Into<String>, name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            columns,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSchema {
    pub project_id: String,
    pub tables: Vec<TableSchema>,
}

impl ProjectSchema {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(alias = "projectId")]
    pub project_id: String,
    pub query: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub query: String,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub affected_tables: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_from_json_keeps_scalars_and_stringifies_nested() {
        assert_eq!(Scalar::from_json(&json!(3)), Scalar::Int(3));
        assert_eq!(Scalar::from_json(&json!(2.5)), Scalar::Float(2.5));
        assert_eq!(Scalar::from_json(&json!("x")), Scalar::text("x"));
        assert_eq!(Scalar::from_json(&json!(null)), Scalar::Null);
        assert_eq!(Scalar::from_json(&json!([1, 2])), Scalar::text("[1,2]"));
    }

    #[test]
    fn untagged_serde_round_trips_row_values() {
        let row: Row = serde_json::from_value(json!({"a": 1, "b": "x", "c": null, "d": true})).unwrap();
        assert_eq!(row["a"], Scalar::Int(1));
        assert_eq!(row["c"], Scalar::Null);
        assert_eq!(serde_json::to_value(&row).unwrap(), json!({"a": 1, "b": "x", "c": null, "d": true}));
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(Scalar::text(" 12.5 ").as_number(), Some(12.5));
        assert_eq!(Scalar::text("abc").as_number(), None);
        assert_eq!(Scalar::Bool(true).as_number(), None);
        assert_eq!(Scalar::Null.as_number(), None);
    }

    #[test]
    fn loose_equality_ignores_int_float_split_but_not_nulls() {
        assert!(Scalar::Int(1).loosely_equals(&Scalar::Float(1.0)));
        assert!(!Scalar::Int(1).loosely_equals(&Scalar::text("1")));
        assert!(!Scalar::Null.loosely_equals(&Scalar::Null));
    }

    #[test]
    fn compare_is_numeric_for_numeric_text() {
        assert_eq!(Scalar::text("25").compare(&Scalar::Int(18)), Some(Ordering::Greater));
        assert_eq!(Scalar::text("b").compare(&Scalar::text("a")), Some(Ordering::Greater));
        assert_eq!(Scalar::Null.compare(&Scalar::Int(1)), None);
    }

    #[test]
    fn response_serializes_camel_case() {
        let resp = QueryResponse {
            query: "SELECT 1".into(),
            rows: vec![],
            row_count: 0,
            execution_time_ms: 3,
            affected_tables: vec!["users".into()],
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["rowCount"], json!(0));
        assert_eq!(v["executionTimeMs"], json!(3));
        assert_eq!(v["affectedTables"], json!(["users"]));
    }
}
