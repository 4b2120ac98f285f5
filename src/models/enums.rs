use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Unknown,
}

impl StatementType {
    /// Decide the statement kind from the leading keyword (case-insensitive).
    pub fn from_keyword(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "SELECT" => StatementType::Select,
            "INSERT" => StatementType::Insert,
            "UPDATE" => StatementType::Update,
            "DELETE" => StatementType::Delete,
            _ => StatementType::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatementType::Select => "SELECT",
            StatementType::Insert => "INSERT",
            StatementType::Update => "UPDATE",
            StatementType::Delete => "DELETE",
            StatementType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn from_keyword(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "INNER" => Some(JoinKind::Inner),
            "LEFT" => Some(JoinKind::Left),
            "RIGHT" => Some(JoinKind::Right),
            "FULL" => Some(JoinKind::Full),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn from_keyword(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFunction::Count),
            "SUM" => Some(AggregateFunction::Sum),
            "AVG" => Some(AggregateFunction::Avg),
            "MIN" => Some(AggregateFunction::Min),
            "MAX" => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operators accepted in WHERE / HAVING conditions.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum CompareOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "IN")]
    In,
}

impl CompareOp {
    /// Unrecognized operators fall back to `=`.
    pub fn normalize(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "=" | "==" => CompareOp::Eq,
            "!=" | "<>" => CompareOp::NotEq,
            ">" => CompareOp::Gt,
            "<" => CompareOp::Lt,
            ">=" => CompareOp::GtEq,
            "<=" => CompareOp::LtEq,
            "LIKE" => CompareOp::Like,
            "IN" => CompareOp::In,
            _ => CompareOp::Eq,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::GtEq => ">=",
            CompareOp::LtEq => "<=",
            CompareOp::Like => "LIKE",
            CompareOp::In => "IN",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOp {
    #[default]
    And,
    Or,
}

impl LogicalOp {
    pub fn from_keyword(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "AND" => Some(LogicalOp::And),
            "OR" => Some(LogicalOp::Or),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn from_keyword(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "ASC" => Some(SortDirection::Asc),
            "DESC" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// Output format for the command line front end.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}
