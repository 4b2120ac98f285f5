//! Structured description of one SQL statement, handed from parser to executor.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::enums::{AggregateFunction, CompareOp, JoinKind, LogicalOp, SortDirection, StatementType};
use crate::models::structs::Scalar;

/// alias -> real table name, built per query from FROM and JOIN clauses.
pub type AliasMap = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub column: String,
    pub operator: CompareOp,
    pub value: Scalar,
    /// Connector that follows this condition (`a = 1 AND ...` puts AND on `a = 1`).
    pub logical_operator: Option<LogicalOp>,
}

impl Condition {
    pub fn new(column: impl Into<String>, operator: CompareOp, value: Scalar) -> Self {
        Self { column: column.into(), operator, value, logical_operator: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinOn {
    pub left: String,
    pub operator: String,
    pub right: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: Option<String>,
    pub on: JoinOn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderByItem {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Aggregate {
    pub function: AggregateFunction,
    /// Column expression as written, e.g. `*`, `total`, `o.total`.
    pub column: String,
    pub alias: Option<String>,
}

impl Aggregate {
    /// Key used in the select list and in result rows: the alias, or `count_*` style.
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => format!("{}_{}", self.function.as_str().to_ascii_lowercase(), self.column),
        }
    }

    pub fn is_count_star(&self) -> bool {
        self.function == AggregateFunction::Count && self.column == "*"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedQuery {
    pub statement_type: StatementType,
    pub tables: Vec<String>,
    pub columns: Vec<String>,
    pub conditions: Vec<Condition>,
    pub joins: Vec<Join>,
    pub order_by: Vec<OrderByItem>,
    pub group_by: Vec<String>,
    pub having: Vec<Condition>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub aggregates: Vec<Aggregate>,
    pub table_aliases: AliasMap,
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ParsedQuery {
    pub fn new(statement_type: StatementType) -> Self {
        Self {
            statement_type,
            tables: Vec::new(),
            columns: Vec::new(),
            conditions: Vec::new(),
            joins: Vec::new(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            limit: None,
            offset: None,
            aggregates: Vec::new(),
            table_aliases: AliasMap::new(),
            is_valid: true,
            error: None,
        }
    }

    pub fn invalid(statement_type: StatementType, error: impl Into<String>) -> Self {
        Self { is_valid: false, error: Some(error.into()), ..Self::new(statement_type) }
    }

    pub fn is_aggregate(&self) -> bool {
        !self.aggregates.is_empty() || !self.group_by.is_empty()
    }

    pub fn selects_all(&self) -> bool {
        self.columns.iter().any(|c| c == "*")
    }
}
