//! Recursive-descent parser producing [`ParsedQuery`].
//!
//! Every clause parser takes the shared [`Cursor`] by `&mut`, consumes the
//! tokens it owns and stops at the first token that starts a later clause,
//! so optional clauses can be left out freely. Failures never escape
//! [`parse`]: they come back as `is_valid = false` with a message.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ast::{Aggregate, AliasMap, Condition, Join, JoinOn, OrderByItem, ParsedQuery};
use super::errors::QueryAstError;
use super::lexer::{Token, tokenize};
use crate::models::enums::{AggregateFunction, CompareOp, JoinKind, LogicalOp, SortDirection, StatementType};
use crate::models::structs::Scalar;

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));
static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+$").expect("valid regex"));

const JOIN_START: &[&str] = &["JOIN", "INNER", "LEFT", "RIGHT", "FULL"];
const FROM_STOP: &[&str] = &["JOIN", "INNER", "LEFT", "RIGHT", "FULL", "ON", "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "OFFSET"];
const WHERE_STOP: &[&str] = &["JOIN", "INNER", "LEFT", "RIGHT", "FULL", "GROUP", "HAVING", "ORDER", "LIMIT", "OFFSET"];
const GROUP_STOP: &[&str] = &["HAVING", "ORDER", "LIMIT", "OFFSET"];
const HAVING_STOP: &[&str] = &["ORDER", "LIMIT", "OFFSET"];
const ORDER_STOP: &[&str] = &["LIMIT", "OFFSET"];

type ParseResult<T> = Result<T, QueryAstError>;

fn syntax(msg: impl Into<String>) -> QueryAstError {
    QueryAstError::Parse(msg.into())
}

/// Read position over a token slice.
pub struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    pub fn advance(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    pub fn at_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    pub fn at_punct(&self, ch: char) -> bool {
        self.peek().is_some_and(|t| t.is_punct(ch))
    }

    /// True at end of input, at `;`, or at any of `keywords`.
    pub fn at_boundary(&self, keywords: &[&str]) -> bool {
        match self.peek() {
            None => true,
            Some(t) => t.is_punct(';') || t.is_any_keyword(keywords),
        }
    }

    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn remaining(&self) -> &'a [Token] {
        &self.tokens[self.pos.min(self.tokens.len())..]
    }
}

/// Tokenize and parse in one step.
pub fn parse_sql(sql: &str) -> ParsedQuery {
    parse(&tokenize(sql))
}

pub fn parse(tokens: &[Token]) -> ParsedQuery {
    let Some(first) = tokens.first() else {
        return ParsedQuery::invalid(StatementType::Unknown, "empty query");
    };
    let statement_type = StatementType::from_keyword(first.as_str());
    let mut cursor = Cursor::new(tokens);
    let result = match statement_type {
        StatementType::Select => parse_select(&mut cursor),
        StatementType::Insert => parse_insert(&mut cursor),
        StatementType::Update => parse_update(&mut cursor),
        StatementType::Delete => parse_delete(&mut cursor),
        StatementType::Unknown => Err(syntax(format!("unsupported statement type '{}'", first))),
    };
    match result {
        Ok(query) => {
            let rest = cursor.remaining();
            if !rest.iter().all(|t| t.is_punct(';')) {
                log::debug!("ignoring {} trailing token(s) starting at '{}'", rest.len(), rest[0]);
            }
            query
        }
        Err(QueryAstError::Parse(msg)) => ParsedQuery::invalid(statement_type, msg),
        Err(other) => ParsedQuery::invalid(statement_type, other.to_string()),
    }
}

fn parse_select(cursor: &mut Cursor<'_>) -> ParseResult<ParsedQuery> {
    cursor.advance(); // SELECT
    let mut query = ParsedQuery::new(StatementType::Select);

    let (columns, aggregates) = parse_select_list(cursor)?;
    query.columns = columns;
    query.aggregates = aggregates;

    if !cursor.eat_keyword("FROM") {
        return Err(syntax("FROM keyword expected"));
    }
    let mut aliases = AliasMap::new();
    let mut tables = parse_from(cursor, &mut aliases)?;
    if tables.is_empty() {
        return Err(syntax("table name expected after FROM"));
    }
    let joins = parse_joins(cursor, &mut aliases)?;
    for join in &joins {
        if !tables.contains(&join.table) {
            tables.push(join.table.clone());
        }
    }
    query.tables = tables;
    query.joins = joins;
    query.table_aliases = aliases;

    query.conditions = parse_where(cursor)?;
    query.group_by = parse_group_by(cursor)?;
    query.having = parse_having(cursor)?;
    query.order_by = parse_order_by(cursor)?;
    let (limit, offset) = parse_limit_offset(cursor);
    query.limit = limit;
    query.offset = offset;
    Ok(query)
}

/// Select list up to FROM. `COUNT ( * )` style token runs are folded back into
/// one aggregate; everything else except commas is kept verbatim.
fn parse_select_list(cursor: &mut Cursor<'_>) -> ParseResult<(Vec<String>, Vec<Aggregate>)> {
    let mut columns = Vec::new();
    let mut aggregates = Vec::new();

    while let Some(tok) = cursor.peek() {
        if tok.is_keyword("FROM") {
            break;
        }
        cursor.advance();
        if tok.is_punct(',') {
            continue;
        }
        if let Some(function) = AggregateFunction::from_keyword(tok.as_str())
            && cursor.at_punct('(')
        {
            cursor.advance();
            let column = collect_until_close_paren(cursor)
                .ok_or_else(|| syntax(format!("unclosed parenthesis after {}", function)))?;
            let alias = if cursor.eat_keyword("AS") {
                Some(cursor.advance().ok_or_else(|| syntax("alias expected after AS"))?.to_string())
            } else {
                None
            };
            let aggregate = Aggregate { function, column: column.trim().to_string(), alias };
            columns.push(aggregate.output_name());
            aggregates.push(aggregate);
            continue;
        }
        columns.push(tok.to_string());
    }
    Ok((columns, aggregates))
}

/// Concatenate tokens up to the `)` matching an already consumed `(`.
fn collect_until_close_paren(cursor: &mut Cursor<'_>) -> Option<String> {
    let mut depth = 0usize;
    let mut out = String::new();
    while let Some(tok) = cursor.advance() {
        if tok.is_punct(')') {
            if depth == 0 {
                return Some(out);
            }
            depth -= 1;
        } else if tok.is_punct('(') {
            depth += 1;
        }
        out.push_str(tok.as_str());
    }
    None
}

fn parse_from(cursor: &mut Cursor<'_>, aliases: &mut AliasMap) -> ParseResult<Vec<String>> {
    let mut tables: Vec<String> = Vec::new();
    while !cursor.at_boundary(FROM_STOP) {
        let Some(tok) = cursor.advance() else { break };
        if tok.is_punct(',') {
            continue;
        }
        let table = tok.to_string();
        if let Some(alias) = parse_table_alias(cursor, FROM_STOP)? {
            aliases.insert(alias, table.clone());
        }
        if !tables.contains(&table) {
            tables.push(table);
        }
    }
    Ok(tables)
}

/// `AS alias`, or a bare alias when the next token does not open a clause.
fn parse_table_alias(cursor: &mut Cursor<'_>, stop: &[&str]) -> ParseResult<Option<String>> {
    if cursor.eat_keyword("AS") {
        let alias = cursor.advance().ok_or_else(|| syntax("alias expected after AS"))?;
        return Ok(Some(alias.to_string()));
    }
    if cursor.at_boundary(stop) || cursor.at_punct(',') {
        return Ok(None);
    }
    Ok(cursor.advance().map(|t| t.to_string()))
}

fn parse_joins(cursor: &mut Cursor<'_>, aliases: &mut AliasMap) -> ParseResult<Vec<Join>> {
    let mut joins = Vec::new();
    while let Some(tok) = cursor.peek() {
        if !tok.is_any_keyword(JOIN_START) {
            break;
        }
        cursor.advance();
        let kind = if tok.is_keyword("JOIN") {
            JoinKind::Inner
        } else {
            // INNER/LEFT/RIGHT/FULL [OUTER] JOIN
            let kind = JoinKind::from_keyword(tok.as_str()).unwrap_or_default();
            cursor.eat_keyword("OUTER");
            if !cursor.eat_keyword("JOIN") {
                return Err(syntax(format!("JOIN expected after {}", kind)));
            }
            kind
        };

        if cursor.at_boundary(FROM_STOP) {
            return Err(syntax("table name expected after JOIN"));
        }
        let table = cursor.advance().map(|t| t.to_string()).unwrap_or_default();
        let alias = parse_table_alias(cursor, FROM_STOP)?;
        if let Some(alias) = &alias {
            aliases.insert(alias.clone(), table.clone());
        }

        if !cursor.eat_keyword("ON") {
            return Err(syntax(format!("ON expected after JOIN {}", table)));
        }
        let (Some(left), Some(operator), Some(right)) = (cursor.advance(), cursor.advance(), cursor.advance()) else {
            return Err(syntax("incomplete ON clause"));
        };
        if cursor.peek().is_some_and(|t| LogicalOp::from_keyword(t.as_str()).is_some()) {
            return Err(QueryAstError::unsupported("compound JOIN ON predicate"));
        }
        joins.push(Join {
            kind,
            table,
            alias,
            on: JoinOn { left: left.to_string(), operator: operator.to_string(), right: right.to_string() },
        });
    }
    Ok(joins)
}

fn parse_where(cursor: &mut Cursor<'_>) -> ParseResult<Vec<Condition>> {
    if !cursor.eat_keyword("WHERE") {
        return Ok(Vec::new());
    }
    parse_conditions(cursor, WHERE_STOP)
}

fn parse_having(cursor: &mut Cursor<'_>) -> ParseResult<Vec<Condition>> {
    if !cursor.eat_keyword("HAVING") {
        return Ok(Vec::new());
    }
    parse_conditions(cursor, HAVING_STOP)
}

/// Shared WHERE/HAVING routine: `<column> <operator> <value> [AND|OR] ...`.
fn parse_conditions(cursor: &mut Cursor<'_>, stop: &[&str]) -> ParseResult<Vec<Condition>> {
    let mut conditions = Vec::new();
    while !cursor.at_boundary(stop) {
        let Some(mut condition) = parse_condition(cursor)? else { break };
        if let Some(op) = cursor.peek().and_then(|t| LogicalOp::from_keyword(t.as_str())) {
            cursor.advance();
            condition.logical_operator = Some(op);
        }
        conditions.push(condition);
    }
    Ok(conditions)
}

fn parse_condition(cursor: &mut Cursor<'_>) -> ParseResult<Option<Condition>> {
    let (Some(column), Some(operator)) = (cursor.advance(), cursor.advance()) else {
        return Ok(None);
    };
    let operator = CompareOp::normalize(operator.as_str());
    let Some(value_tok) = cursor.advance() else {
        return Ok(None);
    };
    let value = if operator == CompareOp::In && value_tok.is_punct('(') {
        let list = collect_until_close_paren(cursor).ok_or_else(|| syntax("unclosed IN list"))?;
        Scalar::Text(list)
    } else {
        coerce_value(value_tok)
    };
    Ok(Some(Condition::new(column.as_str(), operator, value)))
}

/// Literal coercion: quoted -> text, digits -> int, digits.digits -> float,
/// true/false -> bool, NULL -> null, anything else stays text.
pub fn coerce_value(token: &Token) -> Scalar {
    if let Some(inner) = token.unquoted() {
        return Scalar::text(inner);
    }
    let raw = token.as_str();
    if INTEGER.is_match(raw) {
        return match raw.parse::<i64>() {
            Ok(i) => Scalar::Int(i),
            Err(_) => raw.parse::<f64>().map(Scalar::Float).unwrap_or_else(|_| Scalar::text(raw)),
        };
    }
    if DECIMAL.is_match(raw) {
        if let Ok(f) = raw.parse::<f64>() {
            return Scalar::Float(f);
        }
    }
    if raw.eq_ignore_ascii_case("true") {
        return Scalar::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Scalar::Bool(false);
    }
    if raw.eq_ignore_ascii_case("null") {
        return Scalar::Null;
    }
    Scalar::text(raw)
}

fn parse_group_by(cursor: &mut Cursor<'_>) -> ParseResult<Vec<String>> {
    if !cursor.eat_keyword("GROUP") {
        return Ok(Vec::new());
    }
    if !cursor.eat_keyword("BY") {
        return Err(syntax("BY expected after GROUP"));
    }
    let mut columns = Vec::new();
    while !cursor.at_boundary(GROUP_STOP) {
        let Some(tok) = cursor.advance() else { break };
        if !tok.is_punct(',') {
            columns.push(tok.to_string());
        }
    }
    Ok(columns)
}

fn parse_order_by(cursor: &mut Cursor<'_>) -> ParseResult<Vec<OrderByItem>> {
    if !cursor.eat_keyword("ORDER") {
        return Ok(Vec::new());
    }
    if !cursor.eat_keyword("BY") {
        return Err(syntax("BY expected after ORDER"));
    }
    let mut items = Vec::new();
    while !cursor.at_boundary(ORDER_STOP) {
        let Some(tok) = cursor.advance() else { break };
        if tok.is_punct(',') {
            continue;
        }
        let direction = match cursor.peek().and_then(|t| SortDirection::from_keyword(t.as_str())) {
            Some(dir) => {
                cursor.advance();
                dir
            }
            None => SortDirection::Asc,
        };
        items.push(OrderByItem { column: tok.to_string(), direction });
    }
    Ok(items)
}

/// LIMIT/OFFSET each take one all-digit token; anything else leaves the field unset.
fn parse_limit_offset(cursor: &mut Cursor<'_>) -> (Option<u64>, Option<u64>) {
    let limit = take_count(cursor, "LIMIT");
    let offset = take_count(cursor, "OFFSET");
    (limit, offset)
}

fn take_count(cursor: &mut Cursor<'_>, keyword: &str) -> Option<u64> {
    if !cursor.eat_keyword(keyword) {
        return None;
    }
    cursor.advance().filter(|t| INTEGER.is_match(t.as_str())).and_then(|t| t.as_str().parse().ok())
}

fn parse_insert(cursor: &mut Cursor<'_>) -> ParseResult<ParsedQuery> {
    cursor.advance(); // INSERT
    if !cursor.eat_keyword("INTO") {
        return Err(syntax("INSERT INTO expected"));
    }
    let table = cursor.advance().ok_or_else(|| syntax("table name expected"))?;
    let mut query = ParsedQuery::new(StatementType::Insert);
    query.tables.push(table.to_string());
    if cursor.at_punct('(') {
        cursor.advance();
        while let Some(tok) = cursor.advance() {
            if tok.is_punct(')') {
                break;
            }
            if !tok.is_punct(',') {
                query.columns.push(tok.to_string());
            }
        }
    }
    // VALUES are not needed to validate the statement
    while cursor.advance().is_some() {}
    Ok(query)
}

fn parse_update(cursor: &mut Cursor<'_>) -> ParseResult<ParsedQuery> {
    cursor.advance(); // UPDATE
    let table = cursor.advance().ok_or_else(|| syntax("table name expected"))?;
    if !cursor.eat_keyword("SET") {
        return Err(syntax("SET keyword expected"));
    }
    while cursor.peek().is_some() && !cursor.at_keyword("WHERE") {
        cursor.advance();
    }
    let mut query = ParsedQuery::new(StatementType::Update);
    query.tables.push(table.to_string());
    query.conditions = parse_where(cursor)?;
    Ok(query)
}

fn parse_delete(cursor: &mut Cursor<'_>) -> ParseResult<ParsedQuery> {
    cursor.advance(); // DELETE
    if !cursor.eat_keyword("FROM") {
        return Err(syntax("DELETE FROM expected"));
    }
    let table = cursor.advance().ok_or_else(|| syntax("table name expected"))?;
    let mut query = ParsedQuery::new(StatementType::Delete);
    query.tables.push(table.to_string());
    query.conditions = parse_where(cursor)?;
    Ok(query)
}
