//! Quote-aware tokenizer.
//!
//! Tokens are plain text slices of the normalized query: identifiers,
//! operators, single punctuation characters (`(`, `)`, `,`, `;`) and quoted
//! literals. Quoted literals keep their delimiting quotes so the parser can
//! tell `'name'` (a string) from `name` (a column).
//!
//! Doubled-quote escaping (`'it''s'`) is not recognized: the first matching
//! quote closes the literal.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

static ESCAPED_CONTROL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\[ntr]").expect("valid regex"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(text: impl Into<String>) -> Self {
        Token(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.0.eq_ignore_ascii_case(keyword)
    }

    pub fn is_any_keyword(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.is_keyword(k))
    }

    pub fn is_punct(&self, ch: char) -> bool {
        let mut chars = self.0.chars();
        chars.next() == Some(ch) && chars.next().is_none()
    }

    /// Literal delimited by matching single or double quotes.
    pub fn is_quoted(&self) -> bool {
        let s = self.0.as_str();
        s.len() >= 2
            && ((s.starts_with('\'') && s.ends_with('\''))
                || (s.starts_with('"') && s.ends_with('"')))
    }

    /// Content between the quotes, if this is a quoted literal.
    pub fn unquoted(&self) -> Option<&str> {
        if self.is_quoted() {
            Some(&self.0[1..self.0.len() - 1])
        } else {
            None
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Replace escaped and real control whitespace with spaces, collapse runs, trim.
///
/// Queries coming through JSON transports often still carry literal `\n`
/// sequences, so those are treated the same as real newlines.
pub fn normalize(sql: &str) -> String {
    let unescaped = ESCAPED_CONTROL.replace_all(sql, " ");
    WHITESPACE_RUN.replace_all(&unescaped, " ").trim().to_string()
}

pub fn tokenize(sql: &str) -> Vec<Token> {
    let normalized = normalize(sql);
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in normalized.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == q {
                tokens.push(Token(std::mem::take(&mut current)));
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => {
                flush(&mut current, &mut tokens);
                current.push(ch);
                quote = Some(ch);
            }
            '(' | ')' | ',' | ';' => {
                flush(&mut current, &mut tokens);
                tokens.push(Token(ch.to_string()));
            }
            c if c.is_whitespace() => flush(&mut current, &mut tokens),
            c => current.push(c),
        }
    }
    // unterminated quote or trailing word
    flush(&mut current, &mut tokens);
    tokens
}

fn flush(current: &mut String, tokens: &mut Vec<Token>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        tokens.push(Token(trimmed.to_string()));
    }
    current.clear();
}
