//! Metadata filter expressions for the vector collection
//!
//! The collection contract accepts filters as boolean expressions over the
//! sidecar metadata fields, e.g. `workspace = "w1" and (status = "active" or
//! status = "pending")`. The engine builds expressions with [`FilterExpr`]
//! and renders them to the string form; the collection parses the string
//! back and translates it into a parameterised SQL condition, so literal
//! values never reach the SQL text.

use crate::error::{Result, ZmemError};

/// A boolean filter over metadata fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    /// `field = "value"`
    Eq(String, String),
    /// Conjunction of sub-expressions
    And(Vec<FilterExpr>),
    /// Disjunction of sub-expressions
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    pub fn eq(field: &str, value: &str) -> Self {
        FilterExpr::Eq(field.to_string(), value.to_string())
    }

    /// Disjunction of equality checks over one field. Empty input yields
    /// `None` (no constraint).
    pub fn any_of<'a>(field: &str, values: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let clauses: Vec<FilterExpr> = values
            .into_iter()
            .map(|v| FilterExpr::eq(field, v))
            .collect();
        match clauses.len() {
            0 => None,
            1 => Some(clauses.into_iter().next().unwrap()),
            _ => Some(FilterExpr::Or(clauses)),
        }
    }

    /// Conjunction of optional sub-expressions, skipping the absent ones.
    pub fn all_of(clauses: impl IntoIterator<Item = Option<FilterExpr>>) -> Option<Self> {
        let clauses: Vec<FilterExpr> = clauses.into_iter().flatten().collect();
        match clauses.len() {
            0 => None,
            1 => Some(clauses.into_iter().next().unwrap()),
            _ => Some(FilterExpr::And(clauses)),
        }
    }

    /// Render to the wire form with string literals escaped.
    pub fn render(&self) -> String {
        match self {
            FilterExpr::Eq(field, value) => {
                format!("{} = \"{}\"", field, escape_literal(value))
            }
            FilterExpr::And(clauses) => clauses
                .iter()
                .map(|c| c.render_grouped())
                .collect::<Vec<_>>()
                .join(" and "),
            FilterExpr::Or(clauses) => clauses
                .iter()
                .map(|c| c.render_grouped())
                .collect::<Vec<_>>()
                .join(" or "),
        }
    }

    fn render_grouped(&self) -> String {
        match self {
            FilterExpr::Eq(..) => self.render(),
            _ => format!("({})", self.render()),
        }
    }

    /// Translate into a SQL condition over the given column prefix, with
    /// literal values returned separately as bind parameters. Fields outside
    /// `allowed` are rejected.
    pub fn to_sql(&self, prefix: &str, allowed: &[&str]) -> Result<(String, Vec<String>)> {
        let mut params = Vec::new();
        let sql = self.to_sql_inner(prefix, allowed, &mut params)?;
        Ok((sql, params))
    }

    fn to_sql_inner(
        &self,
        prefix: &str,
        allowed: &[&str],
        params: &mut Vec<String>,
    ) -> Result<String> {
        match self {
            FilterExpr::Eq(field, value) => {
                if !allowed.contains(&field.as_str()) {
                    return Err(ZmemError::Validation(format!(
                        "unknown filter field: {}",
                        field
                    )));
                }
                params.push(value.clone());
                Ok(format!("{}{} = ?", prefix, field))
            }
            FilterExpr::And(clauses) => {
                let parts: Result<Vec<String>> = clauses
                    .iter()
                    .map(|c| c.to_sql_inner(prefix, allowed, params))
                    .collect();
                Ok(format!("({})", parts?.join(" AND ")))
            }
            FilterExpr::Or(clauses) => {
                let parts: Result<Vec<String>> = clauses
                    .iter()
                    .map(|c| c.to_sql_inner(prefix, allowed, params))
                    .collect();
                Ok(format!("({})", parts?.join(" OR ")))
            }
        }
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Eq,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(escaped) => value.push(escaped),
                            None => {
                                return Err(ZmemError::Validation(
                                    "unterminated escape in filter literal".to_string(),
                                ))
                            }
                        },
                        Some('"') => break,
                        Some(ch) => value.push(ch),
                        None => {
                            return Err(ZmemError::Validation(
                                "unterminated string in filter".to_string(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(ZmemError::Validation(format!(
                    "unexpected character in filter: {:?}",
                    other
                )))
            }
        }
    }

    Ok(tokens)
}

/// Parse the wire form back into a [`FilterExpr`].
///
/// Grammar: `expr := and_expr ('or' and_expr)*`,
/// `and_expr := primary ('and' primary)*`,
/// `primary := '(' expr ')' | ident '=' string`.
pub fn parse(input: &str) -> Result<FilterExpr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(ZmemError::Validation(
            "trailing tokens in filter expression".to_string(),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<FilterExpr> {
        let mut clauses = vec![self.parse_and()?];
        while self.peek_keyword("or") {
            self.pos += 1;
            clauses.push(self.parse_and()?);
        }
        Ok(if clauses.len() == 1 {
            clauses.pop().unwrap()
        } else {
            FilterExpr::Or(clauses)
        })
    }

    fn parse_and(&mut self) -> Result<FilterExpr> {
        let mut clauses = vec![self.parse_primary()?];
        while self.peek_keyword("and") {
            self.pos += 1;
            clauses.push(self.parse_primary()?);
        }
        Ok(if clauses.len() == 1 {
            clauses.pop().unwrap()
        } else {
            FilterExpr::And(clauses)
        })
    }

    fn parse_primary(&mut self) -> Result<FilterExpr> {
        match self.next() {
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(ZmemError::Validation(
                        "expected ')' in filter expression".to_string(),
                    )),
                }
            }
            Some(Token::Ident(field)) => match (self.next(), self.next()) {
                (Some(Token::Eq), Some(Token::Str(value))) => Ok(FilterExpr::Eq(field, value)),
                _ => Err(ZmemError::Validation(format!(
                    "expected = \"value\" after field {}",
                    field
                ))),
            },
            other => Err(ZmemError::Validation(format!(
                "unexpected token in filter expression: {:?}",
                other
            ))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_and_parse_round_trip() {
        let expr = FilterExpr::all_of([
            Some(FilterExpr::eq("workspace", "w1")),
            FilterExpr::any_of("status", ["active", "pending"]),
        ])
        .unwrap();
        let rendered = expr.render();
        assert_eq!(
            rendered,
            r#"workspace = "w1" and (status = "active" or status = "pending")"#
        );
        assert_eq!(parse(&rendered).unwrap(), expr);
    }

    #[test]
    fn test_escaped_literals_survive() {
        let expr = FilterExpr::eq("workspace", "he said \"hi\"\\there");
        let parsed = parse(&expr.render()).unwrap();
        assert_eq!(parsed, expr);
    }

    #[test]
    fn test_to_sql_parameterises_values() {
        let expr = parse("workspace = \"w1\" and (scope = \"global\" or scope = \"user\")")
            .unwrap();
        let (sql, params) = expr
            .to_sql("meta.", &["workspace", "scope", "type", "status", "memory_id"])
            .unwrap();
        assert_eq!(
            sql,
            "(meta.workspace = ? AND (meta.scope = ? OR meta.scope = ?))"
        );
        assert_eq!(params, vec!["w1", "global", "user"]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let expr = parse("password = \"x\"").unwrap();
        assert!(expr.to_sql("", &["workspace"]).is_err());
    }

    #[test]
    fn test_malformed_input_rejected() {
        assert!(parse("workspace =").is_err());
        assert!(parse("(workspace = \"a\"").is_err());
        assert!(parse("workspace = \"a\" extra").is_err());
        assert!(parse("workspace = \"unterminated").is_err());
    }

    #[test]
    fn test_single_value_any_of_is_plain_eq() {
        let expr = FilterExpr::any_of("status", ["active"]).unwrap();
        assert_eq!(expr.render(), "status = \"active\"");
        assert!(FilterExpr::any_of("status", []).is_none());
    }
}
