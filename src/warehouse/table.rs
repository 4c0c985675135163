//! Table references

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A table inside the warehouse, optionally schema-qualified (`schema.table`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    schema: Option<String>,
    name: String,
}

impl TableName {
    /// Parse `table`, `schema.table`, or bracket/quote-delimited parts
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<String> = split_parts(raw.trim())?;

        match parts.as_slice() {
            [name] => Ok(Self {
                schema: None,
                name: name.clone(),
            }),
            [schema, name] => Ok(Self {
                schema: Some(schema.clone()),
                name: name.clone(),
            }),
            _ => Err(Error::invalid_value(
                "dbTable",
                format!("expected 'schema.table' or 'table', got '{raw}'"),
            )),
        }
    }

    /// Schema part, if qualified
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Table part
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quoted SQL identifier, e.g. `"dbo"."DimProduct"`
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }

    /// Bracket-delimited SQL Server identifier, e.g. `[dbo].[DimProduct]`
    pub fn bracketed(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", bracket_ident(schema), bracket_ident(&self.name)),
            None => bracket_ident(&self.name),
        }
    }
}

impl FromStr for TableName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Bracket an identifier, doubling embedded closing brackets
pub fn bracket_ident(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

/// Quote a string literal, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Split on dots that are outside `[...]` or `"..."` delimiters
fn split_parts(raw: &str) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut closing: Option<char> = None;

    for ch in raw.chars() {
        match (closing, ch) {
            (None, '[') => closing = Some(']'),
            (None, '"') => closing = Some('"'),
            (Some(end), c) if c == end => closing = None,
            (None, '.') => parts.push(std::mem::take(&mut current)),
            (_, c) => current.push(c),
        }
    }

    if closing.is_some() {
        return Err(Error::invalid_value(
            "dbTable",
            format!("unterminated identifier in '{raw}'"),
        ));
    }
    parts.push(current);

    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(Error::invalid_value(
            "dbTable",
            format!("empty identifier in '{raw}'"),
        ));
    }

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_qualified() {
        let table = TableName::parse("dbo.DimProduct").unwrap();
        assert_eq!(table.schema(), Some("dbo"));
        assert_eq!(table.name(), "DimProduct");
        assert_eq!(table.quoted(), "\"dbo\".\"DimProduct\"");
        assert_eq!(table.to_string(), "dbo.DimProduct");
    }

    #[test]
    fn test_parse_unqualified() {
        let table: TableName = "fromDB".parse().unwrap();
        assert_eq!(table.schema(), None);
        assert_eq!(table.quoted(), "\"fromDB\"");
    }

    #[test]
    fn test_parse_delimited() {
        let table = TableName::parse("[sales data].[order.lines]").unwrap();
        assert_eq!(table.schema(), Some("sales data"));
        assert_eq!(table.name(), "order.lines");

        let table = TableName::parse("\"dbo\".\"Dim\"").unwrap();
        assert_eq!(table.name(), "Dim");
        assert_eq!(table.bracketed(), "[dbo].[Dim]");
    }

    #[test]
    fn test_quote_escaping() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(bracket_ident("odd]name"), "[odd]]name]");
    }

    #[test_case("" ; "empty")]
    #[test_case("dbo." ; "trailing dot")]
    #[test_case("a.b.c" ; "too many parts")]
    #[test_case("[dbo.Dim" ; "unterminated")]
    fn test_parse_invalid(raw: &str) {
        assert!(TableName::parse(raw).is_err());
    }
}
