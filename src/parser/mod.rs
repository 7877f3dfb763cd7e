//! SQL parser module
//!
//! Wraps sqlparser-rs to parse SQL statements into AST

use crate::error::{EngineError, Result};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// Parse a SQL string into a single Statement AST
pub fn parse_statement(sql: &str) -> Result<sqlparser::ast::Statement> {
    let dialect = GenericDialect {};
    let mut statements = Parser::parse_sql(&dialect, sql)?;

    if statements.is_empty() {
        return Err(EngineError::Parse("Empty SQL statement".to_string()));
    }

    if statements.len() > 1 {
        return Err(EngineError::Parse(
            "Multiple statements not supported".to_string(),
        ));
    }

    Ok(statements.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_select() {
        let stmt = parse_statement("SELECT a, b FROM t").unwrap();
        assert!(matches!(stmt, sqlparser::ast::Statement::Query(_)));
    }

    #[test]
    fn test_parse_select_with_where() {
        let stmt = parse_statement("SELECT a FROM t WHERE b > 10").unwrap();
        assert!(matches!(stmt, sqlparser::ast::Statement::Query(_)));
    }

    #[test]
    fn test_parse_create_table() {
        let stmt = parse_statement("CREATE TABLE t (a BIGINT, b TEXT)").unwrap();
        assert!(matches!(stmt, sqlparser::ast::Statement::CreateTable(_)));
    }

    #[test]
    fn test_parse_error() {
        assert!(parse_statement("SELEC a FROM b").is_err());
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_statement("").is_err());
    }

    #[test]
    fn test_parse_multiple_statements() {
        assert!(parse_statement("SELECT 1; SELECT 2").is_err());
    }
}
