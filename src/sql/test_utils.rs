//! Checks that generated SQL parses under the target warehouse's grammar.

use sqlparser::dialect::{BigQueryDialect, PostgreSqlDialect, RedshiftSqlDialect, SnowflakeDialect};
use sqlparser::parser::Parser;

use super::dialect::Dialect;

fn grammar(dialect: Dialect) -> Box<dyn sqlparser::dialect::Dialect> {
    match dialect {
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::Redshift => Box::new(RedshiftSqlDialect {}),
        Dialect::BigQuery => Box::new(BigQueryDialect {}),
        Dialect::Snowflake => Box::new(SnowflakeDialect {}),
    }
}

/// Parse `sql` with sqlparser, returning the parse error with the SQL attached.
pub fn validate_sql(sql: &str, dialect: Dialect) -> Result<(), String> {
    Parser::parse_sql(&*grammar(dialect), sql)
        .map(|_| ())
        .map_err(|e| format!("Invalid SQL for {}: {}\nSQL: {}", dialect, e, sql))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{IntervalUnit, SqlDialect};

    #[test]
    fn test_relative_time_parses_in_every_dialect() {
        for dialect in [
            Dialect::Postgres,
            Dialect::Redshift,
            Dialect::BigQuery,
            Dialect::Snowflake,
        ] {
            let now = dialect.current_timestamp("UTC");
            let start = dialect.timestamp_add(&now, -3, IntervalUnit::Month);
            let sql = format!(
                "SELECT 1 FROM {} WHERE {} >= {}",
                dialect.quote_identifier("events"),
                dialect.quote_identifier("created_at"),
                start
            );
            validate_sql(&sql, dialect).unwrap();
        }
    }

    #[test]
    fn test_rejects_malformed_sql() {
        assert!(validate_sql("SELEC * FORM users", Dialect::Postgres).is_err());
    }
}
