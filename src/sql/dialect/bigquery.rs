//! BigQuery SQL dialect.
//!
//! BigQuery features:
//! - Backtick identifier quoting
//! - Backslash escaping inside string literals (`\'`, `\\`)
//! - `CONCAT()` only, no `||` on mixed types
//! - `DATETIME_ADD` / `DATETIME_SUB` with `INTERVAL n UNIT`

use super::helpers;
use super::{IntervalUnit, SqlDialect};

/// BigQuery SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct BigQuery;

impl SqlDialect for BigQuery {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn escape_string(&self, s: &str) -> String {
        helpers::escape_backslash(s)
    }

    // String literals consume one level of backslashes, so the pattern
    // escapes are applied first.
    fn escape_like(&self, s: &str) -> String {
        self.escape_string(&helpers::escape_like_pattern(s))
    }

    fn concat(&self, parts: &[String]) -> String {
        helpers::concat_function(parts)
    }

    fn cast_to_string(&self, expr: &str) -> String {
        format!("CAST({} AS STRING)", expr)
    }

    fn cast_to_float(&self, expr: &str) -> String {
        format!("CAST({} AS FLOAT64)", expr)
    }

    fn current_timestamp(&self, timezone: &str) -> String {
        format!("CURRENT_DATETIME({})", self.quote_string(timezone))
    }

    fn timestamp_add(&self, expr: &str, amount: i64, unit: IntervalUnit) -> String {
        let function = if amount < 0 {
            "DATETIME_SUB"
        } else {
            "DATETIME_ADD"
        };
        format!(
            "{}({}, INTERVAL {} {})",
            function,
            expr,
            amount.unsigned_abs(),
            unit.as_str().to_uppercase()
        )
    }
}
