//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features:
//! - ANSI identifier quoting (`"`)
//! - Quote doubling for string literals (`''`), backslashes doubled
//! - `||` string concatenation
//! - `AT TIME ZONE` for timezone conversion
//! - `INTERVAL 'n unit'` arithmetic

use super::helpers;
use super::{IntervalUnit, SqlDialect};

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn escape_string(&self, s: &str) -> String {
        helpers::escape_quote_doubling(s)
    }

    fn cast_to_string(&self, expr: &str) -> String {
        format!("CAST({} AS TEXT)", expr)
    }

    fn current_timestamp(&self, timezone: &str) -> String {
        format!("(NOW() AT TIME ZONE {})", self.quote_string(timezone))
    }

    fn timestamp_add(&self, expr: &str, amount: i64, unit: IntervalUnit) -> String {
        interval_arithmetic(expr, amount, unit)
    }
}

/// `(expr + INTERVAL 'n unit')`, shared by the Postgres family.
pub(super) fn interval_arithmetic(expr: &str, amount: i64, unit: IntervalUnit) -> String {
    let op = if amount < 0 { "-" } else { "+" };
    format!(
        "({} {} INTERVAL '{} {}')",
        expr,
        op,
        amount.unsigned_abs(),
        unit.as_str()
    )
}
