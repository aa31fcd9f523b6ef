//! Amazon Redshift SQL dialect.
//!
//! Redshift features:
//! - PostgreSQL-based syntax and escaping
//! - ANSI identifier quoting (`"`)
//! - `CONVERT_TIMEZONE` instead of `AT TIME ZONE` on `GETDATE()`

use super::helpers;
use super::postgres::interval_arithmetic;
use super::{IntervalUnit, SqlDialect};

/// Amazon Redshift SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Redshift;

impl SqlDialect for Redshift {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn escape_string(&self, s: &str) -> String {
        helpers::escape_quote_doubling(s)
    }

    fn cast_to_string(&self, expr: &str) -> String {
        format!("CAST({} AS VARCHAR)", expr)
    }

    fn current_timestamp(&self, timezone: &str) -> String {
        format!("CONVERT_TIMEZONE({}, GETDATE())", self.quote_string(timezone))
    }

    fn timestamp_add(&self, expr: &str, amount: i64, unit: IntervalUnit) -> String {
        interval_arithmetic(expr, amount, unit)
    }
}
