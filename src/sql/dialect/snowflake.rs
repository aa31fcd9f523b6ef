//! Snowflake SQL dialect.
//!
//! Snowflake features:
//! - ANSI identifier quoting (`"`)
//! - Quote doubling for string literals
//! - `CONVERT_TIMEZONE` and `DATEADD` for relative time

use super::helpers;
use super::{IntervalUnit, SqlDialect};

/// Snowflake SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Snowflake;

impl SqlDialect for Snowflake {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn escape_string(&self, s: &str) -> String {
        helpers::escape_quote_doubling(s)
    }

    fn current_timestamp(&self, timezone: &str) -> String {
        format!(
            "CONVERT_TIMEZONE({}, CURRENT_TIMESTAMP())",
            self.quote_string(timezone)
        )
    }

    fn timestamp_add(&self, expr: &str, amount: i64, unit: IntervalUnit) -> String {
        format!("DATEADD({}, {}, {})", unit.as_str(), amount, expr)
    }
}
