//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for warehouse differences.
//! Every piece of SQL text the compiler produces goes through a `SqlDialect`,
//! so no other module hardcodes quoting or escaping rules:
//!
//! - Identifier quoting: `"` (Postgres/Redshift/Snowflake), `` ` `` (BigQuery)
//! - String escaping: `''` doubling vs `\'` backslash escaping
//! - String concatenation: `||` vs `CONCAT()`
//! - Bucketing and relative-time functions
//!
//! # Usage
//!
//! ```ignore
//! use lenscope::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let quoted = dialect.quote_identifier("user");  // "user"
//! let literal = dialect.quote_string("O'Brien");  // 'O''Brien'
//! ```

mod bigquery;
pub mod helpers;
mod postgres;
mod redshift;
mod snowflake;

pub use bigquery::BigQuery;
pub use postgres::Postgres;
pub use redshift::Redshift;
pub use snowflake::Snowflake;

use serde::{Deserialize, Serialize};

use crate::semantic::explore::JoinType;

/// Unit of time used by relative date filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minute,
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
}

impl IntervalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Minute => "minute",
            IntervalUnit::Hour => "hour",
            IntervalUnit::Day => "day",
            IntervalUnit::Week => "week",
            IntervalUnit::Month => "month",
            IntervalUnit::Year => "year",
        }
    }
}

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Implementations handle dialect-specific syntax differences.
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug + Send + Sync {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    ///
    /// - Postgres/Redshift/Snowflake: `"identifier"`
    /// - BigQuery: `` `identifier` ``
    fn quote_identifier(&self, ident: &str) -> String;

    /// Escape the body of a string literal (without surrounding quotes).
    ///
    /// Typographic quotes are normalized and SQL comment sequences removed
    /// before the dialect's own escaping is applied.
    fn escape_string(&self, s: &str) -> String;

    /// Quote a string literal.
    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", self.escape_string(s))
    }

    /// Escape a value for use inside a `LIKE` pattern literal.
    ///
    /// The result is already string-escaped; `%` and `_` match literally.
    fn escape_like(&self, s: &str) -> String {
        helpers::escape_like_wildcards(&self.escape_string(s))
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    // =========================================================================
    // Operators
    // =========================================================================

    /// Concatenate SQL expressions into a string.
    ///
    /// - Postgres/Redshift/Snowflake: `(a || b)`
    /// - BigQuery: `CONCAT(a, b)`
    fn concat(&self, parts: &[String]) -> String {
        helpers::concat_pipes(parts)
    }

    /// Cast an expression to the dialect's string type.
    fn cast_to_string(&self, expr: &str) -> String {
        format!("CAST({} AS VARCHAR)", expr)
    }

    /// Cast an expression to a floating point type, so `/` never truncates.
    fn cast_to_float(&self, expr: &str) -> String {
        format!("CAST({} AS DOUBLE PRECISION)", expr)
    }

    // =========================================================================
    // Joins
    // =========================================================================

    /// Keyword introducing a join of the given type.
    fn join_keyword(&self, join_type: JoinType) -> &'static str {
        join_type.keyword()
    }

    // =========================================================================
    // Bucketing
    // =========================================================================

    /// Label `expr` with the fixed-width bucket it falls into, e.g. `10 - 19`.
    fn bucket_by_width(&self, expr: &str, width: f64) -> String {
        let width = helpers::format_number(width);
        let lower = format!("FLOOR({} / {}) * {}", expr, width, width);
        let upper = format!("(FLOOR({} / {}) + 1) * {} - 1", expr, width, width);
        self.concat(&[
            self.cast_to_string(&lower),
            self.quote_string(" - "),
            self.cast_to_string(&upper),
        ])
    }

    /// Label `expr` with one of `count` equal-width buckets between the SQL
    /// expressions `min` and `max`.
    ///
    /// The last bucket is closed on `max`; NULL inputs stay NULL.
    fn bucket_by_count(&self, expr: &str, min: &str, max: &str, count: u32) -> String {
        let width = self.bucket_width(min, max, count);
        let bound = |i: u32| format!("{} + {} * {}", min, width, i);

        let mut sql = String::from("CASE\n");
        sql.push_str(&format!("    WHEN {} IS NULL THEN NULL\n", expr));
        for i in 0..count.saturating_sub(1) {
            sql.push_str(&format!(
                "    WHEN {expr} >= {lo} AND {expr} < {hi} THEN {label}\n",
                expr = expr,
                lo = bound(i),
                hi = bound(i + 1),
                label = self.concat(&[
                    self.cast_to_string(&bound(i)),
                    self.quote_string(" - "),
                    self.cast_to_string(&bound(i + 1)),
                ]),
            ));
        }
        let last = count.saturating_sub(1);
        sql.push_str(&format!(
            "    ELSE {}\n",
            self.concat(&[
                self.cast_to_string(&bound(last)),
                self.quote_string(" - "),
                self.cast_to_string(max),
            ])
        ));
        sql.push_str("  END");
        sql
    }

    /// Width of one of `count` equal buckets between `min` and `max`.
    ///
    /// Integer columns would otherwise truncate the division.
    fn bucket_width(&self, min: &str, max: &str, count: u32) -> String {
        format!("(({} - {}) / {})", self.cast_to_float(max), min, count)
    }

    // =========================================================================
    // Date/Time
    // =========================================================================

    /// The current timestamp, converted to the given IANA timezone.
    fn current_timestamp(&self, timezone: &str) -> String;

    /// Shift a timestamp expression by `amount` units (negative goes back).
    fn timestamp_add(&self, expr: &str, amount: i64, unit: IntervalUnit) -> String;
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    Redshift,
    BigQuery,
    Snowflake,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Postgres => &Postgres,
            Dialect::Redshift => &Redshift,
            Dialect::BigQuery => &BigQuery,
            Dialect::Snowflake => &Snowflake,
        }
    }

    /// All known dialects.
    pub fn all() -> [Dialect; 4] {
        [
            Dialect::Postgres,
            Dialect::Redshift,
            Dialect::BigQuery,
            Dialect::Snowflake,
        ]
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "redshift" => Ok(Dialect::Redshift),
            "bigquery" => Ok(Dialect::BigQuery),
            "snowflake" => Ok(Dialect::Snowflake),
            other => Err(format!("Unsupported dialect: {}", other)),
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn escape_string(&self, s: &str) -> String {
        self.dialect().escape_string(s)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn escape_like(&self, s: &str) -> String {
        self.dialect().escape_like(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn concat(&self, parts: &[String]) -> String {
        self.dialect().concat(parts)
    }

    fn cast_to_string(&self, expr: &str) -> String {
        self.dialect().cast_to_string(expr)
    }

    fn cast_to_float(&self, expr: &str) -> String {
        self.dialect().cast_to_float(expr)
    }

    fn join_keyword(&self, join_type: JoinType) -> &'static str {
        self.dialect().join_keyword(join_type)
    }

    fn bucket_by_width(&self, expr: &str, width: f64) -> String {
        self.dialect().bucket_by_width(expr, width)
    }

    fn bucket_by_count(&self, expr: &str, min: &str, max: &str, count: u32) -> String {
        self.dialect().bucket_by_count(expr, min, max, count)
    }

    fn bucket_width(&self, min: &str, max: &str, count: u32) -> String {
        self.dialect().bucket_width(min, max, count)
    }

    fn current_timestamp(&self, timezone: &str) -> String {
        self.dialect().current_timestamp(timezone)
    }

    fn timestamp_add(&self, expr: &str, amount: i64, unit: IntervalUnit) -> String {
        self.dialect().timestamp_add(expr, amount, unit)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}
