//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use once_cell::sync::Lazy;
use regex::Regex;

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, Redshift, Snowflake
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: BigQuery
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "\\`"))
}

// =============================================================================
// String Escaping
// =============================================================================

static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)--.*$").expect("valid regex"));
static BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));

/// Replace typographic quotes with their ASCII equivalent.
///
/// Some warehouses fold `’` into `'` on comparison, so the curly variants must
/// go through the same escaping as a plain quote.
pub fn normalize_quotes(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201B}' | '\u{02BC}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect()
}

/// Remove SQL comment sequences and NUL bytes from a raw value.
pub fn strip_comments(s: &str) -> String {
    let without_block = BLOCK_COMMENT.replace_all(s, "");
    LINE_COMMENT
        .replace_all(&without_block, "")
        .replace('\0', "")
}

/// Escape by doubling single quotes, backslashes doubled first.
/// Used by: Postgres, Redshift, Snowflake
pub fn escape_quote_doubling(s: &str) -> String {
    strip_comments(&normalize_quotes(s))
        .replace('\\', "\\\\")
        .replace('\'', "''")
}

/// Escape single quotes with a backslash, backslashes doubled first.
/// Used by: BigQuery
pub fn escape_backslash(s: &str) -> String {
    strip_comments(&normalize_quotes(s))
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
}

/// Escape LIKE wildcards in an already escaped string using `\` as the
/// escape character.
pub fn escape_like_wildcards(escaped: &str) -> String {
    escaped.replace('%', "\\%").replace('_', "\\_")
}

/// Escape a raw value for a LIKE pattern: backslashes and wildcards get a
/// `\` prefix. The result still needs string literal escaping.
/// Used by: BigQuery
pub fn escape_like_pattern(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// =============================================================================
// Boolean / Number Formatting
// =============================================================================

/// Format boolean as literal true/false.
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Render a finite number as a SQL numeric literal.
///
/// Integral values are written without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// =============================================================================
// String Concatenation
// =============================================================================

/// Concatenate with the `||` operator.
/// Used by: Postgres, Redshift, Snowflake
pub fn concat_pipes(parts: &[String]) -> String {
    format!("({})", parts.join(" || "))
}

/// Concatenate with the `CONCAT(...)` function.
/// Used by: BigQuery
pub fn concat_function(parts: &[String]) -> String {
    format!("CONCAT({})", parts.join(", "))
}
