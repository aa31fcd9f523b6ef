//! Filter tree compilation.
//!
//! A filter tree compiles to a boolean SQL expression, or to nothing when it
//! has no live rules. Rules that are disabled, or whose operator needs values
//! but has none, are dropped; groups left without live children disappear
//! with them, so callers never see an empty `()`.
//!
//! Every operand is validated against the target's type and rendered through
//! the dialect, so no client text reaches the SQL unescaped.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CompileError, CompileResult};
use crate::query::{FilterNode, FilterOperator, FilterValue, RuleSettings};
use crate::semantic::explore::ValueType;
use crate::sql::dialect::helpers::format_number;
use crate::sql::{IntervalUnit, SqlDialect};

/// Plain decimal numerals, which are emitted as written.
static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("valid regex"));

/// Largest accepted amount for relative date filters.
const MAX_RELATIVE_AMOUNT: i64 = 1_000_000;

/// A filter target as seen by the compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterField {
    /// SQL expression of the target.
    pub sql: String,
    /// Declared type; operands are typed individually when absent.
    pub value_type: Option<ValueType>,
}

impl FilterField {
    pub fn new(sql: impl Into<String>, value_type: Option<ValueType>) -> Self {
        Self {
            sql: sql.into(),
            value_type,
        }
    }
}

/// Compiles filter trees for one dialect and timezone.
#[derive(Debug, Clone, Copy)]
pub struct FilterCompiler<'a> {
    dialect: &'a dyn SqlDialect,
    timezone: &'a str,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, timezone: &'a str) -> Self {
        Self { dialect, timezone }
    }

    /// Compile `node`, resolving each live rule's target with `resolve`.
    ///
    /// Returns `None` when nothing in the tree is live. Nested groups with
    /// live children are parenthesized; the root group is not.
    pub fn compile<F>(&self, node: &FilterNode, mut resolve: F) -> CompileResult<Option<String>>
    where
        F: FnMut(&str) -> CompileResult<FilterField>,
    {
        self.node(node, &mut resolve, false)
    }

    fn node<F>(&self, node: &FilterNode, resolve: &mut F, nested: bool) -> CompileResult<Option<String>>
    where
        F: FnMut(&str) -> CompileResult<FilterField>,
    {
        match node {
            FilterNode::Group {
                combinator,
                children,
            } => {
                let mut parts = vec![];
                for child in children {
                    if let Some(sql) = self.node(child, resolve, true)? {
                        parts.push(sql);
                    }
                }
                if parts.is_empty() {
                    return Ok(None);
                }
                let joined = parts.join(&format!(" {} ", combinator.keyword()));
                Ok(Some(if nested {
                    format!("({})", joined)
                } else {
                    joined
                }))
            }
            FilterNode::Rule {
                target,
                operator,
                values,
                disabled,
                settings,
            } => {
                if *disabled || (operator.requires_values() && values.is_empty()) {
                    return Ok(None);
                }
                let field = resolve(target)?;
                self.rule(target, *operator, values, settings.as_ref(), &field)
                    .map(Some)
            }
        }
    }

    fn rule(
        &self,
        target: &str,
        operator: FilterOperator,
        values: &[FilterValue],
        settings: Option<&RuleSettings>,
        field: &FilterField,
    ) -> CompileResult<String> {
        let x = format!("({})", field.sql);
        let literal = |value: &FilterValue| self.literal(value, field.value_type);
        let list = || -> CompileResult<String> {
            Ok(values.iter().map(literal).collect::<CompileResult<Vec<_>>>()?.join(", "))
        };
        let first = || literal(&values[0]);

        Ok(match operator {
            FilterOperator::IsNull => format!("{} IS NULL", x),
            FilterOperator::NotNull => format!("{} IS NOT NULL", x),
            FilterOperator::Equals => format!("{} IN ({})", x, list()?),
            FilterOperator::NotEquals => format!("{} NOT IN ({})", x, list()?),
            FilterOperator::StartsWith => self.like_any(values, |v| format!("{} LIKE '{}%'", x, v), "OR"),
            FilterOperator::EndsWith => self.like_any(values, |v| format!("{} LIKE '%{}'", x, v), "OR"),
            FilterOperator::Include => self.like_any(
                values,
                |v| format!("LOWER({}) LIKE LOWER('%{}%')", x, v),
                "OR",
            ),
            FilterOperator::DoesNotInclude => self.like_any(
                values,
                |v| format!("LOWER({}) NOT LIKE LOWER('%{}%')", x, v),
                "AND",
            ),
            FilterOperator::LessThan => format!("{} < {}", x, first()?),
            FilterOperator::LessThanOrEqual => format!("{} <= {}", x, first()?),
            FilterOperator::GreaterThan => format!("{} > {}", x, first()?),
            FilterOperator::GreaterThanOrEqual => format!("{} >= {}", x, first()?),
            FilterOperator::InBetween | FilterOperator::NotInBetween => {
                if values.len() < 2 {
                    return Err(CompileError::InvalidFilter {
                        target: target.to_string(),
                        reason: "expects two values".into(),
                    });
                }
                let low = literal(&values[0])?;
                let high = literal(&values[1])?;
                if operator == FilterOperator::InBetween {
                    format!("({x} >= {low} AND {x} <= {high})")
                } else {
                    format!("({x} < {low} OR {x} > {high})")
                }
            }
            FilterOperator::InThePast | FilterOperator::NotInThePast | FilterOperator::InTheNext => {
                let amount = relative_amount(&values[0])?;
                let unit = settings.and_then(|s| s.unit_of_time).unwrap_or_default();
                self.relative(&x, operator, amount, unit)
            }
        })
    }

    /// One `LIKE` predicate per value, joined with `joiner`. Values are
    /// escaped so wildcards match literally.
    fn like_any(&self, values: &[FilterValue], render: impl Fn(&str) -> String, joiner: &str) -> String {
        let mut parts: Vec<String> = values
            .iter()
            .map(|v| render(&self.dialect.escape_like(&v.raw())))
            .collect();
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            format!("({})", parts.join(&format!(" {} ", joiner)))
        }
    }

    fn relative(&self, x: &str, operator: FilterOperator, amount: i64, unit: IntervalUnit) -> String {
        let now = self.dialect.current_timestamp(self.timezone);
        match operator {
            FilterOperator::InTheNext => {
                let end = self.dialect.timestamp_add(&now, amount, unit);
                format!("({x} >= {now} AND {x} <= {end})")
            }
            FilterOperator::NotInThePast => {
                let start = self.dialect.timestamp_add(&now, -amount, unit);
                format!("({x} < {start} OR {x} > {now})")
            }
            _ => {
                let start = self.dialect.timestamp_add(&now, -amount, unit);
                format!("({x} >= {start} AND {x} <= {now})")
            }
        }
    }

    /// Render one operand as a literal of the target's type.
    pub fn literal(&self, value: &FilterValue, value_type: Option<ValueType>) -> CompileResult<String> {
        match value_type {
            Some(ValueType::Number) => number_literal(value),
            Some(ValueType::Boolean) => parse_bool(value).map(|b| self.dialect.format_bool(b).to_string()),
            Some(ValueType::String | ValueType::Date | ValueType::Timestamp) => {
                Ok(self.dialect.quote_string(&value.raw()))
            }
            None => Ok(match value {
                FilterValue::Number(n) if n.is_finite() => format_number(*n),
                FilterValue::Bool(b) => self.dialect.format_bool(*b).to_string(),
                other => self.dialect.quote_string(&other.raw()),
            }),
        }
    }
}

fn invalid(value: &FilterValue, expected: &'static str) -> CompileError {
    CompileError::InvalidFilterValue {
        value: value.raw(),
        expected,
    }
}

/// Accept finite numbers, or text that parses as one.
fn parse_number(value: &FilterValue) -> CompileResult<f64> {
    let n = match value {
        FilterValue::Number(n) => Some(*n),
        FilterValue::Text(s) => s.trim().parse::<f64>().ok(),
        FilterValue::Bool(_) => None,
    };
    n.filter(|n| n.is_finite())
        .ok_or_else(|| invalid(value, "number"))
}

/// Numeric text keeps its digits; an f64 round trip would change large ids.
fn number_literal(value: &FilterValue) -> CompileResult<String> {
    let n = parse_number(value)?;
    Ok(match value {
        FilterValue::Text(s) if DECIMAL.is_match(s.trim()) => s.trim().to_string(),
        _ => format_number(n),
    })
}

fn parse_bool(value: &FilterValue) -> CompileResult<bool> {
    match value {
        FilterValue::Bool(b) => Ok(*b),
        FilterValue::Text(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
        FilterValue::Text(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
        other => Err(invalid(other, "boolean")),
    }
}

/// Relative date operands are positive whole numbers of units.
fn relative_amount(value: &FilterValue) -> CompileResult<i64> {
    let n = parse_number(value)?;
    if n.fract() != 0.0 || n < 1.0 || n > MAX_RELATIVE_AMOUNT as f64 {
        return Err(invalid(value, "positive whole number"));
    }
    Ok(n as i64)
}
