//! Reference resolution for SQL templates.
//!
//! Templates embed `${...}` tokens:
//!
//! | Token | Replacement |
//! |-------|-------------|
//! | `${TABLE}` | quoted name of the template's own table |
//! | `${field}` | compiled SQL of a field on the same table, in parentheses |
//! | `${table.field}` | compiled SQL of that field, in parentheses |
//! | `${lightdash.parameters.x}` | escaped literal of parameter `x` |
//! | `${lightdash.attributes.x}` | escaped literals of user attribute `x` |
//! | `${lightdash.user.email}` | escaped intrinsic attribute |
//!
//! `ld.` is accepted as a short form of `lightdash.` and `attr` of
//! `attributes`. Parameters and attributes are only ever inserted as escaped
//! literals.

use std::collections::HashMap;
use std::ops::Range;

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CompileError, CompileResult};
use crate::query::{AdditionalMetric, IntrinsicUserAttributes, ParameterValue, Parameters, UserAttributes};
use crate::semantic::explore::{Dimension, Explore, FieldId, MetricType, ValueType};
use crate::sql::dialect::helpers::format_number;
use crate::sql::SqlDialect;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{[^}]*\}").expect("valid regex"));

/// Iterate over the `${...}` tokens of a template: byte range and trimmed
/// token body.
pub(crate) fn tokens(sql: &str) -> impl Iterator<Item = (Range<usize>, &str)> {
    TOKEN.find_iter(sql).map(|m| {
        let text = m.as_str();
        (m.range(), text[2..text.len() - 1].trim())
    })
}

/// What a token body refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'t> {
    Table,
    Parameter(&'t str),
    Attribute(&'t str),
    UserEmail,
    UserUuid,
    Field {
        table: Option<&'t str>,
        field: &'t str,
    },
}

pub(crate) fn parse_token(body: &str) -> CompileResult<Token<'_>> {
    if body == "TABLE" {
        return Ok(Token::Table);
    }
    let namespaced = body
        .strip_prefix("lightdash.")
        .or_else(|| body.strip_prefix("ld."));
    if let Some(rest) = namespaced {
        return match rest.split_once('.') {
            Some(("parameters", name)) if !name.is_empty() => Ok(Token::Parameter(name)),
            Some(("attributes" | "attr", name)) if !name.is_empty() => Ok(Token::Attribute(name)),
            Some(("user", "email")) => Ok(Token::UserEmail),
            Some(("user", "uuid")) => Ok(Token::UserUuid),
            _ => Err(CompileError::UnresolvedReference(body.to_string())),
        };
    }
    match body.split_once('.') {
        Some((table, field)) if !table.is_empty() && !field.is_empty() => Ok(Token::Field {
            table: Some(table),
            field,
        }),
        None if !body.is_empty() => Ok(Token::Field { table: None, field: body }),
        _ => Err(CompileError::UnresolvedReference(body.to_string())),
    }
}

/// Render a parameter value as an escaped SQL literal.
pub(crate) fn render_parameter(
    dialect: &dyn SqlDialect,
    name: &str,
    value: &ParameterValue,
) -> CompileResult<String> {
    match value {
        ParameterValue::Number(n) if n.is_finite() => Ok(format_number(*n)),
        ParameterValue::Number(_) => Err(CompileError::ParameterSubstitution(name.to_string())),
        ParameterValue::Text(s) => Ok(dialect.quote_string(s)),
        ParameterValue::List(items) => Ok(items
            .iter()
            .map(|s| dialect.quote_string(s))
            .collect::<Vec<_>>()
            .join(", ")),
    }
}

/// A template with every token expanded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSql {
    pub sql: String,
    /// Tables the SQL reads from, transitively.
    pub tables: IndexSet<String>,
    /// Parameters substituted into the SQL, in first-use order.
    pub parameters: IndexSet<String>,
}

impl ResolvedSql {
    pub(crate) fn absorb(&mut self, other: &ResolvedSql) {
        self.tables.extend(other.tables.iter().cloned());
        self.parameters.extend(other.parameters.iter().cloned());
    }
}

/// Which fields a bare or qualified reference may resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Scope {
    Dimension,
    Metric,
}

/// A metric from the explore or from the query's additional metrics.
struct MetricDef<'a> {
    sql: &'a str,
    metric_type: MetricType,
    tables_references: &'a [String],
}

/// Expands templates against one explore, caching compiled fields.
pub struct ReferenceResolver<'a> {
    explore: &'a Explore,
    dialect: &'a dyn SqlDialect,
    parameters: &'a Parameters,
    user_attributes: &'a UserAttributes,
    intrinsic: &'a IntrinsicUserAttributes,
    additional_metrics: &'a [AdditionalMetric],
    cache: HashMap<(Scope, String, String), ResolvedSql>,
    stack: Vec<(Scope, String)>,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(
        explore: &'a Explore,
        dialect: &'a dyn SqlDialect,
        parameters: &'a Parameters,
        user_attributes: &'a UserAttributes,
        intrinsic: &'a IntrinsicUserAttributes,
    ) -> Self {
        Self {
            explore,
            dialect,
            parameters,
            user_attributes,
            intrinsic,
            additional_metrics: &[],
            cache: HashMap::new(),
            stack: vec![],
        }
    }

    /// Make query-defined metrics resolvable alongside the explore's.
    pub fn with_additional_metrics(mut self, metrics: &'a [AdditionalMetric]) -> Self {
        self.additional_metrics = metrics;
        self
    }

    pub fn dialect(&self) -> &'a dyn SqlDialect {
        self.dialect
    }

    pub fn explore(&self) -> &'a Explore {
        self.explore
    }

    /// Look up a dimension definition.
    pub fn find_dimension(&self, id: &FieldId) -> Option<&'a Dimension> {
        let explore: &'a Explore = self.explore;
        explore.dimension(&id.table, &id.field)
    }

    fn find_metric(&self, table: &str, field: &str) -> Option<MetricDef<'a>> {
        let explore: &'a Explore = self.explore;
        if let Some(metric) = explore.metric(table, field) {
            return Some(MetricDef {
                sql: &metric.sql,
                metric_type: metric.metric_type,
                tables_references: &metric.tables_references,
            });
        }
        let additional: &'a [AdditionalMetric] = self.additional_metrics;
        additional
            .iter()
            .find(|m| m.table == table && m.name == field)
            .map(|m| MetricDef {
                sql: &m.sql,
                metric_type: m.metric_type,
                tables_references: &[],
            })
    }

    /// Result type of a metric, if it exists.
    pub fn metric_value_type(&self, id: &FieldId) -> Option<ValueType> {
        self.find_metric(&id.table, &id.field)
            .map(|m| m.metric_type.value_type())
    }

    /// Compiled SQL of a dimension.
    pub fn dimension(&mut self, id: &FieldId) -> CompileResult<ResolvedSql> {
        self.field(Scope::Dimension, &id.table, &id.field)
    }

    /// Compiled, aggregated SQL of a metric.
    pub fn metric(&mut self, id: &FieldId) -> CompileResult<ResolvedSql> {
        self.field(Scope::Metric, &id.table, &id.field)
    }

    /// Expand a raw template written in the context of `table`, where field
    /// references resolve to dimensions.
    pub fn template(&mut self, table: &str, sql: &str) -> CompileResult<ResolvedSql> {
        self.expand(Scope::Dimension, table, sql)
    }

    fn field(&mut self, scope: Scope, table: &str, field: &str) -> CompileResult<ResolvedSql> {
        let key = (scope, table.to_string(), field.to_string());
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }

        let label = format!("{}.{}", table, field);
        // A metric may read the dimension it shares a name with.
        if let Some(pos) = self
            .stack
            .iter()
            .position(|(s, l)| *s == scope && l == &label)
        {
            let mut cycle: Vec<String> = self.stack[pos..].iter().map(|(_, l)| l.clone()).collect();
            cycle.push(label);
            return Err(CompileError::CyclicReference(cycle));
        }

        self.stack.push((scope, label));
        let result = self.compile_field(scope, table, field);
        self.stack.pop();

        let resolved = result?;
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    fn compile_field(&mut self, scope: Scope, table: &str, field: &str) -> CompileResult<ResolvedSql> {
        let unresolved = || CompileError::UnresolvedReference(format!("{}.{}", table, field));

        if scope == Scope::Metric {
            if let Some(metric) = self.find_metric(table, field) {
                // Aggregates read row-level values; only non-aggregate
                // metrics compose other metrics.
                let inner = if metric.metric_type.is_aggregate() {
                    Scope::Dimension
                } else {
                    Scope::Metric
                };
                let mut resolved = self.expand(inner, table, metric.sql)?;
                resolved.sql = metric.metric_type.aggregate(&resolved.sql);
                resolved.tables.insert(table.to_string());
                resolved
                    .tables
                    .extend(metric.tables_references.iter().cloned());
                return Ok(resolved);
            }
        }

        let explore: &'a Explore = self.explore;
        let dimension = explore.dimension(table, field).ok_or_else(unresolved)?;
        let mut resolved = self.expand(Scope::Dimension, table, &dimension.sql)?;
        resolved.tables.insert(table.to_string());
        resolved
            .tables
            .extend(dimension.tables_references.iter().cloned());
        Ok(resolved)
    }

    fn expand(&mut self, scope: Scope, table: &str, sql: &str) -> CompileResult<ResolvedSql> {
        let mut out = ResolvedSql::default();
        let mut last = 0;

        for (range, body) in tokens(sql) {
            out.sql.push_str(&sql[last..range.start]);
            last = range.end;

            match parse_token(body)? {
                Token::Table => {
                    out.sql.push_str(&self.dialect.quote_identifier(table));
                    out.tables.insert(table.to_string());
                }
                Token::Parameter(name) => {
                    let value = self
                        .parameters
                        .get(name)
                        .ok_or_else(|| CompileError::ParameterSubstitution(name.to_string()))?;
                    out.sql
                        .push_str(&render_parameter(self.dialect, name, value)?);
                    out.parameters.insert(name.to_string());
                }
                Token::Attribute(name) => {
                    let values = self
                        .user_attributes
                        .get(name)
                        .filter(|v| !v.is_empty())
                        .ok_or_else(|| {
                            CompileError::Forbidden(format!(
                                "Missing user attribute \"{}\"",
                                name
                            ))
                        })?;
                    let literals: Vec<String> =
                        values.iter().map(|v| self.dialect.quote_string(v)).collect();
                    out.sql.push_str(&literals.join(", "));
                }
                Token::UserEmail => {
                    let email = self.intrinsic.email.as_deref().ok_or_else(|| {
                        CompileError::Forbidden("Missing user attribute \"email\"".into())
                    })?;
                    out.sql.push_str(&self.dialect.quote_string(email));
                }
                Token::UserUuid => {
                    let uuid = self.intrinsic.user_uuid.as_deref().ok_or_else(|| {
                        CompileError::Forbidden("Missing user attribute \"uuid\"".into())
                    })?;
                    out.sql.push_str(&self.dialect.quote_string(uuid));
                }
                Token::Field { table: target, field } => {
                    let target = target.unwrap_or(table);
                    let resolved = self.field(scope, target, field)?;
                    out.sql.push('(');
                    out.sql.push_str(&resolved.sql);
                    out.sql.push(')');
                    out.absorb(&resolved);
                }
            }
        }

        out.sql.push_str(&sql[last..]);
        Ok(out)
    }
}
