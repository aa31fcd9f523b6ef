//! Custom dimensions: dimensions defined by the query instead of the model.
//!
//! - `Sql` dimensions are a template resolved like any model field.
//! - `Bin` dimensions bucket a numeric model dimension. Fixed-width bins are
//!   computed inline; fixed-number bins need the source's observed range, read
//!   from a single-row CTE `<id>_cte` that the main query cross joins.
//!
//! Bucketing a dimension from one table while aggregating metrics from
//! another can count rows more than once when the join between them fans
//! out. That is reported as a warning, never an error.

use indexmap::IndexSet;
use tracing::{debug, warn};

use super::references::{ReferenceResolver, ResolvedSql};
use crate::error::{CompileError, CompileResult};
use crate::query::{BinType, CompilationWarning, CustomDimension};
use crate::semantic::explore::FieldId;
use crate::semantic::join_graph::JoinPlan;
use crate::sql::dialect::helpers::format_number;
use crate::sql::SqlDialect;

/// A single-row CTE holding the observed range of a bin's source.
#[derive(Debug, Clone, PartialEq)]
pub struct BinRangeCte {
    pub name: String,
    /// SQL of the binned dimension.
    pub source_sql: String,
}

impl BinRangeCte {
    /// Render `name AS (...)` reading from the query's `FROM`/joins/`WHERE`
    /// text.
    pub fn render(&self, from_clause: &str) -> String {
        format!(
            "{name} AS (\nSELECT\n  MIN({src}) AS min_id,\n  MAX({src}) AS max_id\n{from}\n)",
            name = self.name,
            src = self.source_sql,
            from = from_clause
        )
    }
}

/// A compiled custom dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCustomDimension {
    pub id: String,
    /// Column expression.
    pub sql: String,
    /// Numeric expression to sort by instead of the text label.
    pub order_sql: Option<String>,
    pub tables: IndexSet<String>,
    pub parameters: IndexSet<String>,
    pub cte: Option<BinRangeCte>,
    /// Table of the binned dimension.
    pub bin_source_table: Option<String>,
}

/// Custom dimension ids end up in aliases and CTE names unquoted.
fn validate_id(id: &str) -> CompileResult<()> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CompileError::InvalidCustomDimension {
            id: id.to_string(),
            reason: "id may only contain letters, digits and underscores".into(),
        });
    }
    Ok(())
}

/// Resolve a bin's source dimension, written either as `table.field` or as
/// its column alias `table_field`.
fn source_field(resolver: &ReferenceResolver<'_>, dimension_id: &str) -> Option<FieldId> {
    if let Some(id) = FieldId::parse(dimension_id) {
        return Some(id);
    }
    resolver.explore().tables.iter().find_map(|(table, def)| {
        def.dimensions
            .keys()
            .map(|field| FieldId::new(table, field))
            .find(|id| id.alias() == dimension_id)
    })
}

pub fn compile_custom_dimension(
    resolver: &mut ReferenceResolver<'_>,
    custom: &CustomDimension,
) -> CompileResult<CompiledCustomDimension> {
    validate_id(custom.id())?;
    resolver.explore().table(custom.table())?;

    match custom {
        CustomDimension::Sql { id, table, sql, .. } => {
            let mut resolved = resolver.template(table, sql)?;
            resolved.tables.insert(table.clone());
            let ResolvedSql {
                sql,
                tables,
                parameters,
            } = resolved;
            Ok(CompiledCustomDimension {
                id: id.clone(),
                sql,
                order_sql: None,
                tables,
                parameters,
                cte: None,
                bin_source_table: None,
            })
        }
        CustomDimension::Bin {
            id,
            dimension_id,
            bin_type,
            ..
        } => {
            let invalid = |reason: &str| CompileError::InvalidCustomDimension {
                id: id.clone(),
                reason: reason.to_string(),
            };
            let field = source_field(resolver, dimension_id)
                .ok_or_else(|| CompileError::UnresolvedReference(dimension_id.clone()))?;
            let source = resolver.dimension(&field)?;
            let src = format!("({})", source.sql);
            let dialect = resolver.dialect();

            let (sql, order_sql, cte) = match *bin_type {
                BinType::FixedWidth { bin_width } => {
                    if !bin_width.is_finite() || bin_width <= 0.0 {
                        return Err(invalid("bin width must be a positive number"));
                    }
                    let width = format_number(bin_width);
                    let order = format!("FLOOR({} / {}) * {}", src, width, width);
                    (dialect.bucket_by_width(&src, bin_width), order, None)
                }
                BinType::FixedNumber { bin_number } => {
                    if bin_number == 0 {
                        return Err(invalid("bin number must be at least 1"));
                    }
                    let name = format!("{}_cte", id);
                    let min = format!("{}.min_id", name);
                    let max = format!("{}.max_id", name);
                    let sql = dialect.bucket_by_count(&src, &min, &max, bin_number);
                    let order = bucket_index(dialect, &src, &min, &max, bin_number);
                    debug!(cte = %name, source = %field, "bin range cte");
                    let cte = BinRangeCte {
                        name,
                        source_sql: src.clone(),
                    };
                    (sql, order, Some(cte))
                }
            };

            Ok(CompiledCustomDimension {
                id: id.clone(),
                sql,
                order_sql: Some(order_sql),
                tables: source.tables,
                parameters: source.parameters,
                cte,
                bin_source_table: Some(field.table),
            })
        }
    }
}

/// Zero-based bucket number matching `SqlDialect::bucket_by_count`.
fn bucket_index(dialect: &dyn SqlDialect, expr: &str, min: &str, max: &str, count: u32) -> String {
    let width = dialect.bucket_width(min, max, count);
    let bound = |i: u32| format!("{} + {} * {}", min, width, i);

    let mut sql = String::from("CASE\n");
    sql.push_str(&format!("    WHEN {} IS NULL THEN NULL\n", expr));
    for i in 0..count.saturating_sub(1) {
        sql.push_str(&format!(
            "    WHEN {expr} >= {lo} AND {expr} < {hi} THEN {i}\n",
            expr = expr,
            lo = bound(i),
            hi = bound(i + 1),
            i = i
        ));
    }
    sql.push_str(&format!("    ELSE {}\n  END", count.saturating_sub(1)));
    sql
}

/// One warning per selected metric that a bin dimension can inflate.
///
/// A metric is at risk when walking the join tree from its table to the
/// bin's source table crosses a join that duplicates the metric's rows.
pub fn inflation_warnings(
    plan: &JoinPlan,
    metrics: &[FieldId],
    compiled: &[CompiledCustomDimension],
) -> Vec<CompilationWarning> {
    let sources: IndexSet<&str> = compiled
        .iter()
        .filter_map(|c| c.bin_source_table.as_deref())
        .collect();

    let mut warnings = vec![];
    for metric in metrics {
        let inflated = sources
            .iter()
            .any(|source| metric.table != *source && plan.fans_out_between(&metric.table, source));
        if inflated {
            warn!(metric = %metric, "metric could be inflated by bin dimension joins");
            warnings.push(CompilationWarning {
                message: format!("{} could be inflated due to join relationships", metric),
                tables: vec![metric.table.clone()],
            });
        }
    }
    warnings
}
