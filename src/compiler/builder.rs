//! Metric query orchestration.
//!
//! Resolves every selected field, plans the joins, compiles filters and
//! custom dimensions, then assembles the statement:
//!
//! ```text
//! WITH <bin range CTEs>, metrics AS (<base query>)
//! SELECT * FROM (
//!     SELECT *, <table calculations> FROM metrics WHERE <metric filter>
//! ) AS table_calculations
//! WHERE <table calculation filter>
//! ORDER BY ... LIMIT ...
//! ```
//!
//! Layers are only added when needed: a query without metric filters or table
//! calculations is just the base query.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use super::custom_dimensions::{compile_custom_dimension, inflation_warnings, CompiledCustomDimension};
use super::filters::{FilterCompiler, FilterField};
use super::references::{ReferenceResolver, ResolvedSql};
use super::table_calculations::{CompiledTableCalculation, TableCalculationCompiler};
use super::time::sort_expression;
use crate::error::{CompileError, CompileResult};
use crate::query::{
    CompiledQuery, IntrinsicUserAttributes, MetricQuery, Parameters, UserAttributes, WeekDay,
};
use crate::semantic::explore::{Explore, FieldId, TimeInterval, ValueType};
use crate::semantic::join_graph::{plan_joins, JoinPlan};
use crate::sql::{Dialect, SqlDialect};

/// Everything needed to compile one query.
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    pub explore: &'a Explore,
    pub query: &'a MetricQuery,
    pub dialect: Dialect,
    pub user_attributes: UserAttributes,
    pub intrinsic_user_attributes: IntrinsicUserAttributes,
    /// IANA timezone for relative date filters.
    pub timezone: String,
    pub parameters: Parameters,
    pub start_of_week: WeekDay,
}

impl<'a> CompileRequest<'a> {
    pub fn new(explore: &'a Explore, query: &'a MetricQuery) -> Self {
        Self {
            explore,
            query,
            dialect: Dialect::default(),
            user_attributes: UserAttributes::new(),
            intrinsic_user_attributes: IntrinsicUserAttributes::default(),
            timezone: "UTC".into(),
            parameters: Parameters::new(),
            start_of_week: WeekDay::default(),
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_user_attributes(mut self, attributes: UserAttributes) -> Self {
        self.user_attributes = attributes;
        self
    }

    pub fn with_intrinsic_user_attributes(mut self, attributes: IntrinsicUserAttributes) -> Self {
        self.intrinsic_user_attributes = attributes;
        self
    }

    pub fn with_timezone(mut self, timezone: &str) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_start_of_week(mut self, start_of_week: WeekDay) -> Self {
        self.start_of_week = start_of_week;
        self
    }
}

/// Compile a metric query to SQL.
pub fn compile(request: &CompileRequest<'_>) -> CompileResult<CompiledQuery> {
    MetricQueryBuilder::new(request).compile_query()
}

#[derive(Debug, Clone, PartialEq)]
enum ColumnRole {
    Dimension(Option<TimeInterval>),
    Custom { order_sql: Option<String> },
    Metric,
}

/// A column of the base query.
#[derive(Debug, Clone)]
struct Column {
    /// How the query refers to the column: field id or custom dimension id.
    key: String,
    alias: String,
    sql: String,
    role: ColumnRole,
}

fn parse_field(id: &str) -> CompileResult<FieldId> {
    FieldId::parse(id).ok_or_else(|| CompileError::UnresolvedReference(id.to_string()))
}

fn order_alias(id: &str) -> String {
    format!("{}_order", id)
}

/// Builds the SQL for one request.
pub struct MetricQueryBuilder<'a> {
    request: &'a CompileRequest<'a>,
    dialect: &'a dyn SqlDialect,
}

impl<'a> MetricQueryBuilder<'a> {
    pub fn new(request: &'a CompileRequest<'a>) -> Self {
        Self {
            request,
            dialect: request.dialect.dialect(),
        }
    }

    /// Render with a dialect implementation other than the built-in ones.
    pub fn with_dialect_adapter(mut self, dialect: &'a dyn SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn compile_query(self) -> CompileResult<CompiledQuery> {
        let request = self.request;
        let explore = request.explore;
        let query = request.query;
        let dialect = self.dialect;

        if !query.explore_name.is_empty() && query.explore_name != explore.name {
            return Err(CompileError::ExploreMismatch {
                query: query.explore_name.clone(),
                explore: explore.name.clone(),
            });
        }
        explore.base()?;
        if query.dimensions.is_empty() && query.metrics.is_empty() {
            return Err(CompileError::EmptyQuery);
        }
        debug!(explore = %explore.name, dialect = dialect.name(), "compiling metric query");

        let mut resolver = ReferenceResolver::new(
            explore,
            dialect,
            &request.parameters,
            &request.user_attributes,
            &request.intrinsic_user_attributes,
        )
        .with_additional_metrics(&query.additional_metrics);

        let mut tables: IndexSet<String> = IndexSet::new();
        let mut used: IndexSet<String> = IndexSet::new();

        // Selected columns.
        let mut columns: Vec<Column> = vec![];
        let mut customs: Vec<CompiledCustomDimension> = vec![];
        for id in &query.dimensions {
            if let Some(custom) = query.selected_custom_dimension(id) {
                let compiled = compile_custom_dimension(&mut resolver, custom)?;
                tables.extend(compiled.tables.iter().cloned());
                used.extend(compiled.parameters.iter().cloned());
                columns.push(Column {
                    key: id.clone(),
                    alias: id.clone(),
                    sql: compiled.sql.clone(),
                    role: ColumnRole::Custom {
                        order_sql: compiled.order_sql.clone(),
                    },
                });
                customs.push(compiled);
                continue;
            }
            let field = parse_field(id)?;
            let resolved = resolver.dimension(&field)?;
            let interval = resolver
                .find_dimension(&field)
                .and_then(|d| d.time_interval);
            tables.extend(resolved.tables.iter().cloned());
            used.extend(resolved.parameters.iter().cloned());
            columns.push(Column {
                key: id.clone(),
                alias: field.alias(),
                sql: resolved.sql,
                role: ColumnRole::Dimension(interval),
            });
        }

        let metric_ids: Vec<FieldId> = query
            .metrics
            .iter()
            .map(|id| parse_field(id))
            .collect::<CompileResult<_>>()?;
        for (id, field) in query.metrics.iter().zip(&metric_ids) {
            let resolved = resolver.metric(field)?;
            tables.extend(resolved.tables.iter().cloned());
            used.extend(resolved.parameters.iter().cloned());
            columns.push(Column {
                key: id.clone(),
                alias: field.alias(),
                sql: resolved.sql,
                role: ColumnRole::Metric,
            });
        }

        // Dimension filters.
        let filters = FilterCompiler::new(dialect, &request.timezone);
        let mut filter_parameters: IndexSet<String> = IndexSet::new();
        let dimension_filter = match &query.filters.dimensions {
            Some(node) => filters.compile(node, |target| {
                if let Some(custom) = customs.iter().find(|c| c.id == target) {
                    // The range CTE reads the filtered rows, so it cannot
                    // depend on its own buckets.
                    if custom.cte.is_some() {
                        return Err(CompileError::InvalidFilter {
                            target: target.to_string(),
                            reason: "fixed-number bins cannot be filtered".into(),
                        });
                    }
                    let value_type = custom.bin_source_table.as_ref().map(|_| ValueType::String);
                    return Ok(FilterField::new(custom.sql.clone(), value_type));
                }
                let field = parse_field(target)?;
                let resolved = resolver.dimension(&field)?;
                tables.extend(resolved.tables.iter().cloned());
                filter_parameters.extend(resolved.parameters.iter().cloned());
                let value_type = resolver.find_dimension(&field).map(|d| d.value_type);
                Ok(FilterField::new(resolved.sql, value_type))
            })?,
            None => None,
        };

        // Joins, closed over the tables row-level filters pull in.
        let mut join_sql: HashMap<usize, ResolvedSql> = HashMap::new();
        let mut table_filters: IndexMap<String, Option<ResolvedSql>> = IndexMap::new();
        let plan = loop {
            let plan = plan_joins(explore, &tables, |index| {
                if let Some(hit) = join_sql.get(&index) {
                    return Ok(hit.tables.clone());
                }
                let join = &explore.joined_tables[index];
                let resolved = resolver.template(&join.table, &join.sql_on)?;
                let references = resolved.tables.clone();
                join_sql.insert(index, resolved);
                Ok(references)
            })?;

            let mut grew = false;
            for table in plan.tables() {
                if table_filters.contains_key(table) {
                    continue;
                }
                let resolved = match &explore.table(table)?.sql_where {
                    Some(template) => Some(resolver.template(table, template)?),
                    None => None,
                };
                if let Some(resolved) = &resolved {
                    for referenced in &resolved.tables {
                        if tables.insert(referenced.clone()) && !plan.contains(referenced) {
                            grew = true;
                        }
                    }
                }
                table_filters.insert(table.to_string(), resolved);
            }
            if !grew {
                break plan;
            }
        };
        debug!(tables = ?plan.tables().collect::<Vec<_>>(), "resolved query tables");

        self.check_required_attributes(&plan)?;

        for join in &plan.joins {
            used.extend(join_sql[&join.index].parameters.iter().cloned());
        }
        let mut where_parts: Vec<String> = vec![];
        for table in plan.tables() {
            if let Some(Some(resolved)) = table_filters.get(table) {
                used.extend(resolved.parameters.iter().cloned());
                where_parts.push(format!("({})", resolved.sql));
            }
        }
        used.extend(filter_parameters);
        if let Some(filter) = &dimension_filter {
            where_parts.push(format!("({})", filter));
        }

        let warnings = inflation_warnings(&plan, &metric_ids, &customs);

        // FROM, joins and WHERE, shared with the bin range CTEs.
        let mut from_lines = vec![format!(
            "FROM {} AS {}",
            explore.base()?.render_sql_table(dialect),
            dialect.quote_identifier(&plan.base_table)
        )];
        for join in &plan.joins {
            from_lines.push(format!(
                "{} {} AS {}\n  ON {}",
                dialect.join_keyword(join.join_type),
                explore.table(&join.table)?.render_sql_table(dialect),
                dialect.quote_identifier(&join.table),
                join_sql[&join.index].sql
            ));
        }
        let where_line = if where_parts.is_empty() {
            None
        } else {
            Some(format!("WHERE {}", where_parts.join(" AND ")))
        };
        let range_source = from_lines
            .iter()
            .cloned()
            .chain(where_line.clone())
            .collect::<Vec<_>>()
            .join("\n");

        let mut ctes: Vec<String> = customs
            .iter()
            .filter_map(|c| c.cte.as_ref())
            .map(|cte| cte.render(&range_source))
            .collect();

        // Base query.
        let sorted: IndexSet<&str> = query.sorts.iter().map(|s| s.field_id.as_str()).collect();
        let mut select_lines = vec![];
        let mut group_by = vec![];
        for column in &columns {
            select_lines.push(format!(
                "  {} AS {}",
                column.sql,
                dialect.quote_identifier(&column.alias)
            ));
            if column.role != ColumnRole::Metric {
                group_by.push(select_lines.len().to_string());
            }
            if let ColumnRole::Custom {
                order_sql: Some(order_sql),
            } = &column.role
            {
                if sorted.contains(column.key.as_str()) {
                    select_lines.push(format!(
                        "  {} AS {}",
                        order_sql,
                        dialect.quote_identifier(&order_alias(&column.alias))
                    ));
                    group_by.push(select_lines.len().to_string());
                }
            }
        }

        let mut base = vec![format!("SELECT\n{}", select_lines.join(",\n"))];
        base.extend(from_lines);
        for custom in &customs {
            if let Some(cte) = &custom.cte {
                base.push(format!("CROSS JOIN {}", cte.name));
            }
        }
        base.extend(where_line);
        if !group_by.is_empty() {
            base.push(format!("GROUP BY {}", group_by.join(", ")));
        }
        let mut body = base.join("\n");

        // Post-aggregation layers.
        let metric_filter = match &query.filters.metrics {
            Some(node) => filters.compile(node, |target| {
                let column = columns
                    .iter()
                    .find(|c| c.key == target && c.role == ColumnRole::Metric)
                    .ok_or_else(|| CompileError::UnresolvedReference(target.to_string()))?;
                let value_type =
                    FieldId::parse(target).and_then(|f| resolver.metric_value_type(&f));
                Ok(FilterField::new(
                    dialect.quote_identifier(&column.alias),
                    value_type,
                ))
            })?,
            None => None,
        };

        let column_aliases: IndexMap<String, String> = columns
            .iter()
            .map(|c| (c.key.clone(), c.alias.clone()))
            .collect();
        let calculations = TableCalculationCompiler::new(
            dialect,
            &request.parameters,
            &column_aliases,
            &query.table_calculations,
        )
        .compile_all()?;
        for calculation in &calculations {
            used.extend(calculation.parameters.iter().cloned());
        }

        let layered = metric_filter.is_some() || !calculations.is_empty();
        if layered {
            ctes.push(format!("metrics AS (\n{}\n)", body));
            let mut outer = vec!["  *".to_string()];
            outer.extend(calculations.iter().map(|c| {
                format!("  {} AS {}", c.sql, dialect.quote_identifier(&c.name))
            }));
            body = format!("SELECT\n{}\nFROM metrics", outer.join(",\n"));
            if let Some(filter) = &metric_filter {
                body.push_str(&format!("\nWHERE {}", filter));
            }
        }

        let calculation_filter = match &query.filters.table_calculations {
            Some(node) => filters.compile(node, |target| {
                let calculation = query
                    .table_calculations
                    .iter()
                    .find(|c| c.name == target)
                    .ok_or_else(|| CompileError::UnresolvedReference(target.to_string()))?;
                Ok(FilterField::new(
                    dialect.quote_identifier(&calculation.name),
                    calculation.value_type,
                ))
            })?,
            None => None,
        };
        if let Some(filter) = &calculation_filter {
            body = format!(
                "SELECT\n  *\nFROM (\n{}\n) AS table_calculations\nWHERE {}",
                body, filter
            );
        }

        let mut sql = if ctes.is_empty() {
            body
        } else {
            format!("WITH {}\n{}", ctes.join(",\n"), body)
        };

        let order_by = self.order_by(&columns, &calculations, layered)?;
        if !order_by.is_empty() {
            sql.push_str(&format!("\nORDER BY {}", order_by.join(", ")));
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!("\nLIMIT {}", limit));
        }

        let used_parameters = used
            .iter()
            .filter_map(|name| {
                request
                    .parameters
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();

        Ok(CompiledQuery {
            sql,
            warnings,
            used_parameters,
        })
    }

    /// The user must hold one of the allowed values of every attribute a
    /// joined table requires.
    fn check_required_attributes(&self, plan: &JoinPlan) -> CompileResult<()> {
        let explore = self.request.explore;
        for table in plan.tables() {
            let definition = explore.table(table)?;
            for (attribute, allowed) in &definition.required_attributes {
                let held = self
                    .request
                    .user_attributes
                    .get(attribute)
                    .is_some_and(|values| values.iter().any(|v| allowed.contains(v)));
                if !held {
                    return Err(CompileError::Forbidden(format!(
                        "You don't have access to table \"{}\"",
                        table
                    )));
                }
            }
        }
        Ok(())
    }

    fn order_by(
        &self,
        columns: &[Column],
        calculations: &[CompiledTableCalculation],
        layered: bool,
    ) -> CompileResult<Vec<String>> {
        let dialect = self.dialect;
        let mut order_by = vec![];
        for sort in &self.request.query.sorts {
            let expr = if let Some(column) = columns.iter().find(|c| c.key == sort.field_id) {
                let alias = dialect.quote_identifier(&column.alias);
                match &column.role {
                    ColumnRole::Dimension(Some(interval)) => {
                        // Outside the metrics layer the alias is not an
                        // input column, so order by the expression itself.
                        let operand = if layered {
                            alias.clone()
                        } else {
                            format!("({})", column.sql)
                        };
                        sort_expression(dialect, *interval, &operand, self.request.start_of_week)
                            .unwrap_or(alias)
                    }
                    ColumnRole::Custom {
                        order_sql: Some(_),
                    } => dialect.quote_identifier(&order_alias(&column.alias)),
                    _ => alias,
                }
            } else if calculations.iter().any(|c| c.name == sort.field_id) {
                dialect.quote_identifier(&sort.field_id)
            } else {
                return Err(CompileError::UnresolvedReference(sort.field_id.clone()));
            };
            order_by.push(if sort.descending {
                format!("{} DESC", expr)
            } else {
                expr
            });
        }
        Ok(order_by)
    }
}
