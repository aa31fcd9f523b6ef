//! Explore - the semantic model for one logical dataset.
//!
//! An explore is a base table plus the tables that can be joined onto it,
//! each carrying dimensions and metrics defined as SQL templates:
//!
//! ```text
//! Explore
//!   ├── base_table: "orders"
//!   ├── tables
//!   │     ├── orders    { dimensions, metrics, sql_where? }
//!   │     └── customers { dimensions, metrics }
//!   └── joined_tables
//!         └── customers ON ${orders.customer_id} = ${customers.id} (many-to-one)
//! ```
//!
//! Templates reference other fields with `${table.field}`, sibling fields with
//! `${field}` and the owning table with `${TABLE}`. They are compiled per query
//! by the reference resolver; nothing in this module produces SQL except the
//! physical table name.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};
use crate::sql::SqlDialect;

/// The semantic model for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explore {
    pub name: String,
    pub base_table: String,
    pub tables: IndexMap<String, TableDefinition>,
    #[serde(default)]
    pub joined_tables: Vec<JoinEdge>,
}

impl Explore {
    /// Look up a table by name.
    pub fn table(&self, name: &str) -> CompileResult<&TableDefinition> {
        self.tables
            .get(name)
            .ok_or_else(|| CompileError::UnknownTable(name.to_string()))
    }

    /// The base table definition.
    pub fn base(&self) -> CompileResult<&TableDefinition> {
        self.table(&self.base_table)
    }

    /// Find the dimension `field` on `table`.
    pub fn dimension(&self, table: &str, field: &str) -> Option<&Dimension> {
        self.tables.get(table)?.dimensions.get(field)
    }

    /// Find the metric `field` on `table`.
    pub fn metric(&self, table: &str, field: &str) -> Option<&Metric> {
        self.tables.get(table)?.metrics.get(field)
    }

    /// Index of the join that brings `table` into the query.
    pub fn join_index(&self, table: &str) -> Option<usize> {
        self.joined_tables.iter().position(|j| j.table == table)
    }
}

/// A table that can appear in an explore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    pub name: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    /// Physical table name in the warehouse.
    pub sql_table: String,
    #[serde(default)]
    pub dimensions: IndexMap<String, Dimension>,
    #[serde(default)]
    pub metrics: IndexMap<String, Metric>,
    /// Row-level filter applied whenever the table is part of the query.
    #[serde(default)]
    pub sql_where: Option<String>,
    /// User attribute name → values, one of which the user must hold.
    #[serde(default)]
    pub required_attributes: IndexMap<String, Vec<String>>,
}

impl TableDefinition {
    /// Fully qualified, dialect-quoted physical table name.
    pub fn render_sql_table(&self, dialect: &dyn SqlDialect) -> String {
        [self.database.as_deref(), self.schema.as_deref(), Some(&self.sql_table)]
            .into_iter()
            .flatten()
            .map(|part| dialect.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Declared value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    String,
    Number,
    Timestamp,
    Date,
    Boolean,
}

/// Time interval a dimension was truncated/extracted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInterval {
    Raw,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
    DayOfWeekIndex,
    DayOfWeekName,
    MonthNum,
    MonthName,
    QuarterName,
}

/// A non-aggregated field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    pub name: String,
    pub sql: String,
    #[serde(rename = "type", default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub time_interval: Option<TimeInterval>,
    /// Tables this field is known to depend on, in addition to those
    /// discovered while resolving its template.
    #[serde(default)]
    pub tables_references: Vec<String>,
}

impl Dimension {
    pub fn new(name: &str, sql: &str, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            value_type,
            time_interval: None,
            tables_references: vec![],
        }
    }

    pub fn with_time_interval(mut self, interval: TimeInterval) -> Self {
        self.time_interval = Some(interval);
        self
    }
}

/// Aggregation applied by a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Sum,
    Count,
    CountDistinct,
    Min,
    Max,
    Average,
    /// Non-aggregate expression over other metrics.
    Number,
    String,
    Date,
    Boolean,
}

impl MetricType {
    /// Wrap a compiled SQL expression in this metric's aggregate.
    pub fn aggregate(&self, sql: &str) -> String {
        match self {
            MetricType::Sum => format!("SUM({})", sql),
            MetricType::Count => format!("COUNT({})", sql),
            MetricType::CountDistinct => format!("COUNT(DISTINCT {})", sql),
            MetricType::Min => format!("MIN({})", sql),
            MetricType::Max => format!("MAX({})", sql),
            MetricType::Average => format!("AVG({})", sql),
            MetricType::Number | MetricType::String | MetricType::Date | MetricType::Boolean => {
                sql.to_string()
            }
        }
    }

    /// Whether this type wraps its SQL in an aggregate function.
    pub fn is_aggregate(&self) -> bool {
        !matches!(
            self,
            MetricType::Number | MetricType::String | MetricType::Date | MetricType::Boolean
        )
    }

    /// Value type of the aggregated result, used to validate filter values.
    pub fn value_type(&self) -> ValueType {
        match self {
            MetricType::String => ValueType::String,
            MetricType::Date => ValueType::Date,
            MetricType::Boolean => ValueType::Boolean,
            _ => ValueType::Number,
        }
    }
}

/// An aggregated field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub name: String,
    pub sql: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    #[serde(default)]
    pub tables_references: Vec<String>,
}

impl Metric {
    pub fn new(name: &str, sql: &str, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            metric_type,
            tables_references: vec![],
        }
    }
}

/// Relationship between the already-joined side of a join and its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinRelationship {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl JoinRelationship {
    /// Reverse the relationship (swap left/right sides).
    pub fn reverse(self) -> Self {
        match self {
            JoinRelationship::OneToMany => JoinRelationship::ManyToOne,
            JoinRelationship::ManyToOne => JoinRelationship::OneToMany,
            JoinRelationship::OneToOne => JoinRelationship::OneToOne,
            JoinRelationship::ManyToMany => JoinRelationship::ManyToMany,
        }
    }

    /// Returns true if this relationship can cause row multiplication.
    /// One-to-many and many-to-many can fan out.
    pub fn causes_fanout(&self) -> bool {
        matches!(
            self,
            JoinRelationship::OneToMany | JoinRelationship::ManyToMany
        )
    }
}

impl std::fmt::Display for JoinRelationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinRelationship::OneToOne => write!(f, "1:1"),
            JoinRelationship::OneToMany => write!(f, "1:N"),
            JoinRelationship::ManyToOne => write!(f, "N:1"),
            JoinRelationship::ManyToMany => write!(f, "N:N"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Left,
    Inner,
    Right,
    Full,
}

impl JoinType {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinType::Left => "LEFT OUTER JOIN",
            JoinType::Inner => "INNER JOIN",
            JoinType::Right => "RIGHT OUTER JOIN",
            JoinType::Full => "FULL OUTER JOIN",
        }
    }
}

/// A declared join onto the explore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinEdge {
    /// The joined (target) table.
    pub table: String,
    /// Join condition template; may reference any table joined before it.
    pub sql_on: String,
    #[serde(default)]
    pub relationship: Option<JoinRelationship>,
    #[serde(rename = "type", default)]
    pub join_type: JoinType,
    /// Join even when no selected field needs the table.
    #[serde(default)]
    pub always: bool,
}

impl JoinEdge {
    pub fn new(table: &str, sql_on: &str) -> Self {
        Self {
            table: table.into(),
            sql_on: sql_on.into(),
            relationship: None,
            join_type: JoinType::Left,
            always: false,
        }
    }

    pub fn with_relationship(mut self, relationship: JoinRelationship) -> Self {
        self.relationship = Some(relationship);
        self
    }

    pub fn with_type(mut self, join_type: JoinType) -> Self {
        self.join_type = join_type;
        self
    }

    /// Does this join duplicate rows of the tables joined before it?
    pub fn causes_fanout(&self) -> bool {
        self.relationship.is_some_and(|r| r.causes_fanout())
    }
}

/// A `table.field` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldId {
    pub table: String,
    pub field: String,
}

impl FieldId {
    pub fn new(table: &str, field: &str) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
        }
    }

    /// Parse `table.field`; anything without a dot is not a field id.
    pub fn parse(id: &str) -> Option<Self> {
        let (table, field) = id.split_once('.')?;
        if table.is_empty() || field.is_empty() {
            return None;
        }
        Some(Self::new(table, field))
    }

    /// Column alias used for the field in generated SQL.
    pub fn alias(&self) -> String {
        format!("{}_{}", self.table, self.field)
    }
}

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.field)
    }
}
