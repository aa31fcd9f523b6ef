//! Metric query model: what the caller asks for and what the compiler returns.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::semantic::explore::{MetricType, ValueType};
use crate::sql::IntervalUnit;

/// A declarative analytical query over one explore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricQuery {
    pub explore_name: String,
    /// Field ids (`table.field`) or custom dimension ids, in column order.
    pub dimensions: Vec<String>,
    /// Metric field ids (`table.field`).
    pub metrics: Vec<String>,
    pub filters: Filters,
    pub sorts: Vec<SortField>,
    pub limit: Option<u64>,
    pub table_calculations: Vec<TableCalculation>,
    pub custom_dimensions: Vec<CustomDimension>,
    pub additional_metrics: Vec<AdditionalMetric>,
}

impl MetricQuery {
    pub fn new(explore_name: &str) -> Self {
        Self {
            explore_name: explore_name.into(),
            ..Default::default()
        }
    }

    pub fn with_dimension(mut self, id: &str) -> Self {
        self.dimensions.push(id.into());
        self
    }

    pub fn with_metric(mut self, id: &str) -> Self {
        self.metrics.push(id.into());
        self
    }

    pub fn with_dimension_filter(mut self, filter: FilterNode) -> Self {
        self.filters.dimensions = Some(filter);
        self
    }

    pub fn with_metric_filter(mut self, filter: FilterNode) -> Self {
        self.filters.metrics = Some(filter);
        self
    }

    pub fn with_table_calculation_filter(mut self, filter: FilterNode) -> Self {
        self.filters.table_calculations = Some(filter);
        self
    }

    pub fn with_sort(mut self, field_id: &str, descending: bool) -> Self {
        self.sorts.push(SortField {
            field_id: field_id.into(),
            descending,
        });
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_table_calculation(mut self, calculation: TableCalculation) -> Self {
        self.table_calculations.push(calculation);
        self
    }

    pub fn with_custom_dimension(mut self, custom: CustomDimension) -> Self {
        self.custom_dimensions.push(custom);
        self
    }

    pub fn with_additional_metric(mut self, metric: AdditionalMetric) -> Self {
        self.additional_metrics.push(metric);
        self
    }

    /// The custom dimension with the given id, if it is selected.
    pub fn selected_custom_dimension(&self, id: &str) -> Option<&CustomDimension> {
        if !self.dimensions.iter().any(|d| d == id) {
            return None;
        }
        self.custom_dimensions.iter().find(|c| c.id() == id)
    }
}

/// Filter trees partitioned by the kind of field they target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filters {
    /// Compiled into the base query's `WHERE`.
    pub dimensions: Option<FilterNode>,
    /// Applied over the aggregated rows.
    pub metrics: Option<FilterNode>,
    /// Applied over the table calculation columns.
    pub table_calculations: Option<FilterNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    pub fn keyword(&self) -> &'static str {
        match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
        }
    }
}

/// A node of a filter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FilterNode {
    Group {
        #[serde(default)]
        combinator: Combinator,
        #[serde(default)]
        children: Vec<FilterNode>,
    },
    #[serde(rename_all = "camelCase")]
    Rule {
        /// Field id, custom dimension id or table calculation name.
        target: String,
        operator: FilterOperator,
        #[serde(default)]
        values: Vec<FilterValue>,
        #[serde(default)]
        disabled: bool,
        #[serde(default)]
        settings: Option<RuleSettings>,
    },
}

impl FilterNode {
    pub fn and(children: Vec<FilterNode>) -> Self {
        FilterNode::Group {
            combinator: Combinator::And,
            children,
        }
    }

    pub fn or(children: Vec<FilterNode>) -> Self {
        FilterNode::Group {
            combinator: Combinator::Or,
            children,
        }
    }

    pub fn rule(target: &str, operator: FilterOperator, values: Vec<FilterValue>) -> Self {
        FilterNode::Rule {
            target: target.into(),
            operator,
            values,
            disabled: false,
            settings: None,
        }
    }

    /// Mark a rule as disabled. Groups are returned unchanged.
    pub fn disabled(self) -> Self {
        match self {
            FilterNode::Rule {
                target,
                operator,
                values,
                settings,
                ..
            } => FilterNode::Rule {
                target,
                operator,
                values,
                disabled: true,
                settings,
            },
            group => group,
        }
    }

    /// Attach a unit of time for relative date operators. Groups are
    /// returned unchanged.
    pub fn with_unit_of_time(self, unit: IntervalUnit) -> Self {
        match self {
            FilterNode::Rule {
                target,
                operator,
                values,
                disabled,
                ..
            } => FilterNode::Rule {
                target,
                operator,
                values,
                disabled,
                settings: Some(RuleSettings {
                    unit_of_time: Some(unit),
                }),
            },
            group => group,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    IsNull,
    NotNull,
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    Include,
    DoesNotInclude,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    InBetween,
    NotInBetween,
    InThePast,
    NotInThePast,
    InTheNext,
}

impl FilterOperator {
    /// Whether the operator is meaningless without at least one value.
    pub fn requires_values(&self) -> bool {
        !matches!(self, FilterOperator::IsNull | FilterOperator::NotNull)
    }
}

/// A filter operand as supplied by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FilterValue {
    /// The value as the client wrote it, used for validation and error text.
    pub fn raw(&self) -> String {
        match self {
            FilterValue::Bool(b) => b.to_string(),
            FilterValue::Number(n) => n.to_string(),
            FilterValue::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.into())
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        FilterValue::Number(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Bool(b)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleSettings {
    pub unit_of_time: Option<IntervalUnit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortField {
    pub field_id: String,
    #[serde(default)]
    pub descending: bool,
}

/// A post-aggregation expression over selected columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCalculation {
    pub name: String,
    pub sql: String,
    /// Result type, used to validate filter values. Inferred per value when
    /// absent.
    #[serde(rename = "type", default)]
    pub value_type: Option<ValueType>,
}

impl TableCalculation {
    pub fn new(name: &str, sql: &str) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            value_type: None,
        }
    }

    pub fn with_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }
}

/// A dimension defined in the query rather than the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CustomDimension {
    #[serde(rename_all = "camelCase")]
    Sql {
        id: String,
        name: String,
        table: String,
        sql: String,
    },
    #[serde(rename_all = "camelCase")]
    Bin {
        id: String,
        name: String,
        table: String,
        dimension_id: String,
        bin_type: BinType,
    },
}

impl CustomDimension {
    pub fn id(&self) -> &str {
        match self {
            CustomDimension::Sql { id, .. } | CustomDimension::Bin { id, .. } => id,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            CustomDimension::Sql { table, .. } | CustomDimension::Bin { table, .. } => table,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum BinType {
    #[serde(rename_all = "camelCase")]
    FixedNumber { bin_number: u32 },
    #[serde(rename_all = "camelCase")]
    FixedWidth { bin_width: f64 },
}

/// An ad-hoc metric defined in the query; compiled like a model metric of
/// `table`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalMetric {
    pub table: String,
    pub name: String,
    pub sql: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
}

/// A query parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
}

pub type Parameters = IndexMap<String, ParameterValue>;

/// User attribute name → values held by the user.
pub type UserAttributes = IndexMap<String, Vec<String>>;

/// Attributes every authenticated user has.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntrinsicUserAttributes {
    pub email: Option<String>,
    pub user_uuid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekDay {
    #[default]
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl WeekDay {
    /// Zero-based position counting from Monday.
    pub fn index_from_monday(&self) -> usize {
        *self as usize
    }
}

impl std::str::FromStr for WeekDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monday" => Ok(WeekDay::Monday),
            "tuesday" => Ok(WeekDay::Tuesday),
            "wednesday" => Ok(WeekDay::Wednesday),
            "thursday" => Ok(WeekDay::Thursday),
            "friday" => Ok(WeekDay::Friday),
            "saturday" => Ok(WeekDay::Saturday),
            "sunday" => Ok(WeekDay::Sunday),
            other => Err(format!("Unknown week day: {}", other)),
        }
    }
}

/// A non-fatal diagnostic produced during compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationWarning {
    pub message: String,
    pub tables: Vec<String>,
}

/// The compiler's output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledQuery {
    pub sql: String,
    pub warnings: Vec<CompilationWarning>,
    /// Parameters actually substituted into `sql`, in first-use order.
    pub used_parameters: Parameters,
}
