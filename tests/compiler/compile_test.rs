#[path = "../common/mod.rs"]
mod common;

use common::{explore, request, validate_sql};
use insta::assert_snapshot;
use lenscope::query::{CustomDimension, FilterNode, FilterOperator, MetricQuery, TableCalculation, UserAttributes};
use lenscope::semantic::ValueType;
use lenscope::{compile, CompileError, Dialect};

fn compile_sql(query: &MetricQuery) -> String {
    let explore = explore();
    let compiled = compile(&request(&explore, query)).unwrap();
    validate_sql(&compiled.sql, Dialect::Postgres).unwrap();
    compiled.sql
}

// ============================================================================
// Shape of the base query
// ============================================================================

#[test]
fn test_base_table_only() {
    let query = MetricQuery::new("orders")
        .with_dimension("orders.status")
        .with_metric("orders.total_amount")
        .with_sort("orders.total_amount", true)
        .with_limit(10);

    assert_snapshot!(compile_sql(&query), @r#"
SELECT
  "orders".status AS "orders_status",
  SUM("orders".amount) AS "orders_total_amount"
FROM "public"."orders" AS "orders"
GROUP BY 1
ORDER BY "orders_total_amount" DESC
LIMIT 10
"#);
}

#[test]
fn test_no_join_without_joined_fields() {
    let query = MetricQuery::new("orders")
        .with_dimension("orders.status")
        .with_dimension("orders.is_paid")
        .with_metric("orders.order_count");

    let sql = compile_sql(&query);
    assert!(!sql.contains("JOIN"));
    assert!(sql.contains("GROUP BY 1, 2"));
    assert!(sql.contains("COUNT(DISTINCT \"orders\".id) AS \"orders_order_count\""));
}

#[test]
fn test_metrics_only_has_no_group_by() {
    let query = MetricQuery::new("orders").with_metric("orders.total_amount");
    let sql = compile_sql(&query);
    assert!(!sql.contains("GROUP BY"));
}

#[test]
fn test_joined_dimension_with_filters() {
    let query = MetricQuery::new("orders")
        .with_dimension("customers.name")
        .with_metric("orders.total_amount")
        .with_dimension_filter(FilterNode::and(vec![
            FilterNode::rule("orders.status", FilterOperator::Equals, vec!["paid".into()]),
            FilterNode::rule("orders.amount", FilterOperator::GreaterThan, vec![50.0.into()]),
        ]));

    assert_snapshot!(compile_sql(&query), @r#"
SELECT
  "customers".name AS "customers_name",
  SUM("orders".amount) AS "orders_total_amount"
FROM "public"."orders" AS "orders"
LEFT OUTER JOIN "public"."customers" AS "customers"
  ON ("orders".customer_id) = ("customers".id)
WHERE (("orders".status) IN ('paid') AND ("orders".amount) > 50)
GROUP BY 1
"#);
}

#[test]
fn test_filter_on_unselected_table_joins_it() {
    let query = MetricQuery::new("orders")
        .with_metric("orders.total_amount")
        .with_dimension_filter(FilterNode::rule(
            "customers.name",
            FilterOperator::StartsWith,
            vec!["An".into()],
        ));

    let sql = compile_sql(&query);
    assert!(sql.contains("LEFT OUTER JOIN \"public\".\"customers\" AS \"customers\""));
    assert!(sql.contains("WHERE ((\"customers\".name) LIKE 'An%')"));
}

#[test]
fn test_disabled_filters_are_elided() {
    let query = MetricQuery::new("orders")
        .with_metric("orders.total_amount")
        .with_dimension_filter(FilterNode::and(vec![
            FilterNode::rule("customers.name", FilterOperator::Equals, vec!["Ann".into()]).disabled(),
            FilterNode::rule("orders.status", FilterOperator::Equals, vec![]),
        ]));

    let sql = compile_sql(&query);
    assert!(!sql.contains("WHERE"));
    assert!(!sql.contains("customers"));
}

#[test]
fn test_empty_filter_groups_match_no_filter() {
    let empty = || {
        FilterNode::and(vec![
            FilterNode::or(vec![]),
            FilterNode::and(vec![FilterNode::or(vec![])]),
        ])
    };
    let plain = MetricQuery::new("orders")
        .with_dimension("customers.name")
        .with_metric("orders.total_amount")
        .with_table_calculation(TableCalculation::new(
            "doubled",
            "${orders.total_amount} * 2",
        ));
    let filtered = plain
        .clone()
        .with_dimension_filter(empty())
        .with_metric_filter(empty())
        .with_table_calculation_filter(empty());

    assert_eq!(compile_sql(&filtered), compile_sql(&plain));
}

#[test]
fn test_disabled_sibling_filter_is_elided() {
    let live = || FilterNode::rule("orders.status", FilterOperator::Equals, vec!["paid".into()]);
    let with_disabled = MetricQuery::new("orders")
        .with_metric("orders.total_amount")
        .with_dimension_filter(FilterNode::and(vec![
            live(),
            FilterNode::rule("customers.name", FilterOperator::Equals, vec!["Ann".into()]).disabled(),
        ]));
    let alone = MetricQuery::new("orders")
        .with_metric("orders.total_amount")
        .with_dimension_filter(FilterNode::and(vec![live()]));

    let sql = compile_sql(&with_disabled);
    assert_eq!(sql, compile_sql(&alone));
    assert!(sql.contains("WHERE ((\"orders\".status) IN ('paid'))"));
    assert!(!sql.contains("customers"));
}

#[test]
fn test_intermediate_tables_are_joined_in_order() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_dimension("regions.name")
        .with_metric("orders.order_count");
    let attributes = UserAttributes::from([("team".to_string(), vec!["finance".to_string()])]);
    let compiled = compile(&request(&explore, &query).with_user_attributes(attributes)).unwrap();
    validate_sql(&compiled.sql, Dialect::Postgres).unwrap();

    let customers = compiled.sql.find("JOIN \"public\".\"customers\"").unwrap();
    let regions = compiled.sql.find("JOIN \"public\".\"regions\"").unwrap();
    assert!(customers < regions);
    assert!(compiled.sql.contains("  ON (\"customers\".region_id) = (\"regions\".id)"));
    assert!(!compiled.sql.contains("payments"));
}

#[test]
fn test_row_filter_of_joined_table() {
    let query = MetricQuery::new("orders")
        .with_dimension("payments.method")
        .with_metric("payments.total_paid");

    let sql = compile_sql(&query);
    assert!(sql.contains("WHERE (\"payments\".refunded = false)"));
}

#[test]
fn test_always_joined_table() {
    let mut explore = explore();
    explore.joined_tables[1].always = true;
    let query = MetricQuery::new("orders").with_metric("orders.total_amount");

    let compiled = compile(&request(&explore, &query)).unwrap();
    assert!(compiled
        .sql
        .contains("LEFT OUTER JOIN \"public\".\"payments\" AS \"payments\""));
    assert!(compiled.sql.contains("WHERE (\"payments\".refunded = false)"));
}

#[test]
fn test_month_names_sort_by_calendar_position() {
    let query = MetricQuery::new("orders")
        .with_dimension("orders.created_month_name")
        .with_metric("orders.total_amount")
        .with_sort("orders.created_month_name", false);

    let sql = compile_sql(&query);
    assert!(sql.contains(
        "ORDER BY CASE\n    WHEN (TO_CHAR(\"orders\".created_at, 'FMMonth')) = 'January' THEN 1\n"
    ));
    assert!(sql.contains("= 'December' THEN 12\n    ELSE 0\n  END"));
}

// ============================================================================
// Post-aggregation layers
// ============================================================================

#[test]
fn test_metric_filter_wraps_base_query() {
    let query = MetricQuery::new("orders")
        .with_dimension("orders.status")
        .with_metric("orders.total_amount")
        .with_metric_filter(FilterNode::rule(
            "orders.total_amount",
            FilterOperator::GreaterThan,
            vec![1000.0.into()],
        ));

    assert_snapshot!(compile_sql(&query), @r#"
WITH metrics AS (
SELECT
  "orders".status AS "orders_status",
  SUM("orders".amount) AS "orders_total_amount"
FROM "public"."orders" AS "orders"
GROUP BY 1
)
SELECT
  *
FROM metrics
WHERE ("orders_total_amount") > 1000
"#);
}

#[test]
fn test_table_calculation_with_filter_and_sort() {
    let query = MetricQuery::new("orders")
        .with_dimension("orders.status")
        .with_metric("orders.total_amount")
        .with_table_calculation(
            TableCalculation::new("double_amount", "${orders.total_amount} * 2")
                .with_type(ValueType::Number),
        )
        .with_table_calculation_filter(FilterNode::rule(
            "double_amount",
            FilterOperator::GreaterThan,
            vec!["10".into()],
        ))
        .with_sort("double_amount", true)
        .with_limit(5);

    assert_snapshot!(compile_sql(&query), @r#"
WITH metrics AS (
SELECT
  "orders".status AS "orders_status",
  SUM("orders".amount) AS "orders_total_amount"
FROM "public"."orders" AS "orders"
GROUP BY 1
)
SELECT
  *
FROM (
SELECT
  *,
  "orders_total_amount" * 2 AS "double_amount"
FROM metrics
) AS table_calculations
WHERE ("double_amount") > 10
ORDER BY "double_amount" DESC
LIMIT 5
"#);
}

#[test]
fn test_metric_filter_must_target_selected_metric() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_metric("orders.total_amount")
        .with_metric_filter(FilterNode::rule(
            "orders.order_count",
            FilterOperator::GreaterThan,
            vec![1.0.into()],
        ));
    let err = compile(&request(&explore, &query)).unwrap_err();
    assert_eq!(err, CompileError::UnresolvedReference("orders.order_count".into()));
}

// ============================================================================
// Custom dimensions
// ============================================================================

#[test]
fn test_sql_custom_dimension() {
    let query = MetricQuery::new("orders")
        .with_dimension("big_order")
        .with_metric("orders.order_count")
        .with_custom_dimension(CustomDimension::Sql {
            id: "big_order".into(),
            name: "Big order".into(),
            table: "orders".into(),
            sql: "${orders.amount} > 500".into(),
        });

    let sql = compile_sql(&query);
    assert!(sql.contains("  (\"orders\".amount) > 500 AS \"big_order\""));
}

#[test]
fn test_unselected_custom_dimension_is_ignored() {
    let query = MetricQuery::new("orders")
        .with_metric("orders.order_count")
        .with_custom_dimension(CustomDimension::Sql {
            id: "ghost".into(),
            name: "Ghost".into(),
            table: "customers".into(),
            sql: "${customers.name}".into(),
        });

    let sql = compile_sql(&query);
    assert!(!sql.contains("ghost"));
    assert!(!sql.contains("customers"));
}

// ============================================================================
// Errors and determinism
// ============================================================================

#[test]
fn test_unknown_field() {
    let explore = explore();
    let query = MetricQuery::new("orders").with_dimension("orders.nope");
    let err = compile(&request(&explore, &query)).unwrap_err();
    assert_eq!(err, CompileError::UnresolvedReference("orders.nope".into()));
}

#[test]
fn test_empty_query() {
    let explore = explore();
    let query = MetricQuery::new("orders");
    assert_eq!(
        compile(&request(&explore, &query)).unwrap_err(),
        CompileError::EmptyQuery
    );
}

#[test]
fn test_explore_mismatch() {
    let explore = explore();
    let query = MetricQuery::new("customers").with_metric("orders.total_amount");
    assert!(matches!(
        compile(&request(&explore, &query)),
        Err(CompileError::ExploreMismatch { .. })
    ));
}

#[test]
fn test_unknown_sort_field() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_metric("orders.total_amount")
        .with_sort("orders.status", false);
    assert_eq!(
        compile(&request(&explore, &query)).unwrap_err(),
        CompileError::UnresolvedReference("orders.status".into())
    );
}

#[test]
fn test_compilation_is_deterministic() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_dimension("regions.name")
        .with_dimension("payments.method")
        .with_metric("orders.total_amount")
        .with_metric("customers.customer_count");
    let attributes = UserAttributes::from([("team".to_string(), vec!["ops".to_string()])]);
    let first = compile(&request(&explore, &query).with_user_attributes(attributes.clone())).unwrap();
    let second = compile(&request(&explore, &query).with_user_attributes(attributes)).unwrap();
    assert_eq!(first, second);
}
