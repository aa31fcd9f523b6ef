#[path = "../common/mod.rs"]
mod common;

use common::{explore, request, validate_sql};
use lenscope::query::{BinType, CustomDimension, FilterNode, FilterOperator, MetricQuery};
use lenscope::{compile, CompileError, Dialect};

fn bin(id: &str, dimension_id: &str, bin_type: BinType) -> CustomDimension {
    CustomDimension::Bin {
        id: id.into(),
        name: id.into(),
        table: dimension_id.split(['.', '_']).next().unwrap_or_default().into(),
        dimension_id: dimension_id.into(),
        bin_type,
    }
}

#[test]
fn test_fixed_number_bin_uses_range_cte() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_dimension("amount_range")
        .with_metric("orders.total_amount")
        .with_custom_dimension(bin(
            "amount_range",
            "orders_amount",
            BinType::FixedNumber { bin_number: 3 },
        ));

    let compiled = compile(&request(&explore, &query)).unwrap();
    validate_sql(&compiled.sql, Dialect::Postgres).unwrap();

    assert!(compiled.sql.starts_with(
        "WITH amount_range_cte AS (\nSELECT\n  MIN((\"orders\".amount)) AS min_id,\n  MAX((\"orders\".amount)) AS max_id\nFROM \"public\".\"orders\" AS \"orders\"\n)\n"
    ));
    assert!(compiled.sql.contains("CROSS JOIN amount_range_cte\nGROUP BY 1"));
    assert!(compiled.sql.contains("amount_range_cte.min_id"));
    assert!(compiled.warnings.is_empty());
}

#[test]
fn test_fixed_number_bin_on_integer_column_divides_as_float() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_dimension("age_range")
        .with_metric("orders.total_amount")
        .with_custom_dimension(bin(
            "age_range",
            "customers.age",
            BinType::FixedNumber { bin_number: 10 },
        ))
        .with_sort("age_range", false);

    for dialect in [Dialect::Postgres, Dialect::BigQuery] {
        let compiled = compile(&request(&explore, &query).with_dialect(dialect)).unwrap();
        validate_sql(&compiled.sql, dialect).unwrap();

        let float = if dialect == Dialect::BigQuery { "FLOAT64" } else { "DOUBLE PRECISION" };
        let width = format!(
            "((CAST(age_range_cte.max_id AS {}) - age_range_cte.min_id) / 10)",
            float
        );
        assert!(compiled
            .sql
            .contains(&format!("age_range_cte.min_id + {} * 9", width)));
        assert!(!compiled
            .sql
            .contains("((age_range_cte.max_id - age_range_cte.min_id) / 10)"));
        assert!(compiled.sql.contains(&format!(
            "age_range_cte.min_id + {} * 9 THEN 8\n    ELSE 9",
            width
        )));
    }
}

#[test]
fn test_bin_warns_about_inflated_metrics() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_dimension("amount_range")
        .with_metric("orders.total_amount")
        .with_metric("customers.customer_count")
        .with_custom_dimension(bin(
            "amount_range",
            "orders.amount",
            BinType::FixedNumber { bin_number: 3 },
        ));

    let compiled = compile(&request(&explore, &query)).unwrap();

    assert!(compiled.sql.contains("WITH amount_range_cte AS"));
    // The range CTE reads the same joined rows as the base query.
    let cte_end = compiled.sql.find("\n)\n").unwrap();
    assert!(compiled.sql[..cte_end].contains("LEFT OUTER JOIN \"public\".\"customers\""));

    assert_eq!(compiled.warnings.len(), 1);
    assert_eq!(
        compiled.warnings[0].message,
        "customers.customer_count could be inflated due to join relationships"
    );
    assert_eq!(compiled.warnings[0].tables, vec!["customers".to_string()]);
}

#[test]
fn test_fixed_width_bin_is_inline() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_dimension("age_range")
        .with_metric("orders.total_amount")
        .with_custom_dimension(bin(
            "age_range",
            "customers.age",
            BinType::FixedWidth { bin_width: 10.0 },
        ))
        .with_sort("age_range", false);

    let compiled = compile(&request(&explore, &query)).unwrap();
    validate_sql(&compiled.sql, Dialect::Postgres).unwrap();

    assert!(!compiled.sql.contains("WITH"));
    assert!(compiled.sql.contains(
        "  (CAST(FLOOR((\"customers\".age) / 10) * 10 AS TEXT) || ' - ' || CAST((FLOOR((\"customers\".age) / 10) + 1) * 10 - 1 AS TEXT)) AS \"age_range\""
    ));
    assert!(compiled
        .sql
        .contains("  FLOOR((\"customers\".age) / 10) * 10 AS \"age_range_order\""));
    assert!(compiled.sql.contains("GROUP BY 1, 2"));
    assert!(compiled.sql.ends_with("ORDER BY \"age_range_order\""));
    // Orders sit on the many side of customers, so their sums are safe.
    assert!(compiled.warnings.is_empty());
}

#[test]
fn test_unsorted_bin_has_no_order_column() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_dimension("age_range")
        .with_metric("orders.total_amount")
        .with_custom_dimension(bin(
            "age_range",
            "customers.age",
            BinType::FixedWidth { bin_width: 10.0 },
        ));

    let compiled = compile(&request(&explore, &query)).unwrap();
    assert!(!compiled.sql.contains("age_range_order"));
    assert!(compiled.sql.contains("GROUP BY 1\n") || compiled.sql.ends_with("GROUP BY 1"));
}

#[test]
fn test_fixed_number_bin_cannot_be_filtered() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_dimension("amount_range")
        .with_metric("orders.total_amount")
        .with_custom_dimension(bin(
            "amount_range",
            "orders.amount",
            BinType::FixedNumber { bin_number: 3 },
        ))
        .with_dimension_filter(FilterNode::rule(
            "amount_range",
            FilterOperator::Equals,
            vec!["0 - 10".into()],
        ));

    assert!(matches!(
        compile(&request(&explore, &query)),
        Err(CompileError::InvalidFilter { .. })
    ));
}

#[test]
fn test_invalid_bins() {
    let explore = explore();

    let zero = MetricQuery::new("orders")
        .with_dimension("amount_range")
        .with_custom_dimension(bin(
            "amount_range",
            "orders.amount",
            BinType::FixedNumber { bin_number: 0 },
        ));
    assert!(matches!(
        compile(&request(&explore, &zero)),
        Err(CompileError::InvalidCustomDimension { .. })
    ));

    let bad_id = MetricQuery::new("orders")
        .with_dimension("amount range")
        .with_custom_dimension(bin(
            "amount range",
            "orders.amount",
            BinType::FixedWidth { bin_width: 5.0 },
        ));
    assert!(matches!(
        compile(&request(&explore, &bad_id)),
        Err(CompileError::InvalidCustomDimension { .. })
    ));

    let missing = MetricQuery::new("orders")
        .with_dimension("weight_range")
        .with_custom_dimension(bin(
            "weight_range",
            "orders.weight",
            BinType::FixedWidth { bin_width: 5.0 },
        ));
    assert_eq!(
        compile(&request(&explore, &missing)).unwrap_err(),
        CompileError::UnresolvedReference("orders.weight".into())
    );
}

#[test]
fn test_custom_dimensions_from_json() {
    let explore = explore();
    let query: MetricQuery = serde_json::from_str(
        r#"{
            "exploreName": "orders",
            "dimensions": ["age_range"],
            "metrics": ["orders.order_count"],
            "customDimensions": [
                {
                    "type": "bin",
                    "id": "age_range",
                    "name": "Age range",
                    "table": "customers",
                    "dimensionId": "customers_age",
                    "binType": { "mode": "fixedWidth", "binWidth": 5 }
                },
                {
                    "type": "sql",
                    "id": "unused",
                    "name": "Unused",
                    "table": "payments",
                    "sql": "${payments.method}"
                }
            ]
        }"#,
    )
    .unwrap();

    let compiled = compile(&request(&explore, &query)).unwrap();
    assert!(compiled.sql.contains("AS \"age_range\""));
    assert!(!compiled.sql.contains("payments"));
}
