#[path = "../common/mod.rs"]
mod common;

use common::{explore, parameters, request, validate_sql};
use lenscope::query::{
    IntrinsicUserAttributes, MetricQuery, ParameterValue, Parameters, TableCalculation,
    UserAttributes,
};
use lenscope::{compile, CompileError, Dialect};

fn attributes(pairs: &[(&str, &[&str])]) -> UserAttributes {
    pairs
        .iter()
        .map(|(name, values)| {
            (
                name.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}

// ============================================================================
// Parameters
// ============================================================================

#[test]
fn test_used_parameters_are_a_subset() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_dimension("orders.is_large")
        .with_metric("orders.total_amount");

    let compiled = compile(&request(&explore, &query).with_parameters(parameters())).unwrap();
    validate_sql(&compiled.sql, Dialect::Postgres).unwrap();

    assert!(compiled
        .sql
        .contains("  (\"orders\".amount) > 100 AS \"orders_is_large\""));
    let mut expected = Parameters::new();
    expected.insert("threshold".into(), ParameterValue::Number(100.0));
    assert_eq!(compiled.used_parameters, expected);
}

#[test]
fn test_no_parameters_used() {
    let explore = explore();
    let query = MetricQuery::new("orders").with_metric("orders.total_amount");
    let compiled = compile(&request(&explore, &query).with_parameters(parameters())).unwrap();
    assert!(compiled.used_parameters.is_empty());
}

#[test]
fn test_missing_parameter() {
    let explore = explore();
    let query = MetricQuery::new("orders").with_dimension("orders.is_large");
    assert_eq!(
        compile(&request(&explore, &query)).unwrap_err(),
        CompileError::ParameterSubstitution("threshold".into())
    );
}

#[test]
fn test_text_parameters_are_escaped() {
    let explore = explore();
    let query = MetricQuery::new("orders").with_dimension("orders.is_large");
    let mut params = Parameters::new();
    params.insert("threshold".into(), ParameterValue::Text("1' OR '1'='1".into()));

    let compiled = compile(&request(&explore, &query).with_parameters(params)).unwrap();
    assert!(compiled.sql.contains("> '1'' OR ''1''=''1'"));
}

#[test]
fn test_parameters_in_table_calculations() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_metric("orders.total_amount")
        .with_table_calculation(TableCalculation::new(
            "over_threshold",
            "${orders.total_amount} - ${ld.parameters.threshold}",
        ));

    let compiled = compile(&request(&explore, &query).with_parameters(parameters())).unwrap();
    validate_sql(&compiled.sql, Dialect::Postgres).unwrap();
    assert!(compiled
        .sql
        .contains("  \"orders_total_amount\" - 100 AS \"over_threshold\""));
    assert_eq!(
        compiled.used_parameters.keys().collect::<Vec<_>>(),
        vec!["threshold"]
    );
}

// ============================================================================
// User attributes
// ============================================================================

#[test]
fn test_attribute_values_are_inlined() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_dimension("customers.in_my_region")
        .with_metric("orders.order_count");
    let attrs = attributes(&[("region", &["EU", "US"])]);

    let compiled = compile(&request(&explore, &query).with_user_attributes(attrs)).unwrap();
    validate_sql(&compiled.sql, Dialect::Postgres).unwrap();
    assert!(compiled
        .sql
        .contains("\"customers\".region_code IN ('EU', 'US') AS \"customers_in_my_region\""));
}

#[test]
fn test_missing_attribute_is_forbidden() {
    let explore = explore();
    let query = MetricQuery::new("orders").with_dimension("customers.in_my_region");
    assert_eq!(
        compile(&request(&explore, &query)).unwrap_err(),
        CompileError::Forbidden("Missing user attribute \"region\"".into())
    );

    let empty = attributes(&[("region", &[])]);
    assert!(matches!(
        compile(&request(&explore, &query).with_user_attributes(empty)),
        Err(CompileError::Forbidden(_))
    ));
}

#[test]
fn test_intrinsic_email() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_dimension("orders.is_mine")
        .with_metric("orders.order_count");

    let intrinsic = IntrinsicUserAttributes {
        email: Some("ann@example.com".into()),
        user_uuid: None,
    };
    let compiled =
        compile(&request(&explore, &query).with_intrinsic_user_attributes(intrinsic)).unwrap();
    assert!(compiled
        .sql
        .contains("\"orders\".owner_email = 'ann@example.com' AS \"orders_is_mine\""));

    assert!(matches!(
        compile(&request(&explore, &query)),
        Err(CompileError::Forbidden(_))
    ));
}

#[test]
fn test_required_attributes_guard_tables() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_dimension("regions.name")
        .with_metric("orders.order_count");

    let forbidden = CompileError::Forbidden("You don't have access to table \"regions\"".into());
    assert_eq!(compile(&request(&explore, &query)).unwrap_err(), forbidden);

    let wrong_team = attributes(&[("team", &["sales"])]);
    assert_eq!(
        compile(&request(&explore, &query).with_user_attributes(wrong_team)).unwrap_err(),
        forbidden
    );

    let ops = attributes(&[("team", &["sales", "ops"])]);
    assert!(compile(&request(&explore, &query).with_user_attributes(ops)).is_ok());
}

#[test]
fn test_required_attributes_ignore_unjoined_tables() {
    let explore = explore();
    let query = MetricQuery::new("orders")
        .with_dimension("customers.name")
        .with_metric("orders.order_count");
    assert!(compile(&request(&explore, &query)).is_ok());
}
