//! Shared fixtures for compiler integration tests.

#![allow(dead_code)]

use lenscope::query::{MetricQuery, ParameterValue, Parameters};
use lenscope::{CompileRequest, Dialect, Explore};
use serde_json::json;
use sqlparser::dialect::{BigQueryDialect, PostgreSqlDialect, RedshiftSqlDialect, SnowflakeDialect};
use sqlparser::parser::Parser;

pub const ALL_DIALECTS: [Dialect; 4] = [
    Dialect::Postgres,
    Dialect::Redshift,
    Dialect::BigQuery,
    Dialect::Snowflake,
];

/// Orders, joined to customers (many-to-one) and payments (one-to-many).
/// Regions hang off customers and require the `team` attribute.
pub fn explore() -> Explore {
    serde_json::from_value(json!({
        "name": "orders",
        "baseTable": "orders",
        "tables": {
            "orders": {
                "name": "orders",
                "schema": "public",
                "sqlTable": "orders",
                "dimensions": {
                    "id": { "name": "id", "sql": "${TABLE}.id", "type": "number" },
                    "status": { "name": "status", "sql": "${TABLE}.status", "type": "string" },
                    "amount": { "name": "amount", "sql": "${TABLE}.amount", "type": "number" },
                    "customer_id": { "name": "customer_id", "sql": "${TABLE}.customer_id", "type": "number" },
                    "is_paid": { "name": "is_paid", "sql": "${TABLE}.is_paid", "type": "boolean" },
                    "created": { "name": "created", "sql": "${TABLE}.created_at", "type": "timestamp" },
                    "created_month_name": {
                        "name": "created_month_name",
                        "sql": "TO_CHAR(${TABLE}.created_at, 'FMMonth')",
                        "type": "string",
                        "timeInterval": "MONTH_NAME"
                    },
                    "is_large": {
                        "name": "is_large",
                        "sql": "${amount} > ${lightdash.parameters.threshold}",
                        "type": "boolean"
                    },
                    "is_mine": {
                        "name": "is_mine",
                        "sql": "${TABLE}.owner_email = ${lightdash.user.email}",
                        "type": "boolean"
                    }
                },
                "metrics": {
                    "total_amount": { "name": "total_amount", "sql": "${TABLE}.amount", "type": "sum" },
                    "order_count": { "name": "order_count", "sql": "${TABLE}.id", "type": "count_distinct" }
                }
            },
            "customers": {
                "name": "customers",
                "schema": "public",
                "sqlTable": "customers",
                "dimensions": {
                    "id": { "name": "id", "sql": "${TABLE}.id", "type": "number" },
                    "name": { "name": "name", "sql": "${TABLE}.name", "type": "string" },
                    "age": { "name": "age", "sql": "${TABLE}.age", "type": "number" },
                    "region_id": { "name": "region_id", "sql": "${TABLE}.region_id", "type": "number" },
                    "in_my_region": {
                        "name": "in_my_region",
                        "sql": "${TABLE}.region_code IN (${ld.attr.region})",
                        "type": "boolean"
                    }
                },
                "metrics": {
                    "customer_count": { "name": "customer_count", "sql": "${TABLE}.id", "type": "count_distinct" }
                }
            },
            "payments": {
                "name": "payments",
                "schema": "public",
                "sqlTable": "payments",
                "sqlWhere": "${TABLE}.refunded = false",
                "dimensions": {
                    "order_id": { "name": "order_id", "sql": "${TABLE}.order_id", "type": "number" },
                    "method": { "name": "method", "sql": "${TABLE}.method", "type": "string" }
                },
                "metrics": {
                    "total_paid": { "name": "total_paid", "sql": "${TABLE}.amount", "type": "sum" }
                }
            },
            "regions": {
                "name": "regions",
                "schema": "public",
                "sqlTable": "regions",
                "requiredAttributes": { "team": ["finance", "ops"] },
                "dimensions": {
                    "id": { "name": "id", "sql": "${TABLE}.id", "type": "number" },
                    "name": { "name": "name", "sql": "${TABLE}.name", "type": "string" }
                }
            }
        },
        "joinedTables": [
            {
                "table": "customers",
                "sqlOn": "${orders.customer_id} = ${customers.id}",
                "relationship": "many-to-one"
            },
            {
                "table": "payments",
                "sqlOn": "${orders.id} = ${payments.order_id}",
                "relationship": "one-to-many"
            },
            {
                "table": "regions",
                "sqlOn": "${customers.region_id} = ${regions.id}",
                "relationship": "many-to-one"
            }
        ]
    }))
    .expect("fixture explore is valid")
}

pub fn parameters() -> Parameters {
    let mut parameters = Parameters::new();
    parameters.insert("threshold".into(), ParameterValue::Number(100.0));
    parameters.insert("unused".into(), ParameterValue::Text("ignored".into()));
    parameters
}

pub fn request<'a>(explore: &'a Explore, query: &'a MetricQuery) -> CompileRequest<'a> {
    CompileRequest::new(explore, query)
}

/// Parses `sql` with sqlparser's grammar for `dialect`.
pub fn validate_sql(sql: &str, dialect: Dialect) -> Result<(), String> {
    let parser_dialect: Box<dyn sqlparser::dialect::Dialect> = match dialect {
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::Redshift => Box::new(RedshiftSqlDialect {}),
        Dialect::BigQuery => Box::new(BigQueryDialect {}),
        Dialect::Snowflake => Box::new(SnowflakeDialect {}),
    };

    Parser::parse_sql(&*parser_dialect, sql)
        .map(|_| ())
        .map_err(|e| format!("Invalid SQL for {:?}: {}\nSQL: {}", dialect, e, sql))
}
