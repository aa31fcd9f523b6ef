//! Static checks of an explore, independent of any query.
//!
//! Every field, join condition and row filter must resolve, and every joined
//! table must be reachable from the base table. Failures that depend on who
//! runs a query (user attributes) or with which parameters are skipped.

use indexmap::IndexSet;

use super::references::ReferenceResolver;
use crate::error::CompileError;
use crate::query::{IntrinsicUserAttributes, Parameters, UserAttributes};
use crate::semantic::explore::{Explore, FieldId};
use crate::semantic::join_graph::plan_joins;
use crate::sql::SqlDialect;

/// A problem found in an explore.
#[derive(Debug, Clone, PartialEq)]
pub struct ExploreIssue {
    /// What was being checked, e.g. `orders.total` or `join customers`.
    pub location: String,
    pub error: CompileError,
}

impl std::fmt::Display for ExploreIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.error)
    }
}

fn depends_on_caller(error: &CompileError) -> bool {
    matches!(
        error,
        CompileError::Forbidden(_) | CompileError::ParameterSubstitution(_)
    )
}

/// Check every definition in `explore`, returning all problems found.
pub fn validate_explore(explore: &Explore, dialect: &dyn SqlDialect) -> Vec<ExploreIssue> {
    let parameters = Parameters::new();
    let attributes = UserAttributes::new();
    let intrinsic = IntrinsicUserAttributes::default();
    let mut resolver = ReferenceResolver::new(explore, dialect, &parameters, &attributes, &intrinsic);

    let mut issues = vec![];
    let mut record = |location: String, result: Result<(), CompileError>| {
        if let Err(error) = result {
            if !depends_on_caller(&error) {
                issues.push(ExploreIssue { location, error });
            }
        }
    };

    record("base table".into(), explore.base().map(|_| ()));

    for (table, definition) in &explore.tables {
        for field in definition.dimensions.keys() {
            let id = FieldId::new(table, field);
            record(id.to_string(), resolver.dimension(&id).map(|_| ()));
        }
        for field in definition.metrics.keys() {
            let id = FieldId::new(table, field);
            record(id.to_string(), resolver.metric(&id).map(|_| ()));
        }
        if let Some(sql_where) = &definition.sql_where {
            record(
                format!("{} sql_where", table),
                resolver.template(table, sql_where).map(|_| ()),
            );
        }
    }

    let mut joined: IndexSet<String> = IndexSet::new();
    for join in &explore.joined_tables {
        record(
            format!("join {}", join.table),
            explore.table(&join.table).map(|_| ()),
        );
        record(
            format!("join {}", join.table),
            resolver.template(&join.table, &join.sql_on).map(|_| ()),
        );
        joined.insert(join.table.clone());
    }

    let plan = plan_joins(explore, &joined, |index| {
        let join = &explore.joined_tables[index];
        match resolver.template(&join.table, &join.sql_on) {
            Ok(resolved) => Ok(resolved.tables),
            // Already reported above; plan around it.
            Err(_) => Ok(IndexSet::new()),
        }
    });
    record("joins".into(), plan.map(|_| ()));

    issues
}
