//! Metric query compilation.
//!
//! The compiler turns a [`MetricQuery`](crate::query::MetricQuery) over an
//! [`Explore`](crate::semantic::Explore) into one SQL statement:
//!
//! 1. **Resolve** - expand field templates, recording tables and parameters
//! 2. **Plan** - choose and order the joins those tables need
//! 3. **Filter** - compile filter trees into predicates
//! 4. **Assemble** - base query, post-aggregation layers, ordering
//!
//! Compilation is pure: identical inputs give byte-identical output.

pub mod builder;
pub mod custom_dimensions;
pub mod filters;
pub mod references;
pub mod table_calculations;
pub mod time;
pub mod validate;

pub use builder::{compile, CompileRequest, MetricQueryBuilder};
pub use references::{ReferenceResolver, ResolvedSql};
pub use validate::{validate_explore, ExploreIssue};
