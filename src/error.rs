//! Error types for query compilation.
//!
//! Every error is a deterministic function of the inputs: nothing here is
//! transient and nothing is retried. The remedy is always to fix the query,
//! the explore or the supplied parameters/attributes.

/// Errors that can occur while compiling a metric query.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// A user or intrinsic attribute required by a template is missing, or the
    /// user does not hold a table's required attribute.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A field reference does not exist in the explore.
    #[error("Unresolved reference: '{0}'")]
    UnresolvedReference(String),

    /// Field templates reference each other in a loop.
    #[error("Cyclic reference: {}", .0.join(" -> "))]
    CyclicReference(Vec<String>),

    /// A required table cannot be reached from the base table.
    #[error("No join path from '{base}' to table '{table}'")]
    JoinPathNotFound { base: String, table: String },

    /// A filter value does not match its field's type.
    #[error("Invalid {expected} value in filter: \"{value}\". Expected a valid {expected}.")]
    InvalidFilterValue {
        value: String,
        expected: &'static str,
    },

    /// A filter rule is structurally invalid (wrong arity, unsupported target).
    #[error("Invalid filter on '{target}': {reason}")]
    InvalidFilter { target: String, reason: String },

    /// A parameter token has no value in the supplied parameter map.
    #[error("Missing value for parameter '{0}'")]
    ParameterSubstitution(String),

    /// A custom dimension definition cannot be compiled.
    #[error("Invalid custom dimension '{id}': {reason}")]
    InvalidCustomDimension { id: String, reason: String },

    #[error("Unknown table: '{0}'")]
    UnknownTable(String),

    #[error("Query selects no dimensions or metrics")]
    EmptyQuery,

    #[error("Query targets explore '{query}' but explore '{explore}' was supplied")]
    ExploreMismatch { query: String, explore: String },
}

pub type CompileResult<T> = Result<T, CompileError>;
