//! # Lenscope
//!
//! Compiles metric queries against an explore into dialect-correct SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Explore (tables, fields, joins) + MetricQuery     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [references]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Resolved field SQL, parameters, user attributes        │
//! │   + filters, custom dimensions, table calculations       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [join graph]
//! ┌─────────────────────────────────────────────────────────┐
//! │          Join plan (minimal, ordered, fan-out aware)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [builder]
//! ┌─────────────────────────────────────────────────────────┐
//! │         SQL + warnings + used parameters                 │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ```ignore
//! use lenscope::{compile, CompileRequest, Dialect};
//!
//! let request = CompileRequest::new(&explore, &query).with_dialect(Dialect::BigQuery);
//! let compiled = compile(&request)?;
//! println!("{}", compiled.sql);
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod query;
pub mod semantic;
pub mod sql;

pub use compiler::{compile, validate_explore, CompileRequest, MetricQueryBuilder};
pub use error::{CompileError, CompileResult};
pub use query::{CompiledQuery, MetricQuery};
pub use semantic::Explore;
pub use sql::dialect::{Dialect, SqlDialect};
