//! SQL generation support.
//!
//! - [`dialect`] - warehouse dialect implementations (quoting, escaping,
//!   concatenation, bucketing, relative time)

pub mod dialect;

#[cfg(test)]
pub mod test_utils;

pub use dialect::{Dialect, IntervalUnit, SqlDialect};
