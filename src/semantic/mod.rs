//! Semantic layer - explores, their tables and joins.
//!
//! An [`Explore`] describes what can be queried; [`plan_joins`] decides which
//! of its joins a particular query needs and in what order.

pub mod explore;
pub mod join_graph;

pub use explore::{
    Dimension, Explore, FieldId, JoinEdge, JoinRelationship, JoinType, Metric, MetricType,
    TableDefinition, TimeInterval, ValueType,
};
pub use join_graph::{plan_joins, JoinPlan, PlannedJoin};
