//! Join planning for an explore.
//!
//! Given the tables a query touches, computes which declared joins are needed
//! and the order to emit them in. The graph has one node per candidate table
//! and an edge from every table referenced by a join's `sql_on` to that join's
//! target, so a breadth-first walk from the base table only emits a join once
//! everything its condition references is already in the `FROM` clause.
//!
//! ```text
//! orders ──(customers.sql_on)──▶ customers ──(regions.sql_on)──▶ regions
//! ```

use std::collections::{HashMap, VecDeque};

use indexmap::IndexSet;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::debug;

use super::explore::{Explore, JoinRelationship, JoinType};
use crate::error::{CompileError, CompileResult};

/// A join selected for the query.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedJoin {
    /// Position of the join in `Explore::joined_tables`.
    pub index: usize,
    pub table: String,
    pub relationship: Option<JoinRelationship>,
    pub join_type: JoinType,
    /// One-to-many or many-to-many: rows of earlier tables may be duplicated.
    pub fan_out: bool,
    /// The already-joined table this join was reached from.
    pub parent: String,
}

/// Ordered joins for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPlan {
    pub base_table: String,
    pub joins: Vec<PlannedJoin>,
}

impl JoinPlan {
    /// Base table followed by joined tables, in emission order.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.base_table.as_str()).chain(self.joins.iter().map(|j| j.table.as_str()))
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables().any(|t| t == table)
    }

    fn join_for(&self, table: &str) -> Option<&PlannedJoin> {
        self.joins.iter().find(|j| j.table == table)
    }

    /// `table`, its parent, and so on up to the base table.
    fn ancestors<'a>(&'a self, table: &'a str) -> Vec<&'a str> {
        let mut chain = vec![table];
        let mut current = table;
        while let Some(join) = self.join_for(current) {
            current = join.parent.as_str();
            chain.push(current);
        }
        chain
    }

    /// Relationships crossed walking the join tree from `from` to `to`, each
    /// read in the direction of travel.
    ///
    /// Returns `None` if either table is not part of the plan. A step whose
    /// join declares no relationship is `None`.
    pub fn relationship_path(
        &self,
        from: &str,
        to: &str,
    ) -> Option<Vec<Option<JoinRelationship>>> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        let up = self.ancestors(from);
        let down = self.ancestors(to);
        let common = up.iter().copied().find(|t| down.contains(t))?;

        let mut steps = vec![];
        for table in up.iter().copied().take_while(|&t| t != common) {
            let join = self.join_for(table)?;
            steps.push(join.relationship.map(JoinRelationship::reverse));
        }
        let descent: Vec<&str> = down.iter().copied().take_while(|&t| t != common).collect();
        for table in descent.into_iter().rev() {
            steps.push(self.join_for(table)?.relationship);
        }
        Some(steps)
    }

    /// Can rows of `from` be duplicated when `to` is part of the query?
    pub fn fans_out_between(&self, from: &str, to: &str) -> bool {
        self.relationship_path(from, to)
            .is_some_and(|steps| steps.iter().flatten().any(|r| r.causes_fanout()))
    }
}

/// Plan the joins needed to reach `required` tables from the explore's base.
///
/// `condition_tables` returns the tables referenced by the `sql_on` of the
/// join at the given index. It is only called for joins that end up in the
/// plan.
pub fn plan_joins<F>(
    explore: &Explore,
    required: &IndexSet<String>,
    mut condition_tables: F,
) -> CompileResult<JoinPlan>
where
    F: FnMut(usize) -> CompileResult<IndexSet<String>>,
{
    let base = explore.base_table.as_str();
    let not_found = |table: &str| CompileError::JoinPathNotFound {
        base: base.to_string(),
        table: table.to_string(),
    };

    // Close the required set over join conditions.
    let mut pending: VecDeque<String> = required.iter().cloned().collect();
    pending.extend(
        explore
            .joined_tables
            .iter()
            .filter(|j| j.always)
            .map(|j| j.table.clone()),
    );

    let mut needed: IndexSet<usize> = IndexSet::new();
    let mut references: HashMap<usize, IndexSet<String>> = HashMap::new();

    while let Some(table) = pending.pop_front() {
        if table == base {
            continue;
        }
        let index = explore.join_index(&table).ok_or_else(|| not_found(&table))?;
        if !needed.insert(index) {
            continue;
        }
        let mut refs = condition_tables(index)?;
        refs.shift_remove(&table);
        pending.extend(refs.iter().cloned());
        references.insert(index, refs);
    }

    // Build the dependency graph over the base and the needed joins.
    let mut graph: DiGraph<String, usize> = DiGraph::new();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
    nodes.insert(base.to_string(), graph.add_node(base.to_string()));
    for &index in &needed {
        let table = &explore.joined_tables[index].table;
        nodes.insert(table.clone(), graph.add_node(table.clone()));
    }
    for &index in &needed {
        let target = nodes[&explore.joined_tables[index].table];
        let refs = &references[&index];
        if refs.is_empty() {
            graph.add_edge(nodes[base], target, index);
        }
        for reference in refs {
            let source = *nodes.get(reference).ok_or_else(|| not_found(reference))?;
            graph.add_edge(source, target, index);
        }
    }

    // Breadth-first emission from the base table.
    let mut emitted: IndexSet<String> = IndexSet::new();
    let mut joins = vec![];
    let mut queue: VecDeque<NodeIndex> = VecDeque::new();
    emitted.insert(base.to_string());
    queue.push_back(nodes[base]);

    while let Some(current) = queue.pop_front() {
        let mut outgoing: Vec<(usize, NodeIndex)> = graph
            .edges(current)
            .map(|edge| (*edge.weight(), edge.target()))
            .collect();
        outgoing.sort_by_key(|(index, _)| *index);
        outgoing.dedup_by_key(|(index, _)| *index);

        for (index, target) in outgoing {
            let table = &graph[target];
            if emitted.contains(table) {
                continue;
            }
            if !references[&index].iter().all(|r| emitted.contains(r)) {
                continue;
            }
            let edge = &explore.joined_tables[index];
            joins.push(PlannedJoin {
                index,
                table: table.clone(),
                relationship: edge.relationship,
                join_type: edge.join_type,
                fan_out: edge.causes_fanout(),
                parent: graph[current].clone(),
            });
            emitted.insert(table.clone());
            queue.push_back(target);
        }
    }

    if let Some(&index) = needed
        .iter()
        .find(|&&i| !emitted.contains(&explore.joined_tables[i].table))
    {
        return Err(not_found(&explore.joined_tables[index].table));
    }

    debug!(
        base = base,
        joins = ?joins.iter().map(|j| j.table.as_str()).collect::<Vec<_>>(),
        "planned joins"
    );

    Ok(JoinPlan {
        base_table: base.to_string(),
        joins,
    })
}
