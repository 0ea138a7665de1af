use std::collections::HashMap;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;

use crate::error::ExecError;
use crate::request::DataSpecMap;

/// Dependency graph derived from a data-spec mapping.
///
/// Nodes are variable names; an edge runs from a dependency to its dependent,
/// so a valid execution order is any topological order of this graph.
#[derive(Debug)]
pub struct DependencyGraph {
    pub(crate) graph: StableDiGraph<String, ()>,
    pub(crate) node_index_map: HashMap<String, NodeIndex>,
    /// Variable names in declaration order, used to break ordering ties.
    pub(crate) declaration_order: Vec<String>,
}

impl DependencyGraph {
    /// Names of the variables `name` depends on.
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        let Some(idx) = self.node_index_map.get(name) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(*idx, Direction::Incoming)
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

/// Build the dependency graph, rejecting references to undeclared variables.
pub fn build_dependency_graph(specs: &DataSpecMap) -> Result<DependencyGraph, ExecError> {
    let mut graph = StableDiGraph::new();
    let mut node_index_map = HashMap::new();
    let mut declaration_order = Vec::with_capacity(specs.len());

    for name in specs.names() {
        let idx = graph.add_node(name.to_string());
        node_index_map.insert(name.to_string(), idx);
        declaration_order.push(name.to_string());
    }

    for (name, spec) in specs.iter() {
        let Some(passed) = &spec.passed_variables else {
            continue;
        };
        let dependent_idx = node_index_map[name];
        for (target, pv) in passed {
            let source_idx = node_index_map.get(&pv.passed_from).ok_or_else(|| {
                ExecError::Validation(format!(
                    "variable '{}' passed-variable '{}' references undeclared variable '{}'",
                    name, target, pv.passed_from
                ))
            })?;
            graph.add_edge(*source_idx, dependent_idx, ());
        }
    }

    Ok(DependencyGraph {
        graph,
        node_index_map,
        declaration_order,
    })
}
