use std::collections::{HashMap, HashSet};

use petgraph::Direction;

use crate::error::ExecError;

use super::builder::DependencyGraph;

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

impl DependencyGraph {
    /// Depth-first cycle check. Returns the full cycle chain (first node
    /// repeated at the end) if one exists.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut colors: HashMap<&str, Color> = self
            .declaration_order
            .iter()
            .map(|n| (n.as_str(), Color::White))
            .collect();

        for name in &self.declaration_order {
            if colors[name.as_str()] == Color::White {
                let mut path = Vec::new();
                if let Some(cycle) = self.dfs_visit(name, &mut colors, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_visit<'a>(
        &'a self,
        name: &'a str,
        colors: &mut HashMap<&'a str, Color>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        colors.insert(name, Color::Gray);
        path.push(name);

        let idx = self.node_index_map[name];
        let mut successors: Vec<&str> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .filter_map(|n| self.graph.node_weight(n).map(|w| w.as_str()))
            .collect();
        // neighbors_directed yields in reverse insertion order; sort by
        // declaration position so the reported chain is deterministic
        successors.sort_by_key(|s| self.declaration_order.iter().position(|n| n.as_str() == *s));

        for succ in successors {
            match colors[succ] {
                Color::Gray => {
                    let start = path.iter().position(|n| *n == succ).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(succ.to_string());
                    return Some(cycle);
                }
                Color::White => {
                    if let Some(cycle) = self.dfs_visit(succ, colors, path) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        path.pop();
        colors.insert(name, Color::Black);
        None
    }

    /// Stable topological order: Kahn's algorithm, with declaration order
    /// breaking ties between simultaneously-ready nodes.
    ///
    /// Fails with a `dependency_cycle_error` naming the cycle chain if the
    /// graph is cyclic.
    pub fn execution_order(&self) -> Result<Vec<String>, ExecError> {
        if let Some(path) = self.find_cycle() {
            return Err(ExecError::DependencyCycle { path });
        }

        let mut indegree: HashMap<&str, usize> = HashMap::new();
        for name in &self.declaration_order {
            let idx = self.node_index_map[name];
            indegree.insert(
                name.as_str(),
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count(),
            );
        }

        let mut order = Vec::with_capacity(self.declaration_order.len());
        let mut placed: HashSet<&str> = HashSet::new();

        while order.len() < self.declaration_order.len() {
            // first zero-indegree node in declaration order
            let next = self
                .declaration_order
                .iter()
                .map(|n| n.as_str())
                .find(|n| !placed.contains(n) && indegree[n] == 0);
            let Some(next) = next else {
                // unreachable once find_cycle has passed; belt and braces
                return Err(ExecError::DependencyCycle {
                    path: self
                        .declaration_order
                        .iter()
                        .filter(|n| !placed.contains(n.as_str()))
                        .cloned()
                        .collect(),
                });
            };

            placed.insert(next);
            order.push(next.to_string());

            let idx = self.node_index_map[next];
            for succ in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(name) = self.graph.node_weight(succ) {
                    if let Some(d) = indegree.get_mut(name.as_str()) {
                        *d = d.saturating_sub(1);
                    }
                }
            }
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::super::builder::build_dependency_graph;
    use crate::request::{DataSpec, DataSpecMap};
    use serde_json::json;

    fn spec_depending_on(sources: &[&str]) -> DataSpec {
        let mut passed = serde_json::Map::new();
        for (i, source) in sources.iter().enumerate() {
            passed.insert(
                format!("body.field_{}", i),
                json!({"passed_from": source, "value": "${result.id}"}),
            );
        }
        let mut value = json!({"url": "https://api.example.com/x"});
        if !passed.is_empty() {
            value["passed_variables"] = serde_json::Value::Object(passed);
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_order_puts_dependencies_first() {
        let mut specs = DataSpecMap::new();
        specs.insert("c", spec_depending_on(&["b"]));
        specs.insert("b", spec_depending_on(&["a"]));
        specs.insert("a", spec_depending_on(&[]));
        let graph = build_dependency_graph(&specs).unwrap();
        let order = graph.execution_order().unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_independent_nodes_keep_declaration_order() {
        let mut specs = DataSpecMap::new();
        specs.insert("zeta", spec_depending_on(&[]));
        specs.insert("alpha", spec_depending_on(&[]));
        specs.insert("mid", spec_depending_on(&["zeta"]));
        let graph = build_dependency_graph(&specs).unwrap();
        let order = graph.execution_order().unwrap();
        assert_eq!(order, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_cycle_reports_full_chain() {
        let mut specs = DataSpecMap::new();
        specs.insert("a", spec_depending_on(&["c"]));
        specs.insert("b", spec_depending_on(&["a"]));
        specs.insert("c", spec_depending_on(&["b"]));
        let graph = build_dependency_graph(&specs).unwrap();
        let err = graph.execution_order().unwrap_err();
        assert_eq!(err.kind(), "dependency_cycle_error");
        let msg = err.to_string();
        assert!(msg.contains("a"));
        assert!(msg.contains("b"));
        assert!(msg.contains("c"));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut specs = DataSpecMap::new();
        specs.insert("a", spec_depending_on(&["a"]));
        let graph = build_dependency_graph(&specs).unwrap();
        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle, vec!["a", "a"]);
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let mut specs = DataSpecMap::new();
        specs.insert("root", spec_depending_on(&[]));
        specs.insert("left", spec_depending_on(&["root"]));
        specs.insert("right", spec_depending_on(&["root"]));
        specs.insert("sink", spec_depending_on(&["left", "right"]));
        let graph = build_dependency_graph(&specs).unwrap();
        assert!(graph.find_cycle().is_none());
        let order = graph.execution_order().unwrap();
        assert_eq!(order[0], "root");
        assert_eq!(order[3], "sink");
        assert_eq!(order[1], "left");
        assert_eq!(order[2], "right");
    }

    #[test]
    fn test_order_is_deterministic_across_runs() {
        let mut specs = DataSpecMap::new();
        specs.insert("d", spec_depending_on(&[]));
        specs.insert("c", spec_depending_on(&[]));
        specs.insert("b", spec_depending_on(&["d"]));
        specs.insert("a", spec_depending_on(&["c", "b"]));
        let graph = build_dependency_graph(&specs).unwrap();
        let first = graph.execution_order().unwrap();
        for _ in 0..10 {
            assert_eq!(graph.execution_order().unwrap(), first);
        }
        assert_eq!(first, vec!["d", "c", "b", "a"]);
    }
}
