/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;
use std::collections::HashSet;

use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use petgraph::graph::NodeIndex;
use petgraph::visit::Dfs;
use petgraph::Direction;

use crate::ir::FunId;
use crate::ir::NodeId;

/// Function-level call graph. Edges are labelled with their call site and
/// cover direct calls plus the resolved targets of indirect calls.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    graph: DiGraph<FunId, NodeId>,
    indices: HashMap<FunId, NodeIndex>,
    scc_ids: HashMap<FunId, usize>,
    sccs: Vec<Vec<FunId>>,
    recursive: HashSet<FunId>,
}

impl CallGraph {
    pub fn build<F, E>(functions: F, edges: E) -> Self
    where
        F: IntoIterator<Item = FunId>,
        E: IntoIterator<Item = (FunId, FunId, NodeId)>,
    {
        let mut cg = Self::default();
        for fun in functions {
            let index = cg.graph.add_node(fun);
            cg.indices.insert(fun, index);
        }
        for (caller, callee, call_site) in edges {
            if let (Some(&from), Some(&to)) = (cg.indices.get(&caller), cg.indices.get(&callee)) {
                cg.graph.add_edge(from, to, call_site);
            }
        }
        cg.compute_sccs();
        cg
    }

    fn compute_sccs(&mut self) {
        // tarjan_scc yields components in reverse topological order.
        for (scc_id, component) in tarjan_scc(&self.graph).into_iter().enumerate() {
            let members: Vec<FunId> = component.iter().map(|&index| self.graph[index]).collect();
            let is_cycle = members.len() > 1
                || component
                    .first()
                    .map_or(false, |&index| self.graph.find_edge(index, index).is_some());
            for &fun in &members {
                self.scc_ids.insert(fun, scc_id);
                if is_cycle {
                    self.recursive.insert(fun);
                }
            }
            self.sccs.push(members);
        }
    }

    fn neighbors(&self, fun: FunId, direction: Direction) -> Vec<FunId> {
        let mut result: Vec<FunId> = match self.indices.get(&fun) {
            Some(&index) => self
                .graph
                .neighbors_directed(index, direction)
                .map(|n| self.graph[n])
                .collect(),
            None => Vec::new(),
        };
        result.sort();
        result.dedup();
        result
    }

    pub fn callees(&self, fun: FunId) -> Vec<FunId> {
        self.neighbors(fun, Direction::Outgoing)
    }

    pub fn callers(&self, fun: FunId) -> Vec<FunId> {
        self.neighbors(fun, Direction::Incoming)
    }

    pub fn has_callers(&self, fun: FunId) -> bool {
        !self.callers(fun).is_empty()
    }

    pub fn scc_id(&self, fun: FunId) -> Option<usize> {
        self.scc_ids.get(&fun).copied()
    }

    /// Members of the strongly connected component containing `fun`.
    pub fn scc_members(&self, fun: FunId) -> &[FunId] {
        match self.scc_id(fun) {
            Some(id) => &self.sccs[id],
            None => &[],
        }
    }

    /// Whether `fun` belongs to a cycle of the call graph.
    pub fn is_recursive(&self, fun: FunId) -> bool {
        self.recursive.contains(&fun)
    }

    pub fn recursive_functions(&self) -> &HashSet<FunId> {
        &self.recursive
    }

    /// `fun` and every function it may transitively call.
    pub fn reachable_from(&self, fun: FunId) -> Vec<FunId> {
        let start = match self.indices.get(&fun) {
            Some(&index) => index,
            None => return Vec::new(),
        };
        let mut dfs = Dfs::new(&self.graph, start);
        let mut reached = Vec::new();
        while let Some(index) = dfs.next(&self.graph) {
            reached.push(self.graph[index]);
        }
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(id: u32) -> FunId {
        FunId::new(id)
    }

    fn cs(id: u32) -> NodeId {
        NodeId::new(id)
    }

    #[test]
    fn test_recursive_functions() {
        // 0 -> 1 <-> 2, 2 -> 3, 4 -> 4
        let cg = CallGraph::build(
            (0..5).map(f),
            [
                (f(0), f(1), cs(10)),
                (f(1), f(2), cs(11)),
                (f(2), f(1), cs(12)),
                (f(2), f(3), cs(13)),
                (f(4), f(4), cs(14)),
            ],
        );
        assert!(!cg.is_recursive(f(0)));
        assert!(cg.is_recursive(f(1)));
        assert!(cg.is_recursive(f(2)));
        assert!(!cg.is_recursive(f(3)));
        assert!(cg.is_recursive(f(4)));
        assert_eq!(cg.scc_id(f(1)), cg.scc_id(f(2)));
        assert_ne!(cg.scc_id(f(0)), cg.scc_id(f(1)));
        assert_eq!(cg.scc_members(f(1)).len(), 2);
    }

    #[test]
    fn test_neighbors_and_reachability() {
        let cg = CallGraph::build(
            (0..4).map(f),
            [
                (f(0), f(1), cs(10)),
                (f(0), f(1), cs(11)),
                (f(1), f(2), cs(12)),
            ],
        );
        assert_eq!(cg.callees(f(0)), vec![f(1)]);
        assert_eq!(cg.callers(f(2)), vec![f(1)]);
        assert!(!cg.has_callers(f(0)));
        let mut reached = cg.reachable_from(f(0));
        reached.sort();
        assert_eq!(reached, vec![f(0), f(1), f(2)]);
        assert_eq!(cg.reachable_from(f(3)), vec![f(3)]);
    }
}
