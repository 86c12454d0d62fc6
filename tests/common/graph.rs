/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::BTreeMap;

use aexec::graph::Graph;
use aexec::graph::SuccessorNodes;
use aexec::graph::DEFAULT_GRAPH_SUCCS_NUM;
use smallvec::SmallVec;

type NodeId = u32;
type EdgeId = u32;

pub struct Edge(NodeId, NodeId);

// A naive graph for testing. Edges keep their insertion order, which fixes
// the order successors are visited in.
#[derive(Default)]
pub struct SimpleGraph {
    succ_edges: BTreeMap<NodeId, Vec<EdgeId>>,
    pred_edges: BTreeMap<NodeId, Vec<EdgeId>>,
    edge_interner: Vec<Edge>,
    enter: NodeId,
    exit: NodeId,
}

impl SimpleGraph {
    pub fn new(enter: NodeId, exit: NodeId) -> Self {
        Self {
            enter,
            exit,
            ..Default::default()
        }
    }

    pub fn add_edge(&mut self, source: NodeId, target: NodeId) {
        // Duplicate edges will be counted too.
        self.edge_interner.push(Edge(source, target));
        let edge_id = (self.edge_interner.len() - 1) as EdgeId;
        self.succ_edges.entry(source).or_default().push(edge_id);
        self.pred_edges.entry(target).or_default().push(edge_id);
    }

    pub fn num_edges(&self) -> usize {
        self.edge_interner.len()
    }
}

impl Graph for SimpleGraph {
    type NodeId = NodeId;
    type EdgeId = EdgeId;

    fn entry(&self) -> Self::NodeId {
        self.enter
    }

    fn exit(&self) -> Self::NodeId {
        self.exit
    }

    fn predecessors(&self, n: Self::NodeId) -> SmallVec<[Self::EdgeId; DEFAULT_GRAPH_SUCCS_NUM]> {
        self.pred_edges
            .get(&n)
            .map(|v| v.iter().copied().collect())
            .unwrap_or_default()
    }

    fn successors(&self, n: Self::NodeId) -> SmallVec<[Self::EdgeId; DEFAULT_GRAPH_SUCCS_NUM]> {
        self.succ_edges
            .get(&n)
            .map(|v| v.iter().copied().collect())
            .unwrap_or_default()
    }

    fn source(&self, e: Self::EdgeId) -> Self::NodeId {
        self.edge_interner[e as usize].0
    }

    fn target(&self, e: Self::EdgeId) -> Self::NodeId {
        self.edge_interner[e as usize].1
    }
}

impl SuccessorNodes for SimpleGraph {
    type NodeId = NodeId;

    fn get_succ_nodes(&self, n: NodeId) -> SmallVec<[Self::NodeId; DEFAULT_GRAPH_SUCCS_NUM]> {
        self.successors(n)
            .iter()
            .map(|&edge_idx| self.edge_interner[edge_idx as usize].1)
            .collect()
    }
}
