/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::hash::Hash;

use smallvec::SmallVec;

pub const DEFAULT_GRAPH_SUCCS_NUM: usize = 4;

/// Rooted graph walked by the abstract interpreter.
///
/// The per-function view of the ICFG implements it: entry and exit are the
/// function's entry and exit nodes, edges are the intraprocedural ones.
/// `S` is the expected number of edges per node, only a sizing hint for the
/// inline storage of the returned vectors.
pub trait Graph<const S: usize = DEFAULT_GRAPH_SUCCS_NUM> {
    type NodeId: Copy + Hash + Eq;
    type EdgeId: Copy;

    fn entry(&self) -> Self::NodeId;

    fn exit(&self) -> Self::NodeId;

    /// Incoming edges of n.
    fn predecessors(&self, n: Self::NodeId) -> SmallVec<[Self::EdgeId; S]>;

    /// Outgoing edges of n.
    fn successors(&self, n: Self::NodeId) -> SmallVec<[Self::EdgeId; S]>;

    fn source(&self, e: Self::EdgeId) -> Self::NodeId;

    fn target(&self, e: Self::EdgeId) -> Self::NodeId;
}

/// Successor view consumed by the WTO construction.
pub trait SuccessorNodes<const S: usize = DEFAULT_GRAPH_SUCCS_NUM> {
    type NodeId: Copy + Hash + Eq;

    fn get_succ_nodes(&self, n: Self::NodeId) -> SmallVec<[Self::NodeId; S]>;
}
