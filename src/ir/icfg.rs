/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use smallvec::SmallVec;

use crate::error::Inconsistency;
use crate::graph::Graph;
use crate::graph::SuccessorNodes;
use crate::graph::DEFAULT_GRAPH_SUCCS_NUM;
use crate::ir::CallGraph;
use crate::ir::EdgeId;
use crate::ir::FunId;
use crate::ir::Function;
use crate::ir::MemObj;
use crate::ir::NodeId;
use crate::ir::ObjId;
use crate::ir::SourceLoc;
use crate::ir::Statement;
use crate::ir::VarId;
use crate::ir::VarInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Callee {
    Direct(FunId),
    /// Called through the function pointer held by the variable.
    Indirect(VarId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub callee: Callee,
    pub args: Vec<VarId>,
    pub ret_var: Option<VarId>,
    pub ret_node: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Holds the global initializers, executed before any function.
    Global,
    FunEntry,
    FunExit,
    Intra,
    Call(CallSite),
    Ret { call: NodeId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcfgNode {
    pub id: NodeId,
    pub function: Option<FunId>,
    pub kind: NodeKind,
    pub stmts: Vec<Statement>,
    pub loc: Option<SourceLoc>,
    pub(crate) in_edges: Vec<EdgeId>,
    pub(crate) out_edges: Vec<EdgeId>,
}

impl IcfgNode {
    pub fn call_site(&self) -> Option<&CallSite> {
        match &self.kind {
            NodeKind::Call(call_site) => Some(call_site),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, NodeKind::Call(_))
    }

    pub fn in_edges(&self) -> &[EdgeId] {
        &self.in_edges
    }

    pub fn out_edges(&self) -> &[EdgeId] {
        &self.out_edges
    }
}

/// Guard of a conditional intraprocedural edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchCondition {
    /// Taken when `cond` evaluates to `value`.
    Bool { cond: VarId, value: bool },
    /// Switch case taken when `cond == value`.
    Case { cond: VarId, value: i64 },
    /// Switch default, taken when `cond` matches none of `cases`.
    Default { cond: VarId, cases: Vec<i64> },
}

impl BranchCondition {
    pub fn cond(&self) -> VarId {
        match self {
            BranchCondition::Bool { cond, .. }
            | BranchCondition::Case { cond, .. }
            | BranchCondition::Default { cond, .. } => *cond,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    Intra(Option<BranchCondition>),
    Call,
    Ret,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcfgEdge {
    pub id: EdgeId,
    pub src: NodeId,
    pub dst: NodeId,
    pub kind: EdgeKind,
}

impl IcfgEdge {
    pub fn is_intra(&self) -> bool {
        matches!(self.kind, EdgeKind::Intra(_))
    }

    pub fn condition(&self) -> Option<&BranchCondition> {
        match &self.kind {
            EdgeKind::Intra(condition) => condition.as_ref(),
            _ => None,
        }
    }
}

/// Interprocedural control-flow graph together with the program entities
/// its statements refer to.
#[derive(Debug, Clone)]
pub struct Icfg {
    pub(crate) nodes: Vec<IcfgNode>,
    pub(crate) edges: Vec<IcfgEdge>,
    pub(crate) vars: Vec<VarInfo>,
    pub(crate) objs: Vec<MemObj>,
    pub(crate) functions: Vec<Function>,
    pub(crate) global: NodeId,
    pub(crate) call_graph: CallGraph,
    /// Resolved targets of indirect call sites.
    pub(crate) indirect_targets: HashMap<NodeId, Vec<FunId>>,
    /// Defining statement of each variable, as (node, statement index).
    pub(crate) defs: HashMap<VarId, (NodeId, usize)>,
}

impl Icfg {
    pub fn global_node(&self) -> NodeId {
        self.global
    }

    /// Object the null pointer constant points to.
    pub fn null_obj(&self) -> ObjId {
        ObjId::new(0)
    }

    pub fn node(&self, id: NodeId) -> Result<&IcfgNode, Inconsistency> {
        self.nodes
            .get(id.index())
            .ok_or(Inconsistency::UnknownNode(id))
    }

    pub fn edge(&self, id: EdgeId) -> &IcfgEdge {
        &self.edges[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &IcfgNode> {
        self.nodes.iter()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn var(&self, id: VarId) -> Result<&VarInfo, Inconsistency> {
        self.vars
            .get(id.index())
            .ok_or(Inconsistency::UnknownVariable(id))
    }

    pub fn var_by_name(&self, name: &str) -> Option<VarId> {
        self.vars
            .iter()
            .position(|var| var.name == name)
            .map(|index| VarId::new(index as u32))
    }

    pub fn obj(&self, id: ObjId) -> Result<&MemObj, Inconsistency> {
        self.objs
            .get(id.index())
            .ok_or(Inconsistency::UnknownObject(id))
    }

    pub fn function(&self, id: FunId) -> Result<&Function, Inconsistency> {
        self.functions
            .get(id.index())
            .ok_or(Inconsistency::UnknownFunction(id))
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(index, fun)| (FunId::new(index as u32), fun))
    }

    pub fn function_by_name(&self, name: &str) -> Option<FunId> {
        self.functions()
            .find(|(_, fun)| fun.name == name)
            .map(|(id, _)| id)
    }

    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    pub fn call_site(&self, node: NodeId) -> Result<&CallSite, Inconsistency> {
        self.node(node)?
            .call_site()
            .ok_or(Inconsistency::NotACallSite(node))
    }

    pub fn indirect_targets(&self, call: NodeId) -> &[FunId] {
        self.indirect_targets
            .get(&call)
            .map_or(&[], |targets| targets.as_slice())
    }

    /// The statement defining `var`.
    pub fn def_stmt(&self, var: VarId) -> Option<&Statement> {
        let (node, index) = self.def_site(var)?;
        self.nodes.get(node.index())?.stmts.get(index)
    }

    /// Node and statement index of the definition of `var`.
    pub fn def_site(&self, var: VarId) -> Option<(NodeId, usize)> {
        self.defs.get(&var).copied()
    }

    /// Intraprocedural view of one defined function.
    pub fn function_view(&self, fun: FunId) -> Result<FunctionView<'_>, Inconsistency> {
        let function = self.function(fun)?;
        match (function.entry, function.exit) {
            (Some(entry), Some(exit)) => Ok(FunctionView {
                icfg: self,
                entry,
                exit,
            }),
            _ => Err(Inconsistency::UnknownFunction(fun)),
        }
    }

    /// Call nodes whose location is `file:line`.
    pub fn call_nodes_at(&self, file: &str, line: u32) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.is_call())
            .filter(|node| node.loc.as_ref().map_or(false, |loc| loc.matches(file, line)))
            .map(|node| node.id)
            .collect()
    }

    /// Checks that every entity referenced by the graph exists.
    pub fn validate(&self) -> Result<(), Inconsistency> {
        for node in &self.nodes {
            if let Some(fun) = node.function {
                self.function(fun)?;
            }
            for stmt in &node.stmts {
                if let Some(def) = stmt.def() {
                    self.var(def)?;
                }
                for var in stmt.uses() {
                    self.var(var)?;
                }
                for referenced in stmt.referenced_nodes() {
                    self.node(referenced)?;
                }
                if let Statement::Addr { obj, .. } = stmt {
                    self.obj(*obj)?;
                }
            }
            match &node.kind {
                NodeKind::Call(call_site) => {
                    match call_site.callee {
                        Callee::Direct(fun) => {
                            self.function(fun)?;
                        }
                        Callee::Indirect(var) => {
                            self.var(var)?;
                        }
                    }
                    for arg in &call_site.args {
                        self.var(*arg)?;
                    }
                    if let Some(ret_var) = call_site.ret_var {
                        self.var(ret_var)?;
                    }
                    self.node(call_site.ret_node)?;
                }
                NodeKind::Ret { call } => {
                    self.call_site(*call)?;
                }
                _ => {}
            }
        }
        for edge in &self.edges {
            self.node(edge.src)?;
            self.node(edge.dst)?;
            if let Some(condition) = edge.condition() {
                self.var(condition.cond())?;
            }
        }
        for function in &self.functions {
            self.obj(function.obj)?;
            for var in function.formals.iter().chain(function.ret.iter()) {
                self.var(*var)?;
            }
            for node in function.entry.iter().chain(function.exit.iter()) {
                self.node(*node)?;
            }
        }
        for (call, targets) in &self.indirect_targets {
            self.call_site(*call)?;
            for target in targets {
                self.function(*target)?;
            }
        }
        Ok(())
    }
}

/// One function of the ICFG seen as a rooted graph. Call nodes lead straight
/// to their return node, so the WTO of a function never leaves it.
#[derive(Clone, Copy)]
pub struct FunctionView<'a> {
    icfg: &'a Icfg,
    entry: NodeId,
    exit: NodeId,
}

impl<'a> Graph for FunctionView<'a> {
    type NodeId = NodeId;
    type EdgeId = EdgeId;

    fn entry(&self) -> NodeId {
        self.entry
    }

    fn exit(&self) -> NodeId {
        self.exit
    }

    fn predecessors(&self, n: NodeId) -> SmallVec<[EdgeId; DEFAULT_GRAPH_SUCCS_NUM]> {
        self.icfg.nodes[n.index()]
            .in_edges
            .iter()
            .copied()
            .filter(|&e| self.icfg.edge(e).is_intra())
            .collect()
    }

    fn successors(&self, n: NodeId) -> SmallVec<[EdgeId; DEFAULT_GRAPH_SUCCS_NUM]> {
        self.icfg.nodes[n.index()]
            .out_edges
            .iter()
            .copied()
            .filter(|&e| self.icfg.edge(e).is_intra())
            .collect()
    }

    fn source(&self, e: EdgeId) -> NodeId {
        self.icfg.edge(e).src
    }

    fn target(&self, e: EdgeId) -> NodeId {
        self.icfg.edge(e).dst
    }
}

impl<'a> SuccessorNodes for FunctionView<'a> {
    type NodeId = NodeId;

    fn get_succ_nodes(&self, n: NodeId) -> SmallVec<[NodeId; DEFAULT_GRAPH_SUCCS_NUM]> {
        let node = &self.icfg.nodes[n.index()];
        let mut succs: SmallVec<[NodeId; DEFAULT_GRAPH_SUCCS_NUM]> = self
            .successors(n)
            .iter()
            .map(|&e| self.target(e))
            .collect();
        if let NodeKind::Call(call_site) = &node.kind {
            succs.push(call_site.ret_node);
        }
        succs
    }
}
