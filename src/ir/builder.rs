/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;

use crate::error::Inconsistency;
use crate::ir::BranchCondition;
use crate::ir::CallGraph;
use crate::ir::CallSite;
use crate::ir::Callee;
use crate::ir::EdgeId;
use crate::ir::EdgeKind;
use crate::ir::FunId;
use crate::ir::Function;
use crate::ir::Icfg;
use crate::ir::IcfgEdge;
use crate::ir::IcfgNode;
use crate::ir::MemObj;
use crate::ir::NodeId;
use crate::ir::NodeKind;
use crate::ir::ObjId;
use crate::ir::ObjKind;
use crate::ir::SourceLoc;
use crate::ir::Statement;
use crate::ir::VarId;
use crate::ir::VarInfo;
use crate::ir::VarKind;

/// Ids created for a defined function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionNodes {
    pub id: FunId,
    pub entry: NodeId,
    pub exit: NodeId,
}

/// Call node and its matching return node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallNodes {
    pub call: NodeId,
    pub ret: NodeId,
}

/// Incremental construction of an `Icfg`.
///
/// Parameter passing is derived from the calls: adding a call to a defined
/// function puts a `CallPe` per argument on the callee entry and a `RetPe`
/// on the return node, and records the call graph edge.
pub struct IcfgBuilder {
    nodes: Vec<IcfgNode>,
    edges: Vec<IcfgEdge>,
    vars: Vec<VarInfo>,
    objs: Vec<MemObj>,
    functions: Vec<Function>,
    global: NodeId,
    indirect_targets: HashMap<NodeId, Vec<FunId>>,
    call_edges: Vec<(FunId, FunId, NodeId)>,
}

impl Default for IcfgBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IcfgBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            vars: Vec::new(),
            objs: Vec::new(),
            functions: Vec::new(),
            global: NodeId::new(0),
            indirect_targets: HashMap::new(),
            call_edges: Vec::new(),
        };
        builder.global = builder.add_node(None, NodeKind::Global, Vec::new(), None);
        builder.object("null", ObjKind::Null, None);
        builder
    }

    pub fn global_node(&self) -> NodeId {
        self.global
    }

    fn add_node(
        &mut self,
        function: Option<FunId>,
        kind: NodeKind,
        stmts: Vec<Statement>,
        loc: Option<SourceLoc>,
    ) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(IcfgNode {
            id,
            function,
            kind,
            stmts,
            loc,
            in_edges: Vec::new(),
            out_edges: Vec::new(),
        });
        id
    }

    fn add_var(&mut self, name: String, kind: VarKind, bits: u32, is_pointer: bool) -> VarId {
        let id = VarId::new(self.vars.len() as u32);
        self.vars.push(VarInfo {
            name,
            kind,
            bits,
            is_pointer,
        });
        id
    }

    /// A 64-bit integer variable.
    pub fn var(&mut self, name: impl Into<String>) -> VarId {
        self.add_var(name.into(), VarKind::Value, 64, false)
    }

    pub fn int_var(&mut self, name: impl Into<String>, bits: u32) -> VarId {
        self.add_var(name.into(), VarKind::Value, bits, false)
    }

    pub fn ptr_var(&mut self, name: impl Into<String>) -> VarId {
        self.add_var(name.into(), VarKind::Value, 64, true)
    }

    pub fn const_int(&mut self, value: i64) -> VarId {
        self.add_var(value.to_string(), VarKind::ConstInt(value), 64, false)
    }

    pub fn const_bool(&mut self, value: bool) -> VarId {
        self.add_var(value.to_string(), VarKind::ConstBool(value), 1, false)
    }

    pub fn null_ptr(&mut self) -> VarId {
        self.add_var("null".to_owned(), VarKind::NullPtr, 64, true)
    }

    /// Constant holding the address of `fun`.
    pub fn fun_ptr(&mut self, fun: FunId) -> VarId {
        let name = match self.functions.get(fun.index()) {
            Some(function) => format!("&{}", function.name),
            None => format!("&{}", fun),
        };
        self.add_var(name, VarKind::Function(fun), 64, true)
    }

    pub fn object(&mut self, name: impl Into<String>, kind: ObjKind, byte_size: Option<u64>) -> ObjId {
        let id = ObjId::new(self.objs.len() as u32);
        self.objs.push(MemObj {
            name: name.into(),
            kind,
            byte_size,
        });
        id
    }

    fn add_function(&mut self, name: String, formals: Vec<VarId>, ret: Option<VarId>) -> FunId {
        let id = FunId::new(self.functions.len() as u32);
        let obj = self.object(name.clone(), ObjKind::Function(id), None);
        self.functions.push(Function {
            name,
            entry: None,
            exit: None,
            formals,
            ret,
            obj,
        });
        id
    }

    /// A function with a body. Its entry and exit nodes are created empty.
    pub fn define_function(
        &mut self,
        name: impl Into<String>,
        formals: Vec<VarId>,
        ret: Option<VarId>,
    ) -> FunctionNodes {
        let id = self.add_function(name.into(), formals, ret);
        let entry = self.add_node(Some(id), NodeKind::FunEntry, Vec::new(), None);
        let exit = self.add_node(Some(id), NodeKind::FunExit, Vec::new(), None);
        let function = &mut self.functions[id.index()];
        function.entry = Some(entry);
        function.exit = Some(exit);
        FunctionNodes { id, entry, exit }
    }

    /// An external function, known by name only.
    pub fn declare_function(&mut self, name: impl Into<String>) -> FunId {
        self.add_function(name.into(), Vec::new(), None)
    }

    pub fn node(&mut self, fun: FunId, stmts: Vec<Statement>) -> NodeId {
        self.add_node(Some(fun), NodeKind::Intra, stmts, None)
    }

    pub fn node_at(&mut self, fun: FunId, stmts: Vec<Statement>, loc: SourceLoc) -> NodeId {
        self.add_node(Some(fun), NodeKind::Intra, stmts, Some(loc))
    }

    pub fn push_stmt(&mut self, node: NodeId, stmt: Statement) {
        if let Some(node) = self.nodes.get_mut(node.index()) {
            node.stmts.push(stmt);
        }
    }

    pub fn set_loc(&mut self, node: NodeId, loc: SourceLoc) {
        if let Some(node) = self.nodes.get_mut(node.index()) {
            node.loc = Some(loc);
        }
    }

    fn add_edge(&mut self, src: NodeId, dst: NodeId, kind: EdgeKind) -> EdgeId {
        let id = EdgeId::new(self.edges.len() as u32);
        self.edges.push(IcfgEdge { id, src, dst, kind });
        if let Some(node) = self.nodes.get_mut(src.index()) {
            node.out_edges.push(id);
        }
        if let Some(node) = self.nodes.get_mut(dst.index()) {
            node.in_edges.push(id);
        }
        id
    }

    pub fn edge(&mut self, src: NodeId, dst: NodeId) -> EdgeId {
        self.add_edge(src, dst, EdgeKind::Intra(None))
    }

    pub fn cond_edge(&mut self, src: NodeId, dst: NodeId, condition: BranchCondition) -> EdgeId {
        self.add_edge(src, dst, EdgeKind::Intra(Some(condition)))
    }

    /// Adds a call from a node of `caller` and its return node. Control flow
    /// into the call node and out of the return node is left to the caller.
    pub fn call(
        &mut self,
        caller: FunId,
        callee: Callee,
        args: Vec<VarId>,
        ret_var: Option<VarId>,
        loc: Option<SourceLoc>,
    ) -> CallNodes {
        let call_site = CallSite {
            callee,
            args,
            ret_var,
            ret_node: NodeId::new(0),
        };
        let call = self.add_node(Some(caller), NodeKind::Call(call_site), Vec::new(), loc.clone());
        let ret = self.add_node(Some(caller), NodeKind::Ret { call }, Vec::new(), loc);
        if let NodeKind::Call(call_site) = &mut self.nodes[call.index()].kind {
            call_site.ret_node = ret;
        }
        if let Callee::Direct(fun) = callee {
            self.link_callee(call, fun);
        }
        CallNodes { call, ret }
    }

    /// Records `target` as a resolved target of the indirect call `call`.
    pub fn add_indirect_target(&mut self, call: NodeId, target: FunId) {
        self.indirect_targets.entry(call).or_default().push(target);
        self.link_callee(call, target);
    }

    fn link_callee(&mut self, call: NodeId, callee: FunId) {
        let (caller, call_site) = match self.nodes.get(call.index()) {
            Some(IcfgNode {
                function: Some(caller),
                kind: NodeKind::Call(call_site),
                ..
            }) => (*caller, call_site.clone()),
            _ => return,
        };
        self.call_edges.push((caller, callee, call));
        let function = match self.functions.get(callee.index()) {
            Some(function) => function.clone(),
            None => return,
        };
        let (entry, exit) = match (function.entry, function.exit) {
            (Some(entry), Some(exit)) => (entry, exit),
            _ => return,
        };
        for (&formal, &actual) in function.formals.iter().zip(call_site.args.iter()) {
            self.push_stmt(
                entry,
                Statement::CallPe {
                    formal,
                    actual,
                    call_site: call,
                },
            );
        }
        if let (Some(actual), Some(formal)) = (call_site.ret_var, function.ret) {
            self.push_stmt(
                call_site.ret_node,
                Statement::RetPe {
                    actual,
                    formal,
                    call_site: call,
                },
            );
        }
        self.add_edge(call, entry, EdgeKind::Call);
        self.add_edge(exit, call_site.ret_node, EdgeKind::Ret);
    }

    pub fn finish(self) -> Result<Icfg, Inconsistency> {
        let mut defs = HashMap::new();
        for node in &self.nodes {
            for (index, stmt) in node.stmts.iter().enumerate() {
                if let Some(def) = stmt.def() {
                    defs.entry(def).or_insert((node.id, index));
                }
            }
        }
        let call_graph = CallGraph::build(
            (0..self.functions.len()).map(|index| FunId::new(index as u32)),
            self.call_edges.iter().copied(),
        );
        let icfg = Icfg {
            nodes: self.nodes,
            edges: self.edges,
            vars: self.vars,
            objs: self.objs,
            functions: self.functions,
            global: self.global,
            call_graph,
            indirect_targets: self.indirect_targets,
            defs,
        };
        icfg.validate()?;
        Ok(icfg)
    }
}
