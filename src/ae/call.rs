/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::BTreeSet;

use log::debug;
use log::warn;

use crate::ae::apply_default;
use crate::ae::AbstractInterpretation;
use crate::ae::CallOutcome;
use crate::ae::ExtCall;
use crate::ae::ExtOutcome;
use crate::datatype::AbstractDomain;
use crate::datatype::AbstractState;
use crate::datatype::AbstractValue;
use crate::datatype::AddressValue;
use crate::error::Inconsistency;
use crate::ir::Callee;
use crate::ir::FunId;
use crate::ir::IcfgNode;
use crate::ir::NodeId;
use crate::ir::NodeKind;
use crate::ir::ObjId;
use crate::ir::ObjKind;
use crate::ir::Statement;
use crate::ir::VarId;

/// How far `pointee_objects` follows definitions.
const MAX_POINTER_CHAIN: u32 = 8;

impl<'a> AbstractInterpretation<'a> {
    /// Resolves the call made by `call`, whose own state is already in the
    /// trace. The effect of modeled callees is applied to that state, the
    /// bodies of analysed callees are traversed.
    pub(crate) fn handle_call_site(&mut self, call: &IcfgNode) -> Result<(), Inconsistency> {
        let site = call.call_site().ok_or(Inconsistency::NotACallSite(call.id))?;
        match site.callee {
            Callee::Direct(callee) => {
                if self.is_ext_call(callee)? {
                    self.ext_call_pass(call, callee)
                } else if self.is_recursive_call(call, callee) {
                    self.recursive_call_pass(call, &[callee])
                } else {
                    self.direct_call_fun_pass(call, callee)
                }
            }
            Callee::Indirect(ptr) => self.indirect_call_fun_pass(call, ptr),
        }
    }

    pub(crate) fn is_ext_call(&self, callee: FunId) -> Result<bool, Inconsistency> {
        Ok(!self.icfg.function(callee)?.has_body())
    }

    /// True when entering `callee` from `call` would re-enter a function
    /// that is already being analysed. A callee active on the call stack is
    /// always recursive, even when the call graph has no edge for a target
    /// found through a function pointer.
    pub(crate) fn is_recursive_call(&self, call: &IcfgNode, callee: FunId) -> bool {
        let active: Vec<FunId> = self
            .call_site_stack
            .iter()
            .filter_map(|&site| self.icfg.node(site).ok().and_then(|node| node.function))
            .chain(call.function)
            .collect();
        if active.contains(&callee) {
            return true;
        }
        let call_graph = self.icfg.call_graph();
        if !call_graph.is_recursive(callee) {
            return false;
        }
        let scc = call_graph.scc_members(callee);
        active.iter().any(|fun| scc.contains(fun))
    }

    fn ext_call_pass(&mut self, call: &IcfgNode, callee: FunId) -> Result<(), Inconsistency> {
        let mut state = self.call_state(call.id)?;
        let outcome = self.apply_ext_effect(call, callee, &mut state)?;
        self.trace.insert(call.id, state);
        self.stats.calls_skipped += 1;
        self.call_outcomes.insert(
            call.id,
            CallOutcome {
                traversed: Vec::new(),
                fallthrough: outcome == ExtOutcome::Returns,
            },
        );
        Ok(())
    }

    /// Runs the model of the external `callee` on `state`, then lets the
    /// detectors inspect the call.
    fn apply_ext_effect(
        &mut self,
        call: &IcfgNode,
        callee: FunId,
        state: &mut AbstractState,
    ) -> Result<ExtOutcome, Inconsistency> {
        let icfg = self.icfg;
        let site = call.call_site().ok_or(Inconsistency::NotACallSite(call.id))?;
        let name = icfg.function(callee)?.name.as_str();
        let ext_call = ExtCall {
            icfg,
            node: call,
            site,
            callee: name,
        };
        self.call_site_stack.push(call.id);
        let outcome = self.ext_api.apply(&ext_call, state);
        let mut verdicts = Vec::new();
        if outcome.is_ok() {
            for detector in self.detectors.iter_mut() {
                if let Some(verdict) = detector.handle_stub_call(&ext_call, state, &mut self.report)? {
                    verdicts.push(verdict);
                }
            }
        }
        self.call_site_stack.pop();
        for verdict in verdicts {
            debug!("Checkpoint {} ({}): {:?}", call.id, name, verdict);
            self.record_checkpoint(call.id, verdict);
        }
        outcome
    }

    fn recursive_call_pass(&mut self, call: &IcfgNode, callees: &[FunId]) -> Result<(), Inconsistency> {
        let mut state = self.call_state(call.id)?;
        self.skip_recursive_call(call, callees, &mut state)?;
        self.trace.insert(call.id, state);
        self.stats.calls_skipped += 1;
        self.call_outcomes.insert(
            call.id,
            CallOutcome {
                traversed: Vec::new(),
                fallthrough: true,
            },
        );
        Ok(())
    }

    /// Effect of a call that is not traversed because it re-enters an active
    /// recursive cycle: the result is unknown and, unless disabled, so is
    /// every object the callees may store to.
    pub(crate) fn skip_recursive_call(
        &self,
        call: &IcfgNode,
        callees: &[FunId],
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        debug!("Skipping recursive call at {}", call.id);
        let site = call.call_site().ok_or(Inconsistency::NotACallSite(call.id))?;
        if let Some(ret) = site.ret_var {
            state.set_var(ret, AbstractValue::top());
        }
        if !self.options.skip_recursive_as_top {
            return Ok(());
        }
        let reachable: BTreeSet<FunId> = callees
            .iter()
            .flat_map(|&callee| self.icfg.call_graph().reachable_from(callee))
            .collect();
        match self.written_objects(&reachable, state)? {
            Some(objects) => {
                for obj in objects {
                    state.havoc_object(obj);
                }
            }
            None => state.havoc_memory(),
        }
        Ok(())
    }

    /// Objects the functions may write, through stores or pointer arguments
    /// of calls. `None` when some written pointer cannot be traced back to
    /// an object.
    fn written_objects(
        &self,
        funs: &BTreeSet<FunId>,
        state: &AbstractState,
    ) -> Result<Option<BTreeSet<ObjId>>, Inconsistency> {
        let mut objects = BTreeSet::new();
        for fun in funs {
            let nodes = match self.fun_nodes.get(fun) {
                Some(nodes) => nodes,
                None => continue,
            };
            for &node in nodes {
                let node = self.icfg.node(node)?;
                let mut written: Vec<VarId> = node
                    .stmts
                    .iter()
                    .filter_map(|stmt| match stmt {
                        Statement::Store { ptr, .. } => Some(*ptr),
                        _ => None,
                    })
                    .collect();
                if let NodeKind::Call(site) = &node.kind {
                    for &arg in &site.args {
                        if self.icfg.var(arg)?.is_pointer {
                            written.push(arg);
                        }
                    }
                }
                for ptr in written {
                    match self.pointee_objects(ptr, state, MAX_POINTER_CHAIN)? {
                        Some(pointees) => objects.extend(pointees),
                        None => return Ok(None),
                    }
                }
            }
        }
        Ok(Some(objects))
    }

    /// Objects `ptr` may point to, from its value in `state` or by following
    /// its definition through address arithmetic and copies.
    fn pointee_objects(
        &self,
        ptr: VarId,
        state: &AbstractState,
        depth: u32,
    ) -> Result<Option<BTreeSet<ObjId>>, Inconsistency> {
        if let AbstractValue::Address(AddressValue::Value(addresses)) = self.value_of(state, ptr)? {
            return Ok(Some(addresses.iter().map(|address| address.obj).collect()));
        }
        if depth == 0 {
            return Ok(None);
        }
        match self.icfg.def_stmt(ptr) {
            Some(Statement::Addr { obj, .. }) => Ok(Some(BTreeSet::from([*obj]))),
            Some(Statement::Gep { base, .. }) => self.pointee_objects(*base, state, depth - 1),
            Some(Statement::Copy { rhs, .. }) => self.pointee_objects(*rhs, state, depth - 1),
            Some(Statement::Phi { operands, .. }) => {
                let mut objects = BTreeSet::new();
                for (operand, _) in operands {
                    match self.pointee_objects(*operand, state, depth - 1)? {
                        Some(pointees) => objects.extend(pointees),
                        None => return Ok(None),
                    }
                }
                Ok(Some(objects))
            }
            _ => Ok(None),
        }
    }

    fn direct_call_fun_pass(&mut self, call: &IcfgNode, callee: FunId) -> Result<(), Inconsistency> {
        self.call_site_stack.push(call.id);
        let result = self.traverse_function(callee);
        self.call_site_stack.pop();
        result?;
        self.call_outcomes.insert(
            call.id,
            CallOutcome {
                traversed: vec![callee],
                fallthrough: false,
            },
        );
        Ok(())
    }

    /// Candidate callees of an indirect call: the targets resolved in the
    /// program, or else the functions its pointer may hold.
    fn indirect_targets(&self, call: &IcfgNode, ptr: VarId) -> Result<Vec<FunId>, Inconsistency> {
        let resolved = self.icfg.indirect_targets(call.id);
        if !resolved.is_empty() {
            return Ok(resolved.to_vec());
        }
        let state = self
            .trace
            .get(&call.id)
            .ok_or(Inconsistency::MissingState(call.id))?;
        let mut targets = Vec::new();
        if let Some(addresses) = self.value_of(state, ptr)?.addresses() {
            for obj in addresses.objects() {
                if let ObjKind::Function(fun) = self.icfg.obj(obj)?.kind {
                    targets.push(fun);
                }
            }
        }
        Ok(targets)
    }

    /// Traverses every analysable target. Targets without a body or closing
    /// a recursive cycle contribute their effect on the state of the call
    /// node, joined over all of them.
    fn indirect_call_fun_pass(&mut self, call: &IcfgNode, ptr: VarId) -> Result<(), Inconsistency> {
        let targets = self.indirect_targets(call, ptr)?;
        if targets.is_empty() {
            warn!("Unresolved indirect call at {}", call.id);
            let mut state = self.call_state(call.id)?;
            let site = call.call_site().ok_or(Inconsistency::NotACallSite(call.id))?;
            let ext_call = ExtCall {
                icfg: self.icfg,
                node: call,
                site,
                callee: "",
            };
            apply_default(&ext_call, &mut state)?;
            self.trace.insert(call.id, state);
            self.stats.calls_skipped += 1;
            self.call_outcomes.insert(
                call.id,
                CallOutcome {
                    traversed: Vec::new(),
                    fallthrough: true,
                },
            );
            return Ok(());
        }
        debug!("Indirect call at {} has {} target(s)", call.id, targets.len());

        let call_state = self.call_state(call.id)?;
        let mut outcome = CallOutcome::default();
        let mut effect: Option<AbstractState> = None;
        for target in targets {
            let mut state = call_state.clone();
            if self.is_ext_call(target)? {
                if self.apply_ext_effect(call, target, &mut state)? == ExtOutcome::NoReturn {
                    continue;
                }
            } else if self.is_recursive_call(call, target) {
                self.skip_recursive_call(call, &[target], &mut state)?;
            } else {
                self.call_site_stack.push(call.id);
                let result = self.traverse_function(target);
                self.call_site_stack.pop();
                result?;
                outcome.traversed.push(target);
                continue;
            }
            self.stats.calls_skipped += 1;
            effect = Some(match effect {
                Some(effect) => effect.join(state),
                None => state,
            });
        }
        if let Some(effect) = effect {
            outcome.fallthrough = true;
            self.trace.insert(call.id, effect);
        }
        self.call_outcomes.insert(call.id, outcome);
        Ok(())
    }

    fn call_state(&self, call: NodeId) -> Result<AbstractState, Inconsistency> {
        self.trace
            .get(&call)
            .cloned()
            .ok_or(Inconsistency::MissingState(call))
    }
}
