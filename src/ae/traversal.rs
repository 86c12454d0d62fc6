/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::rc::Rc;

use log::debug;
use log::trace;

use crate::ae::AbstractInterpretation;
use crate::datatype::AbstractDomain;
use crate::datatype::AbstractState;
use crate::error::Inconsistency;
use crate::fixpoint::CycleProgress;
use crate::fixpoint::CycleStep;
use crate::graph::Graph;
use crate::ir::FunId;
use crate::ir::IcfgNode;
use crate::ir::NodeId;
use crate::ir::NodeKind;
use crate::ir::Statement;
use crate::ir::VarId;
use crate::wto::WtoComponent;
use crate::wto::WtoCycle;

fn join_into(acc: &mut Option<AbstractState>, state: AbstractState) {
    *acc = Some(match acc.take() {
        Some(acc) => acc.join(state),
        None => state,
    });
}

impl<'a> AbstractInterpretation<'a> {
    /// Analyses the body of `fun` from scratch in the current calling
    /// context.
    pub(crate) fn traverse_function(&mut self, fun: FunId) -> Result<(), Inconsistency> {
        let icfg = self.icfg;
        debug!("Entering {}", icfg.function(fun)?.name);
        self.stats.functions_traversed += 1;
        if let Some(nodes) = self.fun_nodes.get(&fun) {
            for node in nodes {
                self.trace.remove(node);
                self.call_outcomes.remove(node);
            }
        }
        let wto = Rc::clone(
            self.func_to_wto
                .get(&fun)
                .ok_or(Inconsistency::UnknownFunction(fun))?,
        );
        self.handle_wto_components(wto.components())?;
        debug!("Leaving {}", icfg.function(fun)?.name);
        Ok(())
    }

    pub(crate) fn handle_wto_components(
        &mut self,
        components: &[WtoComponent<NodeId>],
    ) -> Result<(), Inconsistency> {
        for component in components {
            self.handle_wto_component(component)?;
        }
        Ok(())
    }

    fn handle_wto_component(
        &mut self,
        component: &WtoComponent<NodeId>,
    ) -> Result<(), Inconsistency> {
        match component {
            WtoComponent::Vertex(node) => self.handle_singleton_wto(*node),
            WtoComponent::Cycle(cycle) => self.handle_cycle_wto(cycle),
        }
    }

    fn handle_singleton_wto(&mut self, node: NodeId) -> Result<(), Inconsistency> {
        match self.compute_node_state(node)? {
            Some(state) => self.commit_node_state(node, state),
            None => {
                trace!("{} is unreachable", node);
                self.trace.remove(&node);
                self.call_outcomes.remove(&node);
                Ok(())
            }
        }
    }

    /// Iterates a cycle until its head stabilizes, see
    /// `ExtrapolationPolicy`. The body is re-analysed after every head
    /// update, and once more when the final head state differs from the one
    /// the body last saw.
    fn handle_cycle_wto(&mut self, cycle: &WtoCycle<NodeId>) -> Result<(), Inconsistency> {
        let head = cycle.head();
        let mut progress = CycleProgress::default();
        let mut previous: Option<AbstractState> = None;
        self.fixpoint_context.reset_local_iteration_count_for(head);
        loop {
            let current = match self.compute_node_state(head)? {
                Some(state) => state,
                None => {
                    self.trace.remove(&head);
                    return Ok(());
                }
            };
            self.fixpoint_context.increase_iteration_count_for(head);
            match self.policy.extrapolate(&mut progress, previous.clone(), current) {
                CycleStep::Body(state) => {
                    previous = Some(state.clone());
                    self.commit_node_state(head, state)?;
                    self.handle_wto_components(cycle.components())?;
                }
                CycleStep::Head(state) => {
                    self.commit_node_state(head, state)?;
                }
                CycleStep::Done(state) => {
                    let rerun_body = previous.as_ref() != Some(&state);
                    self.commit_node_state(head, state)?;
                    if rerun_body {
                        self.handle_wto_components(cycle.components())?;
                    }
                    debug!(
                        "Cycle at {} stable after {} iteration(s)",
                        head,
                        self.fixpoint_context.get_local_iterations_for(head)
                    );
                    return Ok(());
                }
            }
        }
    }

    /// State after `node`: the merged state of its predecessors transformed
    /// by every statement. `None` when the node is unreachable.
    fn compute_node_state(&mut self, node: NodeId) -> Result<Option<AbstractState>, Inconsistency> {
        let icfg = self.icfg;
        let n = icfg.node(node)?;
        let mut state = match self.merge_states_from_predecessors(n)? {
            Some(state) if !state.is_bottom() => state,
            _ => return Ok(None),
        };
        self.stats.nodes_analysed += 1;
        for stmt in &n.stmts {
            self.update_state_on_stmt(n, stmt, &mut state)?;
        }
        if state.is_bottom() {
            return Ok(None);
        }
        Ok(Some(state))
    }

    /// Records the state of `node`, resolves the call it makes, if any, and
    /// lets the detectors inspect the result.
    fn commit_node_state(&mut self, node: NodeId, state: AbstractState) -> Result<(), Inconsistency> {
        let icfg = self.icfg;
        let n = icfg.node(node)?;
        self.stats.record_state_size(state.size());
        self.trace.insert(node, state);
        if n.is_call() {
            self.handle_call_site(n)?;
        }
        self.run_detectors(node)
    }

    pub(crate) fn run_detectors(&mut self, node: NodeId) -> Result<(), Inconsistency> {
        let icfg = self.icfg;
        let n = icfg.node(node)?;
        let state = match self.trace.get(&node) {
            Some(state) => state,
            None => return Ok(()),
        };
        for detector in self.detectors.iter_mut() {
            detector.detect(icfg, n, state, &mut self.report)?;
        }
        Ok(())
    }

    pub(crate) fn merge_states_from_predecessors(
        &self,
        node: &IcfgNode,
    ) -> Result<Option<AbstractState>, Inconsistency> {
        match &node.kind {
            NodeKind::Global => Ok(Some(
                self.trace.get(&node.id).cloned().unwrap_or_default(),
            )),
            NodeKind::FunEntry => self.merge_entry(node).map(Some),
            NodeKind::Ret { call } => self.merge_return(*call),
            NodeKind::FunExit | NodeKind::Intra | NodeKind::Call(_) => self.merge_intra(node),
        }
    }

    /// The state of the active call site, or of the global node for entry
    /// functions.
    fn merge_entry(&self, entry: &IcfgNode) -> Result<AbstractState, Inconsistency> {
        let call = match self.call_site_stack.last() {
            Some(&call) => call,
            None => {
                let global = self.icfg.global_node();
                return self
                    .trace
                    .get(&global)
                    .cloned()
                    .ok_or(Inconsistency::MissingState(global));
            }
        };
        let mut state = self
            .trace
            .get(&call)
            .cloned()
            .ok_or(Inconsistency::MissingState(call))?;
        let has_binding = entry.stmts.iter().any(|stmt| {
            stmt.referenced_nodes().contains(&call)
        });
        // Targets discovered through the pointer value have no parameter
        // statements for this call.
        if !has_binding {
            if let Some(fun) = entry.function {
                let site = self.icfg.call_site(call)?;
                let formals = &self.icfg.function(fun)?.formals;
                let mut bindings = Vec::with_capacity(formals.len());
                for (&formal, &actual) in formals.iter().zip(site.args.iter()) {
                    bindings.push((formal, self.value_of(&state, actual)?));
                }
                for (formal, value) in bindings {
                    state.set_var(formal, value);
                }
            }
        }
        Ok(state)
    }

    /// Joins the exit states of the traversed callees, each with the result
    /// bound to the return variable of the call, and the state of the call
    /// node when the call falls through.
    fn merge_return(&self, call: NodeId) -> Result<Option<AbstractState>, Inconsistency> {
        let outcome = match self.call_outcomes.get(&call) {
            Some(outcome) => outcome,
            None => return Ok(None),
        };
        let site = self.icfg.call_site(call)?;
        let ret_node = self.icfg.node(site.ret_node)?;
        let mut merged = None;
        for &callee in &outcome.traversed {
            let function = self.icfg.function(callee)?;
            let exit = function.exit.ok_or(Inconsistency::UnknownFunction(callee))?;
            let mut state = match self.trace.get(&exit) {
                Some(state) => state.clone(),
                None => continue,
            };
            let mut bindings: Vec<(VarId, VarId)> = ret_node
                .stmts
                .iter()
                .filter_map(|stmt| match stmt {
                    Statement::RetPe {
                        actual,
                        formal,
                        call_site,
                    } if *call_site == call && function.ret == Some(*formal) => {
                        Some((*actual, *formal))
                    }
                    _ => None,
                })
                .collect();
            // Targets discovered through the pointer value have no return
            // statement for this call.
            if bindings.is_empty() {
                if let (Some(actual), Some(formal)) = (site.ret_var, function.ret) {
                    bindings.push((actual, formal));
                }
            }
            for (actual, formal) in bindings {
                self.update_state_on_ret_pe(actual, formal, &mut state)?;
            }
            join_into(&mut merged, state);
        }
        if outcome.fallthrough {
            let state = self
                .trace
                .get(&call)
                .cloned()
                .ok_or(Inconsistency::MissingState(call))?;
            join_into(&mut merged, state);
        }
        Ok(merged)
    }

    /// Joins the states flowing along feasible intraprocedural in-edges.
    fn merge_intra(&self, node: &IcfgNode) -> Result<Option<AbstractState>, Inconsistency> {
        let fun = match node.function {
            Some(fun) => fun,
            None => return Err(Inconsistency::UnknownNode(node.id)),
        };
        let view = self.icfg.function_view(fun)?;
        let mut merged = None;
        for edge in view.predecessors(node.id) {
            let edge = self.icfg.edge(edge);
            let mut state = match self.trace.get(&edge.src) {
                Some(state) => state.clone(),
                None => continue,
            };
            if !self.is_branch_feasible(edge, &mut state)? || state.is_bottom() {
                continue;
            }
            join_into(&mut merged, state);
        }
        if merged.is_some() {
            trace!("{}: merged predecessors", node.id);
        }
        Ok(merged)
    }
}
