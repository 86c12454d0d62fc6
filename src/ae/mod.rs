/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The abstract execution driver.
//!
//! `AbstractInterpretation` walks every entry function in weak topological
//! order, keeps the state after each node in a trace, and descends into
//! callees at call sites. Calls to functions without a body are modeled by
//! the `ExtApiRegistry`, calls that would re-enter an active recursive
//! cycle are skipped with a conservative effect.

mod branch;
mod call;
mod detector;
mod ext_api;
mod report;
mod stats;
mod transfer;
mod traversal;

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fmt::Write;
use std::rc::Rc;
use std::time::Instant;

use log::debug;
use log::info;
use log::warn;
use serde::Serialize;

pub use branch::refine_operands;
pub use detector::*;
pub use ext_api::*;
pub use report::*;
pub use stats::*;
pub use transfer::compare;
pub use transfer::value_of;

use crate::datatype::AbstractDomain;
use crate::datatype::AbstractState;
use crate::datatype::AbstractValue;
use crate::error::Inconsistency;
use crate::error::Result;
use crate::fixpoint::ExtrapolationPolicy;
use crate::fixpoint::FixpointIteratorContext;
use crate::ir::Callee;
use crate::ir::FunId;
use crate::ir::Icfg;
use crate::ir::NodeId;
use crate::options::AnalysisOptions;
use crate::wto::Wto;

/// How the last resolution of a call node ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOutcome {
    /// Callees whose body was traversed. Their exit states flow to the
    /// return node.
    pub traversed: Vec<FunId>,
    /// Whether the state of the call node itself, carrying the effect of
    /// skipped or external callees, flows to the return node.
    pub fallthrough: bool,
}

impl CallOutcome {
    pub fn is_no_return(&self) -> bool {
        self.traversed.is_empty() && !self.fallthrough
    }
}

/// Result of `AbstractInterpretation::analyse`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub report: BugReport,
    /// Verdicts of the checkpoints that were reached.
    pub checkpoints: BTreeMap<NodeId, CheckpointVerdict>,
    /// Checkpoints no traversal reached.
    pub unresolved_checkpoints: Vec<NodeId>,
    pub stats: AeStats,
}

pub struct AbstractInterpretation<'a> {
    icfg: &'a Icfg,
    options: AnalysisOptions,
    policy: ExtrapolationPolicy,
    /// State after each analysed node.
    trace: HashMap<NodeId, AbstractState>,
    /// Call nodes whose callee is being analysed, innermost last.
    call_site_stack: Vec<NodeId>,
    func_to_wto: HashMap<FunId, Rc<Wto<NodeId>>>,
    fun_nodes: HashMap<FunId, Vec<NodeId>>,
    call_outcomes: HashMap<NodeId, CallOutcome>,
    detectors: Vec<Box<dyn Detector>>,
    ext_api: ExtApiRegistry,
    report: BugReport,
    pending_checkpoints: BTreeSet<NodeId>,
    checkpoint_verdicts: BTreeMap<NodeId, CheckpointVerdict>,
    fixpoint_context: FixpointIteratorContext<NodeId>,
    stats: AeStats,
}

impl<'a> AbstractInterpretation<'a> {
    pub fn new(icfg: &'a Icfg, options: AnalysisOptions) -> Self {
        Self {
            icfg,
            policy: ExtrapolationPolicy::from(&options),
            options,
            trace: HashMap::new(),
            call_site_stack: Vec::new(),
            func_to_wto: HashMap::new(),
            fun_nodes: HashMap::new(),
            call_outcomes: HashMap::new(),
            detectors: Vec::new(),
            ext_api: ExtApiRegistry::default(),
            report: BugReport::default(),
            pending_checkpoints: BTreeSet::new(),
            checkpoint_verdicts: BTreeMap::new(),
            fixpoint_context: FixpointIteratorContext::default(),
            stats: AeStats::default(),
        }
    }

    /// Registers a detector. Its checkpoint stubs get a model without
    /// effect unless one is already registered.
    pub fn add_detector(&mut self, detector: Box<dyn Detector>) {
        for &name in detector.checkpoint_names() {
            if !self.ext_api.contains(name) {
                self.ext_api.register(name, |_, _| Ok(ExtOutcome::Returns));
            }
        }
        self.detectors.push(detector);
    }

    pub fn ext_api(&self) -> &ExtApiRegistry {
        &self.ext_api
    }

    pub fn ext_api_mut(&mut self) -> &mut ExtApiRegistry {
        &mut self.ext_api
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Runs the whole analysis and collects its results.
    pub fn analyse(&mut self) -> Result<AnalysisSummary> {
        let start = Instant::now();
        self.collect_checkpoints();
        self.run_on_module()?;
        self.check_points_all_set();
        self.stats.cycle_iterations = self.fixpoint_context.total_iterations();
        self.stats.elapsed = start.elapsed();
        info!("Abstract execution finished: {}", self.stats);
        info!("{} bug(s) reported", self.report.len());
        Ok(AnalysisSummary {
            report: self.report.clone(),
            checkpoints: self.checkpoint_verdicts.clone(),
            unresolved_checkpoints: self.pending_checkpoints.iter().copied().collect(),
            stats: self.stats.clone(),
        })
    }

    /// Analyses the global initializers, then every entry function.
    pub fn run_on_module(&mut self) -> Result<()> {
        self.icfg.validate()?;
        self.trace.clear();
        self.call_site_stack.clear();
        self.call_outcomes.clear();
        self.init_wto()?;
        self.handle_global_node()?;
        let entries = self.entry_functions();
        if entries.is_empty() {
            warn!("No entry function to analyse");
        }
        for fun in entries {
            info!("Analysing entry function {}", self.icfg.function(fun)?.name);
            self.traverse_function(fun)?;
        }
        Ok(())
    }

    /// Builds the WTO of every defined function.
    fn init_wto(&mut self) -> Result<(), Inconsistency> {
        self.fun_nodes.clear();
        for node in self.icfg.nodes() {
            if let Some(fun) = node.function {
                self.fun_nodes.entry(fun).or_default().push(node.id);
            }
        }
        for (fun, function) in self.icfg.functions() {
            if !function.has_body() || self.func_to_wto.contains_key(&fun) {
                continue;
            }
            let view = self.icfg.function_view(fun)?;
            let entry = function.entry.ok_or(Inconsistency::UnknownFunction(fun))?;
            let wto = Wto::new(entry, &view);
            debug!("WTO of {}: {}", function.name, wto);
            self.func_to_wto.insert(fun, Rc::new(wto));
        }
        Ok(())
    }

    fn handle_global_node(&mut self) -> Result<(), Inconsistency> {
        let global = self.icfg.global_node();
        let node = self.icfg.node(global)?;
        let mut state = AbstractState::default();
        for stmt in &node.stmts {
            self.update_state_on_stmt(node, stmt, &mut state)?;
        }
        self.trace.insert(global, state);
        self.run_detectors(global)
    }

    /// Functions named by the options, or every defined function nobody
    /// calls when none of them exists.
    fn entry_functions(&self) -> Vec<FunId> {
        let named: Vec<FunId> = self
            .options
            .entry_functions
            .iter()
            .filter_map(|name| self.icfg.function_by_name(name))
            .filter(|&fun| self.func_to_wto.contains_key(&fun))
            .collect();
        if !named.is_empty() {
            return named;
        }
        self.icfg
            .functions()
            .filter(|(fun, function)| {
                function.has_body() && !self.icfg.call_graph().has_callers(*fun)
            })
            .map(|(fun, _)| fun)
            .collect()
    }

    /// Call nodes of the checkpoint stubs known to the registered detectors.
    fn collect_checkpoints(&mut self) {
        let names: BTreeSet<&str> = self
            .detectors
            .iter()
            .flat_map(|detector| detector.checkpoint_names().iter().copied())
            .collect();
        for node in self.icfg.nodes() {
            let callee = match node.call_site().map(|site| site.callee) {
                Some(Callee::Direct(callee)) => callee,
                _ => continue,
            };
            if let Ok(function) = self.icfg.function(callee) {
                if names.contains(function.name.as_str()) {
                    self.pending_checkpoints.insert(node.id);
                }
            }
        }
        debug!("{} checkpoint(s) to settle", self.pending_checkpoints.len());
    }

    fn check_points_all_set(&self) {
        for &node in &self.pending_checkpoints {
            match self.icfg.node(node).ok().and_then(|n| n.loc.as_ref()) {
                Some(loc) => warn!("Checkpoint {} at {} was never reached", node, loc),
                None => warn!("Checkpoint {} was never reached", node),
            }
        }
    }

    pub(crate) fn record_checkpoint(&mut self, node: NodeId, verdict: CheckpointVerdict) {
        self.pending_checkpoints.remove(&node);
        self.checkpoint_verdicts.insert(node, verdict);
    }

    pub fn trace(&self) -> &HashMap<NodeId, AbstractState> {
        &self.trace
    }

    pub fn state_at_node(&self, node: NodeId) -> Option<&AbstractState> {
        self.trace.get(&node)
    }

    pub fn call_outcome(&self, call: NodeId) -> Option<&CallOutcome> {
        self.call_outcomes.get(&call)
    }

    pub fn report(&self) -> &BugReport {
        &self.report
    }

    pub fn stats(&self) -> &AeStats {
        &self.stats
    }

    pub fn checkpoint_verdicts(&self) -> &BTreeMap<NodeId, CheckpointVerdict> {
        &self.checkpoint_verdicts
    }

    /// Every state of the trace in node order, with variable names.
    pub fn dump_trace(&self) -> String {
        let mut nodes: Vec<&NodeId> = self.trace.keys().collect();
        nodes.sort();
        let mut out = String::new();
        for node in nodes {
            let state = &self.trace[node];
            let _ = write!(out, "{}", node);
            if let Ok(n) = self.icfg.node(*node) {
                if let Some(fun) = n.function.and_then(|fun| self.icfg.function(fun).ok()) {
                    let _ = write!(out, " in {}", fun.name);
                }
                if let Some(loc) = &n.loc {
                    let _ = write!(out, " at {}", loc);
                }
            }
            let _ = writeln!(out, ":");
            if state.is_bottom() {
                let _ = writeln!(out, "  _|_");
                continue;
            }
            for (var, value) in state.vars() {
                match self.icfg.var(*var) {
                    Ok(info) => {
                        let _ = writeln!(out, "  {} => {}", info.name, value);
                    }
                    Err(_) => {
                        let _ = writeln!(out, "  {} => {}", var, value);
                    }
                }
            }
            for (address, value) in state.memory() {
                let _ = writeln!(out, "  [{}] => {}", address, value);
            }
        }
        out
    }

    /// States of the analysed nodes located at `file:line`.
    pub fn states_at(&self, file: &str, line: u32) -> Vec<(NodeId, &AbstractState)> {
        self.icfg
            .nodes()
            .filter(|node| node.loc.as_ref().map_or(false, |loc| loc.matches(file, line)))
            .filter_map(|node| self.trace.get(&node.id).map(|state| (node.id, state)))
            .collect()
    }

    /// Values of the named variables after the first analysed node at
    /// `file:line`. Names without a variable are left out.
    pub fn var_values_at(
        &self,
        file: &str,
        line: u32,
        names: &[&str],
    ) -> Option<BTreeMap<String, AbstractValue>> {
        let (_, state) = self.states_at(file, line).into_iter().next()?;
        let mut values = BTreeMap::new();
        for &name in names {
            if let Some(var) = self.icfg.var_by_name(name) {
                if let Ok(value) = self.value_of(state, var) {
                    values.insert(name.to_owned(), value);
                }
            }
        }
        Some(values)
    }
}
