/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use aexec::ae::BufOverflowDetector;
use aexec::datatype::AbstractState;
use aexec::datatype::Bound;
use aexec::datatype::IntervalValue;
use aexec::ir::IcfgBuilder;
use aexec::ir::Icfg;
use aexec::ir::NodeId;
use aexec::ir::SourceLoc;
use aexec::ir::VarId;
use aexec::AbstractInterpretation;
use aexec::AnalysisOptions;

pub const FILE: &str = "test.c";

pub fn loc(line: u32) -> SourceLoc {
    SourceLoc::new(FILE, line)
}

pub fn iv(lb: i64, ub: i64) -> IntervalValue {
    IntervalValue::from_range(lb, ub)
}

/// `[lb, +oo)`
pub fn at_least(lb: i64) -> IntervalValue {
    IntervalValue::new(Bound::Finite(lb), Bound::PosInf)
}

/// Adds an unconditional edge between each pair of consecutive nodes.
pub fn chain(builder: &mut IcfgBuilder, nodes: &[NodeId]) {
    for pair in nodes.windows(2) {
        builder.edge(pair[0], pair[1]);
    }
}

pub fn analyse(icfg: &Icfg) -> AbstractInterpretation<'_> {
    analyse_with(icfg, AnalysisOptions::default())
}

/// Runs the analysis with the buffer overflow detector registered.
pub fn analyse_with(icfg: &Icfg, options: AnalysisOptions) -> AbstractInterpretation<'_> {
    let mut ae = AbstractInterpretation::new(icfg, options);
    ae.add_detector(Box::new(BufOverflowDetector::new()));
    ae.analyse().expect("analysis should succeed");
    ae
}

pub fn state<'a>(ae: &'a AbstractInterpretation<'_>, node: NodeId) -> &'a AbstractState {
    ae.state_at_node(node)
        .unwrap_or_else(|| panic!("{} should be reachable", node))
}

pub fn interval(ae: &AbstractInterpretation<'_>, node: NodeId, var: VarId) -> IntervalValue {
    state(ae, node).var(var).interval()
}
