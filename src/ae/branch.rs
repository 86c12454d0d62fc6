/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use log::trace;

use crate::ae::transfer::compare;
use crate::ae::AbstractInterpretation;
use crate::datatype::AbstractDomain;
use crate::datatype::AbstractState;
use crate::datatype::AbstractValue;
use crate::datatype::Bound;
use crate::datatype::Field;
use crate::datatype::IntervalValue;
use crate::error::Inconsistency;
use crate::ir::BranchCondition;
use crate::ir::IcfgEdge;
use crate::ir::NodeId;
use crate::ir::Predicate;
use crate::ir::Relation;
use crate::ir::Statement;
use crate::ir::VarId;

/// Interval every `x` satisfying `x pred y` for some `y` in `other` lies in.
/// `None` when the predicate says nothing usable about `x`.
fn constraint_for(pred: Predicate, x: &IntervalValue, other: &IntervalValue) -> Option<IntervalValue> {
    if pred.is_unordered() || other.is_bottom() {
        return None;
    }
    if pred.is_unsigned() && !(x.is_non_negative() && other.is_non_negative()) {
        return None;
    }
    match pred.relation() {
        Relation::Eq => Some(*other),
        Relation::Ne => {
            let n = other.numeral()?;
            if x.numeral() == Some(n) {
                Some(IntervalValue::bottom())
            } else if x.lb() == Bound::Finite(n) {
                n.checked_add(1)
                    .map(|lb| IntervalValue::new(Bound::Finite(lb), Bound::PosInf))
            } else if x.ub() == Bound::Finite(n) {
                n.checked_sub(1)
                    .map(|ub| IntervalValue::new(Bound::NegInf, Bound::Finite(ub)))
            } else {
                None
            }
        }
        Relation::Gt => match other.lb() {
            Bound::Finite(c) => Some(match c.checked_add(1) {
                Some(lb) => IntervalValue::new(Bound::Finite(lb), Bound::PosInf),
                None => IntervalValue::bottom(),
            }),
            Bound::NegInf => None,
            Bound::PosInf => Some(IntervalValue::bottom()),
        },
        Relation::Ge => match other.lb() {
            Bound::NegInf => None,
            lb => Some(IntervalValue::new(lb, Bound::PosInf)),
        },
        Relation::Lt => match other.ub() {
            Bound::Finite(c) => Some(match c.checked_sub(1) {
                Some(ub) => IntervalValue::new(Bound::NegInf, Bound::Finite(ub)),
                None => IntervalValue::bottom(),
            }),
            Bound::PosInf => None,
            Bound::NegInf => Some(IntervalValue::bottom()),
        },
        Relation::Le => match other.ub() {
            Bound::PosInf => None,
            ub => Some(IntervalValue::new(Bound::NegInf, ub)),
        },
        Relation::Always | Relation::Never => None,
    }
}

/// Operand values under the assumption that `lhs pred rhs` holds, or `None`
/// when it cannot hold. The right operand is refined through the swapped
/// predicate, which turns `c OP x` into `x OP' c`.
pub fn refine_operands(
    pred: Predicate,
    lhs: &IntervalValue,
    rhs: &IntervalValue,
) -> Option<(IntervalValue, IntervalValue)> {
    let outcome = compare(pred, lhs, rhs);
    if outcome.is_bottom() || outcome.is_false() {
        return None;
    }
    let refined_lhs = match constraint_for(pred, lhs, rhs) {
        Some(constraint) => lhs.meet(constraint),
        None => *lhs,
    };
    let refined_rhs = match constraint_for(pred.swap(), rhs, lhs) {
        Some(constraint) => rhs.meet(constraint),
        None => *rhs,
    };
    if refined_lhs.is_bottom() || refined_rhs.is_bottom() {
        return None;
    }
    Some((refined_lhs, refined_rhs))
}

impl<'a> AbstractInterpretation<'a> {
    /// Whether control can flow along `edge` from a state where its source
    /// holds `state`. Feasible edges refine `state` with their condition.
    pub(crate) fn is_branch_feasible(
        &self,
        edge: &IcfgEdge,
        state: &mut AbstractState,
    ) -> Result<bool, Inconsistency> {
        let feasible = match edge.condition() {
            None => true,
            Some(BranchCondition::Bool { cond, value }) => match self.icfg.def_stmt(*cond) {
                Some(Statement::Cmp {
                    res,
                    lhs,
                    rhs,
                    pred,
                }) => self.is_cmp_branch_feasible(
                    edge.src,
                    (*res, *lhs, *rhs, *pred),
                    *value as i64,
                    state,
                )?,
                _ => self.is_bool_branch_feasible(edge.src, *cond, *value, state)?,
            },
            Some(BranchCondition::Case { cond, value }) => {
                self.is_switch_branch_feasible(edge.src, *cond, *value, state)?
            }
            Some(BranchCondition::Default { cond, cases }) => {
                let value = self.value_of(state, *cond)?.interval();
                !value.is_bottom() && value.numeral().map_or(true, |n| !cases.contains(&n))
            }
        };
        if !feasible {
            trace!("{} -> {} is infeasible", edge.src, edge.dst);
        }
        Ok(feasible)
    }

    /// `succ` is the value of the comparison on this edge.
    pub(crate) fn is_cmp_branch_feasible(
        &self,
        src: NodeId,
        (res, lhs, rhs, pred): (VarId, VarId, VarId, Predicate),
        succ: i64,
        state: &mut AbstractState,
    ) -> Result<bool, Inconsistency> {
        let outcome = self.value_of(state, res)?.interval();
        if outcome.meet(IntervalValue::singleton(succ)).is_bottom() {
            return Ok(false);
        }
        let lhs_value = self.value_of(state, lhs)?;
        let rhs_value = self.value_of(state, rhs)?;
        if lhs_value.is_address() || rhs_value.is_address() {
            return Ok(true);
        }
        let pred = if succ == 0 { pred.reverse() } else { pred };
        match refine_operands(pred, &lhs_value.interval(), &rhs_value.interval()) {
            None => Ok(false),
            Some((refined_lhs, refined_rhs)) => {
                self.refine_var(src, lhs, refined_lhs, state)?;
                self.refine_var(src, rhs, refined_rhs, state)?;
                self.refine_var(src, res, IntervalValue::singleton(succ), state)?;
                Ok(true)
            }
        }
    }

    pub(crate) fn is_switch_branch_feasible(
        &self,
        src: NodeId,
        cond: VarId,
        case: i64,
        state: &mut AbstractState,
    ) -> Result<bool, Inconsistency> {
        let value = self.value_of(state, cond)?.interval();
        let refined = value.meet(IntervalValue::singleton(case));
        if refined.is_bottom() {
            return Ok(false);
        }
        self.refine_var(src, cond, refined, state)?;
        Ok(true)
    }

    /// A branch on a value not produced by a comparison: true means non-zero.
    fn is_bool_branch_feasible(
        &self,
        src: NodeId,
        cond: VarId,
        value: bool,
        state: &mut AbstractState,
    ) -> Result<bool, Inconsistency> {
        if !value {
            return self.is_switch_branch_feasible(src, cond, 0, state);
        }
        let current = self.value_of(state, cond)?;
        if current.is_address() {
            return Ok(true);
        }
        match refine_operands(Predicate::ICMP_NE, &current.interval(), &IntervalValue::singleton(0)) {
            None => Ok(false),
            Some((refined, _)) => {
                self.refine_var(src, cond, refined, state)?;
                Ok(true)
            }
        }
    }

    /// Narrows `var` to `value`. When `var` was loaded from a single exact
    /// address by `src` and no later statement of `src` writes memory, the
    /// memory cell is narrowed too.
    fn refine_var(
        &self,
        src: NodeId,
        var: VarId,
        value: IntervalValue,
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        if self.icfg.var(var)?.is_constant() {
            return Ok(());
        }
        state.set_var(var, value.into());

        let (def_node, def_index) = match self.icfg.def_site(var) {
            Some(site) => site,
            None => return Ok(()),
        };
        if def_node != src {
            return Ok(());
        }
        let node = self.icfg.node(src)?;
        let ptr = match node.stmts.get(def_index) {
            Some(Statement::Load { ptr, .. }) => *ptr,
            _ => return Ok(()),
        };
        let clobbered = node.stmts[def_index + 1..]
            .iter()
            .any(|stmt| matches!(stmt, Statement::Store { .. }))
            || node.is_call();
        if clobbered {
            return Ok(());
        }
        let address = match self.value_of(state, ptr)?.addresses().and_then(|a| a.as_singleton()) {
            Some(address) if matches!(address.field, Field::Exact(_)) => address,
            _ => return Ok(()),
        };
        if let AbstractValue::Interval(cell) = state.load_address(address) {
            let refined = cell.meet(value);
            if !refined.is_bottom() {
                state.store_strong(address, refined.into());
            }
        }
        Ok(())
    }
}
