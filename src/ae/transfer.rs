/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use log::trace;

use crate::ae::AbstractInterpretation;
use crate::datatype::AbstractDomain;
use crate::datatype::AbstractState;
use crate::datatype::AbstractValue;
use crate::datatype::Address;
use crate::datatype::AddressValue;
use crate::datatype::IntervalValue;
use crate::error::Inconsistency;
use crate::ir::BinaryOpKind;
use crate::ir::CopyKind;
use crate::ir::GepIndex;
use crate::ir::Icfg;
use crate::ir::IcfgNode;
use crate::ir::NodeId;
use crate::ir::ObjId;
use crate::ir::Predicate;
use crate::ir::Relation;
use crate::ir::Statement;
use crate::ir::UnaryOpKind;
use crate::ir::VarId;
use crate::ir::VarKind;

/// Value of an operand in `state`. Constants evaluate to themselves, other
/// variables to their binding.
pub fn value_of(
    icfg: &Icfg,
    state: &AbstractState,
    var: VarId,
) -> Result<AbstractValue, Inconsistency> {
    Ok(match icfg.var(var)?.kind {
        VarKind::Value => state.var(var).into_owned(),
        VarKind::ConstInt(value) => AbstractValue::from(value),
        VarKind::ConstBool(value) => IntervalValue::from_bool(value).into(),
        VarKind::NullPtr => AbstractValue::from_address(Address::base(icfg.null_obj())),
        VarKind::Function(fun) => AbstractValue::from_address(Address::base(icfg.function(fun)?.obj)),
    })
}

/// Outcome of `lhs pred rhs` over intervals: `[1, 1]`, `[0, 0]`, `[0, 1]`, or
/// bottom when an operand is bottom.
///
/// Unsigned predicates are only decided when both operands are known to be
/// non-negative, where they agree with the signed ones.
pub fn compare(pred: Predicate, lhs: &IntervalValue, rhs: &IntervalValue) -> IntervalValue {
    if lhs.is_bottom() || rhs.is_bottom() {
        return IntervalValue::bottom();
    }
    if pred.is_unsigned() && !(lhs.is_non_negative() && rhs.is_non_negative()) {
        return IntervalValue::unknown_bool();
    }
    match pred {
        Predicate::FCMP_ORD | Predicate::FCMP_UNO => return IntervalValue::unknown_bool(),
        _ => {}
    }
    match pred.relation() {
        Relation::Eq => lhs.cmp_eq(rhs),
        Relation::Ne => lhs.cmp_ne(rhs),
        Relation::Gt => lhs.cmp_gt(rhs),
        Relation::Ge => lhs.cmp_ge(rhs),
        Relation::Lt => lhs.cmp_lt(rhs),
        Relation::Le => lhs.cmp_le(rhs),
        Relation::Always => IntervalValue::from_bool(true),
        Relation::Never => IntervalValue::from_bool(false),
    }
}

/// Pointer comparison. Only equality is decided: two identical exact
/// addresses are equal, addresses into disjoint objects are not.
fn compare_addresses(pred: Predicate, lhs: &AddressValue, rhs: &AddressValue) -> IntervalValue {
    if lhs.is_bottom() || rhs.is_bottom() {
        return IntervalValue::bottom();
    }
    let equal = match (lhs.as_singleton(), rhs.as_singleton()) {
        (Some(l), Some(r)) if l == r && !l.is_summary() => IntervalValue::from_bool(true),
        _ if !lhs.is_top() && !rhs.is_top() && lhs.objects().is_disjoint(&rhs.objects()) => {
            IntervalValue::from_bool(false)
        }
        _ => IntervalValue::unknown_bool(),
    };
    match pred.relation() {
        Relation::Eq => equal,
        Relation::Ne if equal.is_numeral() => IntervalValue::from_bool(equal.is_false()),
        _ => IntervalValue::unknown_bool(),
    }
}

fn binary_op(op: BinaryOpKind, lhs: IntervalValue, rhs: IntervalValue) -> IntervalValue {
    let unsigned_ok = lhs.is_non_negative() && rhs.is_non_negative();
    match op {
        BinaryOpKind::Add => lhs.add(rhs),
        BinaryOpKind::Sub => lhs.sub(rhs),
        BinaryOpKind::Mul => lhs.mul(rhs),
        BinaryOpKind::SDiv => lhs.div(rhs),
        BinaryOpKind::SRem => lhs.rem(rhs),
        BinaryOpKind::UDiv if unsigned_ok => lhs.div(rhs),
        BinaryOpKind::URem if unsigned_ok => lhs.rem(rhs),
        BinaryOpKind::Shl => lhs.shl(rhs),
        BinaryOpKind::LShr => lhs.lshr(rhs),
        BinaryOpKind::AShr => lhs.ashr(rhs),
        BinaryOpKind::And => lhs.bitand(rhs),
        BinaryOpKind::Or => lhs.bitor(rhs),
        BinaryOpKind::Xor => lhs.bitxor(rhs),
        BinaryOpKind::UDiv
        | BinaryOpKind::URem
        | BinaryOpKind::FAdd
        | BinaryOpKind::FSub
        | BinaryOpKind::FMul
        | BinaryOpKind::FDiv
        | BinaryOpKind::FRem => {
            if lhs.is_bottom() || rhs.is_bottom() {
                IntervalValue::bottom()
            } else {
                IntervalValue::top()
            }
        }
    }
}

impl<'a> AbstractInterpretation<'a> {
    pub(crate) fn value_of(
        &self,
        state: &AbstractState,
        var: VarId,
    ) -> Result<AbstractValue, Inconsistency> {
        value_of(self.icfg, state, var)
    }

    pub(crate) fn update_state_on_stmt(
        &self,
        node: &IcfgNode,
        stmt: &Statement,
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        match stmt {
            Statement::Addr { lhs, obj, .. } => self.update_state_on_addr(*lhs, *obj, state),
            Statement::Copy { lhs, rhs, kind } => {
                self.update_state_on_copy(*lhs, *rhs, *kind, state)?
            }
            Statement::Gep {
                lhs,
                base,
                index,
                elem_bytes,
            } => self.update_state_on_gep(*lhs, *base, *index, *elem_bytes, state)?,
            Statement::Load { lhs, ptr } => self.update_state_on_load(*lhs, *ptr, state)?,
            Statement::Store { ptr, value } => self.update_state_on_store(*ptr, *value, state)?,
            Statement::CallPe {
                formal,
                actual,
                call_site,
            } => self.update_state_on_call_pe(*formal, *actual, *call_site, state)?,
            // Applied to each callee's exit state while merging the return
            // node, the joined state no longer holds the callee's result.
            Statement::RetPe { .. } => {}
            Statement::Cmp {
                res,
                lhs,
                rhs,
                pred,
            } => self.update_state_on_cmp(*res, *lhs, *rhs, *pred, state)?,
            Statement::BinaryOp { res, lhs, rhs, op } => {
                self.update_state_on_binary(*res, *lhs, *rhs, *op, state)?
            }
            Statement::UnaryOp { res, operand, op } => {
                self.update_state_on_unary(*res, *operand, *op, state)?
            }
            Statement::Branch { .. } => {}
            Statement::Select {
                res,
                cond,
                if_true,
                if_false,
            } => self.update_state_on_select(*res, *cond, *if_true, *if_false, state)?,
            Statement::Phi { res, operands } => {
                self.update_state_on_phi(node, *res, operands, state)?
            }
            Statement::ThreadFork { formal, actual, .. } => {
                self.update_state_on_thread_fork(*formal, *actual, state)?
            }
            Statement::ThreadJoin { actual, .. } => state.set_var(*actual, AbstractValue::top()),
        }
        if let Some(def) = stmt.def() {
            trace!("{}: {} = {}", node.id, def, state.var(def));
        }
        Ok(())
    }

    fn update_state_on_addr(&self, lhs: VarId, obj: ObjId, state: &mut AbstractState) {
        state.set_var(lhs, AbstractValue::from_address(Address::base(obj)));
    }

    fn update_state_on_copy(
        &self,
        lhs: VarId,
        rhs: VarId,
        kind: CopyKind,
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        let value = self.value_of(state, rhs)?;
        let value = match kind {
            CopyKind::Value | CopyKind::BitCast | CopyKind::SExt => value,
            CopyKind::ZExt(from_bits) => value.interval().zext(from_bits).into(),
            CopyKind::Trunc(to_bits) => value.interval().trunc(to_bits).into(),
            // Null stays null, any other integer is an unknown pointer.
            CopyKind::IntToPtr => value.interval().into(),
            CopyKind::PtrToInt => match &value {
                AbstractValue::Interval(_) => value,
                AbstractValue::Address(_) => AbstractValue::top(),
            },
            CopyKind::FpToInt | CopyKind::IntToFp => AbstractValue::top(),
        };
        state.set_var(lhs, value);
        Ok(())
    }

    /// Constant offsets give exact fields. An index that is not a single
    /// number makes the result a summary of the object.
    fn update_state_on_gep(
        &self,
        lhs: VarId,
        base: VarId,
        index: GepIndex,
        elem_bytes: i64,
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        let index = match index {
            GepIndex::Const(index) => Some(index),
            GepIndex::Var(var) => self.value_of(state, var)?.interval().numeral(),
        };
        let delta = index.and_then(|index| index.checked_mul(elem_bytes));
        let value = match self.value_of(state, base)? {
            AbstractValue::Address(addresses) => AbstractValue::Address(addresses.map(|address| {
                match delta {
                    Some(delta) => address.offset_by(delta),
                    None => Address::summary(address.obj),
                }
            })),
            AbstractValue::Interval(_) => AbstractValue::top(),
        };
        state.set_var(lhs, value);
        Ok(())
    }

    fn update_state_on_load(
        &self,
        lhs: VarId,
        ptr: VarId,
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        let pointer = self.value_of(state, ptr)?;
        let value = state.load(&pointer);
        state.set_var(lhs, value);
        Ok(())
    }

    fn update_state_on_store(
        &self,
        ptr: VarId,
        value: VarId,
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        let pointer = self.value_of(state, ptr)?;
        let value = self.value_of(state, value)?;
        state.store(&pointer, value);
        Ok(())
    }

    fn update_state_on_call_pe(
        &self,
        formal: VarId,
        actual: VarId,
        call_site: NodeId,
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        if self.call_site_stack.last() == Some(&call_site) {
            let value = self.value_of(state, actual)?;
            state.set_var(formal, value);
        }
        Ok(())
    }

    /// Binds the result `formal` of a callee to the `actual` of the call,
    /// on the exit state of that callee.
    pub(crate) fn update_state_on_ret_pe(
        &self,
        actual: VarId,
        formal: VarId,
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        let value = self.value_of(state, formal)?;
        state.set_var(actual, value);
        Ok(())
    }

    fn update_state_on_cmp(
        &self,
        res: VarId,
        lhs: VarId,
        rhs: VarId,
        pred: Predicate,
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        let lhs = self.value_of(state, lhs)?;
        let rhs = self.value_of(state, rhs)?;
        let result = match (&lhs, &rhs) {
            (AbstractValue::Address(l), AbstractValue::Address(r)) => compare_addresses(pred, l, r),
            (AbstractValue::Address(_), _) | (_, AbstractValue::Address(_)) => {
                IntervalValue::unknown_bool()
            }
            (AbstractValue::Interval(l), AbstractValue::Interval(r)) => compare(pred, l, r),
        };
        state.set_var(res, result.into());
        Ok(())
    }

    fn update_state_on_binary(
        &self,
        res: VarId,
        lhs: VarId,
        rhs: VarId,
        op: BinaryOpKind,
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        let lhs = self.value_of(state, lhs)?;
        let rhs = self.value_of(state, rhs)?;
        let result = if lhs.is_address() || rhs.is_address() {
            AbstractValue::top()
        } else {
            binary_op(op, lhs.interval(), rhs.interval()).into()
        };
        state.set_var(res, result);
        Ok(())
    }

    fn update_state_on_unary(
        &self,
        res: VarId,
        operand: VarId,
        op: UnaryOpKind,
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        let operand = self.value_of(state, operand)?.interval();
        let result = match op {
            UnaryOpKind::Neg => operand.neg(),
            UnaryOpKind::Not => operand.bitnot(),
            UnaryOpKind::FNeg => IntervalValue::top(),
        };
        state.set_var(res, result.into());
        Ok(())
    }

    fn update_state_on_select(
        &self,
        res: VarId,
        cond: VarId,
        if_true: VarId,
        if_false: VarId,
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        let cond = self.value_of(state, cond)?.interval();
        let value = if cond.is_true() {
            self.value_of(state, if_true)?
        } else if cond.is_false() {
            self.value_of(state, if_false)?
        } else {
            self.value_of(state, if_true)?
                .join(self.value_of(state, if_false)?)
        };
        state.set_var(res, value);
        Ok(())
    }

    /// Joins the operands of the predecessors that were reached and whose
    /// edge into `node` is feasible, each read in the state refined by that
    /// edge.
    fn update_state_on_phi(
        &self,
        node: &IcfgNode,
        res: VarId,
        operands: &[(VarId, NodeId)],
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        let mut value: Option<AbstractValue> = None;
        for &(operand, pred) in operands {
            let pred_state = match self.trace.get(&pred) {
                Some(pred_state) => pred_state,
                None => continue,
            };
            let edges = node
                .in_edges()
                .iter()
                .map(|&e| self.icfg.edge(e))
                .filter(|edge| edge.is_intra() && edge.src == pred);
            for edge in edges {
                let mut refined = pred_state.clone();
                if !self.is_branch_feasible(edge, &mut refined)? {
                    continue;
                }
                let operand_value = self.value_of(&refined, operand)?;
                value = Some(match value {
                    Some(value) => value.join(operand_value),
                    None => operand_value,
                });
            }
        }
        state.set_var(res, value.unwrap_or_else(AbstractValue::top));
        Ok(())
    }

    /// The routine is not traversed, its formal only collects the values
    /// passed by every fork seen so far.
    fn update_state_on_thread_fork(
        &self,
        formal: VarId,
        actual: VarId,
        state: &mut AbstractState,
    ) -> Result<(), Inconsistency> {
        let actual = self.value_of(state, actual)?;
        let value = if state.has_var(formal) {
            state.var(formal).into_owned().join(actual)
        } else {
            actual
        };
        state.set_var(formal, value);
        Ok(())
    }
}
