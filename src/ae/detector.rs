/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;
use std::collections::HashSet;

use log::debug;
use serde::Serialize;

use crate::ae::report::BugEntry;
use crate::ae::report::BugKind;
use crate::ae::report::BugReport;
use crate::ae::transfer::value_of;
use crate::ae::ExtCall;
use crate::datatype::AbstractDomain;
use crate::datatype::AbstractState;
use crate::datatype::AbstractValue;
use crate::datatype::AddressValue;
use crate::datatype::Bound;
use crate::datatype::Field;
use crate::datatype::IntervalValue;
use crate::error::Inconsistency;
use crate::ir::GepIndex;
use crate::ir::Icfg;
use crate::ir::IcfgNode;
use crate::ir::NodeId;
use crate::ir::ObjId;
use crate::ir::ObjKind;
use crate::ir::Statement;
use crate::ir::VarId;

/// How a checkpoint call turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckpointVerdict {
    /// The analysis agrees with the claim of the checkpoint.
    Confirmed,
    Violated,
}

/// A client of the abstract execution. Detectors see the state after every
/// node and every call to a function without a body.
pub trait Detector {
    fn name(&self) -> &str;

    /// Names of the stub functions whose calls are checkpoints settled by
    /// this detector.
    fn checkpoint_names(&self) -> &[&'static str] {
        &[]
    }

    fn detect(
        &mut self,
        icfg: &Icfg,
        node: &IcfgNode,
        state: &AbstractState,
        report: &mut BugReport,
    ) -> Result<(), Inconsistency>;

    /// Called after the effect of an external call has been applied.
    /// Returns a verdict when the call is one of this detector's
    /// checkpoints.
    fn handle_stub_call(
        &mut self,
        _call: &ExtCall<'_>,
        _state: &AbstractState,
        _report: &mut BugReport,
    ) -> Result<Option<CheckpointVerdict>, Inconsistency> {
        Ok(None)
    }
}

pub const SAFE_BUFACCESS: &str = "SAFE_BUFACCESS";
pub const UNSAFE_BUFACCESS: &str = "UNSAFE_BUFACCESS";

/// Functions writing `n` bytes to their first argument, with the index of
/// the `n` argument.
const BULK_WRITES: [(&str, usize); 4] = [
    ("memcpy", 2),
    ("memmove", 2),
    ("memset", 2),
    ("strncpy", 2),
];

/// Reports pointer arithmetic that may leave the bounds of its object.
///
/// Byte offsets of derived pointers are tracked per variable, because a
/// variable index turns the address itself into a summary of the object.
/// Objects of unknown size are never reported. A checkpoint reached in
/// several contexts or iterations counts as unsafe once any of them is.
#[derive(Debug, Default)]
pub struct BufOverflowDetector {
    offsets: HashMap<VarId, IntervalValue>,
    dynamic_sizes: HashMap<ObjId, IntervalValue>,
    unsafe_checkpoints: HashSet<NodeId>,
}

impl BufOverflowDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte offset of the pointer `var` from the start of its object.
    fn offset_of(
        &self,
        icfg: &Icfg,
        state: &AbstractState,
        var: VarId,
    ) -> Result<IntervalValue, Inconsistency> {
        if let Some(offset) = self.offsets.get(&var) {
            return Ok(*offset);
        }
        Ok(match value_of(icfg, state, var)? {
            AbstractValue::Address(AddressValue::Value(addresses)) => {
                IntervalValue::join_all(addresses.iter().map(|address| match address.field {
                    Field::Exact(offset) => IntervalValue::singleton(offset),
                    Field::Summary => IntervalValue::top(),
                }))
            }
            _ => IntervalValue::top(),
        })
    }

    fn size_of(&self, icfg: &Icfg, obj: ObjId) -> Result<Option<IntervalValue>, Inconsistency> {
        if let Some(size) = self.dynamic_sizes.get(&obj) {
            return Ok(Some(*size).filter(|size| size.lb().is_finite()));
        }
        let obj = icfg.obj(obj)?;
        Ok(match obj.kind {
            ObjKind::Null | ObjKind::Function(_) => None,
            _ => obj
                .byte_size
                .and_then(|size| i64::try_from(size).ok())
                .map(IntervalValue::singleton),
        })
    }

    /// Objects `ptr` may point into whose bounds `[offset, offset + len)`
    /// may exceed.
    fn overflowed_objects(
        &self,
        icfg: &Icfg,
        state: &AbstractState,
        ptr: VarId,
        len: IntervalValue,
    ) -> Result<Vec<(ObjId, IntervalValue, IntervalValue)>, Inconsistency> {
        let offset = self.offset_of(icfg, state, ptr)?;
        let mut overflowed = vec![];
        if offset.is_bottom() || len.is_bottom() {
            return Ok(overflowed);
        }
        let objects = match value_of(icfg, state, ptr)? {
            AbstractValue::Address(addresses) => addresses.objects(),
            AbstractValue::Interval(_) => return Ok(overflowed),
        };
        for obj in objects {
            if let Some(size) = self.size_of(icfg, obj)? {
                let end = offset.add(len).ub();
                if offset.lb() < Bound::Finite(0) || end > size.lb() {
                    overflowed.push((obj, offset, size));
                }
            }
        }
        Ok(overflowed)
    }

    fn report_overflows(
        &self,
        icfg: &Icfg,
        node: &IcfgNode,
        overflowed: Vec<(ObjId, IntervalValue, IntervalValue)>,
        len: IntervalValue,
        report: &mut BugReport,
    ) -> Result<(), Inconsistency> {
        for (obj, offset, size) in overflowed {
            let function = match node.function {
                Some(fun) => Some(icfg.function(fun)?.name.clone()),
                None => None,
            };
            let entry = BugEntry {
                kind: BugKind::BufferOverflow,
                node: node.id,
                function,
                loc: node.loc.clone(),
                message: format!(
                    "access of {} bytes at offset {} of {} exceeds its size {}",
                    len,
                    offset,
                    icfg.obj(obj)?.name,
                    size
                ),
            };
            if report.add(entry) {
                debug!("buffer overflow at {}", node.id);
            }
        }
        Ok(())
    }

    fn settle(
        &mut self,
        call: &ExtCall<'_>,
        state: &AbstractState,
        expect_safe: bool,
    ) -> Result<CheckpointVerdict, Inconsistency> {
        let ptr = match call.arg_var(0) {
            Some(ptr) => ptr,
            None => return Ok(CheckpointVerdict::Violated),
        };
        let len = call.arg(state, 1)?.interval();
        if !self.overflowed_objects(call.icfg, state, ptr, len)?.is_empty() {
            self.unsafe_checkpoints.insert(call.node.id);
        }
        let safe = !self.unsafe_checkpoints.contains(&call.node.id);
        Ok(if safe == expect_safe {
            CheckpointVerdict::Confirmed
        } else {
            CheckpointVerdict::Violated
        })
    }
}

impl Detector for BufOverflowDetector {
    fn name(&self) -> &str {
        "buffer-overflow"
    }

    fn checkpoint_names(&self) -> &[&'static str] {
        &[SAFE_BUFACCESS, UNSAFE_BUFACCESS]
    }

    fn detect(
        &mut self,
        icfg: &Icfg,
        node: &IcfgNode,
        state: &AbstractState,
        report: &mut BugReport,
    ) -> Result<(), Inconsistency> {
        if state.is_bottom() {
            return Ok(());
        }
        for stmt in &node.stmts {
            match stmt {
                Statement::Addr { lhs, obj, size } => {
                    if let Some(size) = size {
                        let size = value_of(icfg, state, *size)?.interval();
                        self.dynamic_sizes.insert(*obj, size);
                    }
                    self.offsets.insert(*lhs, IntervalValue::singleton(0));
                }
                Statement::Copy { lhs, rhs, .. } => {
                    if let Some(offset) = self.offsets.get(rhs).copied() {
                        self.offsets.insert(*lhs, offset);
                    }
                }
                Statement::Gep {
                    lhs,
                    base,
                    index,
                    elem_bytes,
                } => {
                    let index = match index {
                        GepIndex::Const(index) => IntervalValue::singleton(*index),
                        GepIndex::Var(var) => value_of(icfg, state, *var)?.interval(),
                    };
                    let base_offset = self.offset_of(icfg, state, *base)?;
                    let offset = base_offset.add(index.mul(IntervalValue::singleton(*elem_bytes)));
                    self.offsets.insert(*lhs, offset);
                    let len = IntervalValue::singleton(*elem_bytes);
                    let overflowed = self.overflowed_objects(icfg, state, *lhs, len)?;
                    self.report_overflows(icfg, node, overflowed, len, report)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn handle_stub_call(
        &mut self,
        call: &ExtCall<'_>,
        state: &AbstractState,
        report: &mut BugReport,
    ) -> Result<Option<CheckpointVerdict>, Inconsistency> {
        match call.callee {
            SAFE_BUFACCESS => return self.settle(call, state, true).map(Some),
            UNSAFE_BUFACCESS => return self.settle(call, state, false).map(Some),
            _ => {}
        }
        let len_index = match BULK_WRITES.iter().find(|(name, _)| *name == call.callee) {
            Some((_, len_index)) => *len_index,
            None => return Ok(None),
        };
        if let Some(dst) = call.arg_var(0) {
            let len = call.arg(state, len_index)?.interval();
            let overflowed = self.overflowed_objects(call.icfg, state, dst, len)?;
            self.report_overflows(call.icfg, call.node, overflowed, len, report)?;
        }
        Ok(None)
    }
}
