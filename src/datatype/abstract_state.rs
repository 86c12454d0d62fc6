/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::borrow::Cow;
use std::fmt;

use crate::datatype::AbstractDomain;
use crate::datatype::AbstractEnvironment;
use crate::datatype::AbstractValue;
use crate::datatype::Address;
use crate::datatype::AddressValue;
use crate::datatype::Field;
use crate::datatype::OrdMapAbstractEnvironment;
use crate::ir::ObjId;
use crate::ir::VarId;

pub type VarEnvironment = OrdMapAbstractEnvironment<VarId, AbstractValue>;
pub type MemEnvironment = OrdMapAbstractEnvironment<Address, AbstractValue>;

/// Abstract program state at a point: values of top-level variables and of
/// memory cells.
///
/// Memory cells are keyed by exact addresses only. A write through a summary
/// address weakly updates every bound cell of the object, so reading an
/// exact cell never needs to consult other cells.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct AbstractState {
    vars: VarEnvironment,
    mem: MemEnvironment,
}

impl AbstractState {
    pub fn var(&self, var: VarId) -> Cow<'_, AbstractValue> {
        self.vars.get(&var)
    }

    pub fn has_var(&self, var: VarId) -> bool {
        self.vars.contains(&var)
    }

    pub fn set_var(&mut self, var: VarId, value: AbstractValue) {
        self.vars.set(var, value);
    }

    pub fn vars(&self) -> impl Iterator<Item = (&VarId, &AbstractValue)> {
        self.vars.iter()
    }

    pub fn memory(&self) -> impl Iterator<Item = (&Address, &AbstractValue)> {
        self.mem.iter()
    }

    /// Bound cells of `obj`.
    pub fn object_cells(&self, obj: ObjId) -> impl Iterator<Item = (&Address, &AbstractValue)> {
        let (lo, hi) = Address::object_bounds(obj);
        self.mem.range(&lo, &hi)
    }

    /// Value stored at a single address. A summary address may denote any
    /// cell of the object, including never written ones, and reads as top.
    pub fn load_address(&self, address: Address) -> AbstractValue {
        match address.field {
            Field::Exact(_) => self.mem.get(&address).into_owned(),
            Field::Summary => AbstractValue::top(),
        }
    }

    /// Value read through a pointer: the join over every pointee. A pointer
    /// with unknown targets reads as top.
    pub fn load(&self, pointer: &AbstractValue) -> AbstractValue {
        match pointer.addresses() {
            Some(AddressValue::Value(addresses)) => {
                AbstractValue::join_all(addresses.iter().map(|&a| self.load_address(a)))
            }
            Some(AddressValue::Bottom) => AbstractValue::bottom(),
            _ => AbstractValue::top(),
        }
    }

    pub fn store_strong(&mut self, address: Address, value: AbstractValue) {
        match address.field {
            Field::Exact(_) => self.mem.set(address, value),
            Field::Summary => self.store_weak(address, value),
        }
    }

    pub fn store_weak(&mut self, address: Address, value: AbstractValue) {
        match address.field {
            Field::Exact(_) => self.mem.join_at(&address, value),
            Field::Summary => {
                let cells: Vec<Address> = self.object_cells(address.obj).map(|(a, _)| *a).collect();
                for cell in cells {
                    self.mem.join_at(&cell, value.clone());
                }
            }
        }
    }

    /// Write through a pointer. A single exact target is strongly updated,
    /// several targets are weakly updated. Unknown targets havoc the whole
    /// memory, while null (an interval of exactly zero) writes nothing.
    pub fn store(&mut self, pointer: &AbstractValue, value: AbstractValue) {
        match pointer {
            AbstractValue::Address(AddressValue::Value(addresses)) => {
                if addresses.len() == 1 {
                    if let Some(&address) = addresses.iter().next() {
                        self.store_strong(address, value);
                    }
                } else {
                    for &address in addresses {
                        self.store_weak(address, value.clone());
                    }
                }
            }
            AbstractValue::Address(AddressValue::Bottom) => {}
            AbstractValue::Interval(interval) if interval.numeral() == Some(0) => {}
            _ => self.havoc_memory(),
        }
    }

    /// Forgets everything known about the cells of `obj`.
    pub fn havoc_object(&mut self, obj: ObjId) {
        let cells: Vec<Address> = self.object_cells(obj).map(|(a, _)| *a).collect();
        for cell in cells {
            self.mem.remove(&cell);
        }
    }

    /// Forgets the cells of `obj` at byte offsets in `from..to`.
    pub fn havoc_cells(&mut self, obj: ObjId, from: i64, to: i64) {
        if from >= to {
            return;
        }
        let (lo, hi) = (Address::exact(obj, from), Address::exact(obj, to - 1));
        let cells: Vec<Address> = self.mem.range(&lo, &hi).map(|(a, _)| *a).collect();
        for cell in cells {
            self.mem.remove(&cell);
        }
    }

    pub fn havoc_memory(&mut self) {
        if !self.mem.is_bottom() {
            self.mem = MemEnvironment::top();
        }
    }

    /// Forgets the pointees of `pointer`, used when an unknown callee may
    /// write through it. Like `store`, a pointer with unknown targets may
    /// reach any object, and null reaches none.
    pub fn havoc_pointees(&mut self, pointer: &AbstractValue) {
        match pointer {
            AbstractValue::Address(AddressValue::Value(addresses)) => {
                let objects: Vec<ObjId> = addresses.iter().map(|a| a.obj).collect();
                for obj in objects {
                    self.havoc_object(obj);
                }
            }
            AbstractValue::Address(AddressValue::Bottom) => {}
            AbstractValue::Interval(interval)
                if interval.is_bottom() || interval.numeral() == Some(0) => {}
            _ => self.havoc_memory(),
        }
    }

    /// Number of bindings, reported in the statistics.
    pub fn size(&self) -> usize {
        self.vars.len() + self.mem.len()
    }
}

impl AbstractDomain for AbstractState {
    fn bottom() -> Self {
        Self {
            vars: VarEnvironment::bottom(),
            mem: MemEnvironment::bottom(),
        }
    }

    fn top() -> Self {
        Self {
            vars: VarEnvironment::top(),
            mem: MemEnvironment::top(),
        }
    }

    fn is_bottom(&self) -> bool {
        self.vars.is_bottom() || self.mem.is_bottom()
    }

    fn is_top(&self) -> bool {
        self.vars.is_top() && self.mem.is_top()
    }

    fn leq(&self, rhs: &Self) -> bool {
        if self.is_bottom() {
            return true;
        }
        if rhs.is_bottom() {
            return false;
        }
        self.vars.leq(&rhs.vars) && self.mem.leq(&rhs.mem)
    }

    fn join_with(&mut self, rhs: Self) {
        if rhs.is_bottom() {
            return;
        }
        if self.is_bottom() {
            *self = rhs;
            return;
        }
        self.vars.join_with(rhs.vars);
        self.mem.join_with(rhs.mem);
    }

    fn meet_with(&mut self, rhs: Self) {
        self.vars.meet_with(rhs.vars);
        self.mem.meet_with(rhs.mem);
        if self.is_bottom() {
            *self = Self::bottom();
        }
    }

    fn widen_with(&mut self, rhs: Self) {
        if rhs.is_bottom() {
            return;
        }
        if self.is_bottom() {
            *self = rhs;
            return;
        }
        self.vars.widen_with(rhs.vars);
        self.mem.widen_with(rhs.mem);
    }

    fn narrow_with(&mut self, rhs: Self) {
        self.vars.narrow_with(rhs.vars);
        self.mem.narrow_with(rhs.mem);
        if self.is_bottom() {
            *self = Self::bottom();
        }
    }
}

impl fmt::Display for AbstractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bottom() {
            return writeln!(f, "_|_");
        }
        for (var, value) in self.vars() {
            writeln!(f, "{} => {}", var, value)?;
        }
        for (address, value) in self.memory() {
            writeln!(f, "[{}] => {}", address, value)?;
        }
        Ok(())
    }
}
