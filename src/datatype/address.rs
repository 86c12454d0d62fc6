/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::BTreeSet;
use std::fmt;
use std::iter::FromIterator;

use serde::Serialize;

use crate::datatype::AbstractDomain;
use crate::ir::ObjId;

/// Location inside a memory object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Field {
    /// A known byte offset from the start of the object.
    Exact(i64),
    /// Any offset of the object.
    Summary,
}

/// An abstract memory address: an object plus a field within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Address {
    pub obj: ObjId,
    pub field: Field,
}

impl Address {
    pub fn base(obj: ObjId) -> Self {
        Self {
            obj,
            field: Field::Exact(0),
        }
    }

    pub fn summary(obj: ObjId) -> Self {
        Self {
            obj,
            field: Field::Summary,
        }
    }

    pub fn exact(obj: ObjId, offset: i64) -> Self {
        Self {
            obj,
            field: Field::Exact(offset),
        }
    }

    pub fn is_summary(&self) -> bool {
        self.field == Field::Summary
    }

    /// Smallest and largest address of `obj` in the address order, used to
    /// scan every cell of an object.
    pub fn object_bounds(obj: ObjId) -> (Self, Self) {
        (Self::exact(obj, i64::MIN), Self::summary(obj))
    }

    /// The address `delta` bytes further, summary fields stay summary.
    pub fn offset_by(self, delta: i64) -> Self {
        match self.field {
            Field::Exact(offset) => match offset.checked_add(delta) {
                Some(offset) => Self::exact(self.obj, offset),
                None => Self::summary(self.obj),
            },
            Field::Summary => self,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field {
            Field::Exact(offset) => write!(f, "{}+{}", self.obj, offset),
            Field::Summary => write!(f, "{}+*", self.obj),
        }
    }
}

/// A powerset of addresses. The empty set is represented by `Bottom` only.
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub enum AddressValue {
    Top,
    Value(BTreeSet<Address>),
    Bottom,
}

impl AddressValue {
    pub fn from_set(set: BTreeSet<Address>) -> Self {
        if set.is_empty() {
            AddressValue::Bottom
        } else {
            AddressValue::Value(set)
        }
    }

    pub fn singleton(address: Address) -> Self {
        Self::from_set(BTreeSet::from([address]))
    }

    pub fn add_element(&mut self, address: Address) {
        match self {
            Self::Value(set) => {
                set.insert(address);
            }
            Self::Bottom => *self = Self::singleton(address),
            Self::Top => {}
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &'_ Address> {
        let res = match self {
            Self::Value(set) => Some(set.iter()),
            _ => None,
        };
        res.into_iter().flatten()
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Value(set) => set.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single address this value denotes, if any.
    pub fn as_singleton(&self) -> Option<Address> {
        match self {
            Self::Value(set) if set.len() == 1 => set.iter().next().copied(),
            _ => None,
        }
    }

    pub fn objects(&self) -> BTreeSet<ObjId> {
        self.elements().map(|address| address.obj).collect()
    }

    /// Applies `f` to every address.
    pub fn map(&self, f: impl Fn(Address) -> Address) -> Self {
        match self {
            Self::Value(set) => Self::from_set(set.iter().map(|a| f(*a)).collect()),
            other => other.clone(),
        }
    }
}

impl AbstractDomain for AddressValue {
    fn bottom() -> Self {
        AddressValue::Bottom
    }

    fn top() -> Self {
        AddressValue::Top
    }

    fn is_bottom(&self) -> bool {
        matches!(self, AddressValue::Bottom)
    }

    fn is_top(&self) -> bool {
        matches!(self, AddressValue::Top)
    }

    fn leq(&self, rhs: &Self) -> bool {
        use AddressValue::*;
        match self {
            Top => rhs.is_top(),
            Value(s) => match rhs {
                Top => true,
                Value(t) => s.is_subset(t),
                Bottom => false,
            },
            Bottom => true,
        }
    }

    fn join_with(&mut self, rhs: Self) {
        use AddressValue::*;
        match self {
            Top => {}
            Value(s) => match rhs {
                Top => *self = rhs,
                Value(t) => s.extend(t),
                Bottom => {}
            },
            Bottom => *self = rhs,
        };
    }

    fn meet_with(&mut self, rhs: Self) {
        use AddressValue::*;
        match self {
            Top => *self = rhs,
            Value(s) => match rhs {
                Top => {}
                Value(t) => {
                    let kept = s.intersection(&t).copied().collect();
                    *self = Self::from_set(kept);
                }
                Bottom => *self = rhs,
            },
            Bottom => {}
        };
    }

    /// Objects that gain new exact fields are collapsed to their summary
    /// field. The set of objects is finite, so chains stabilize.
    fn widen_with(&mut self, rhs: Self) {
        use AddressValue::*;
        let new = match rhs {
            Bottom => return,
            Top => {
                *self = Top;
                return;
            }
            Value(t) => t,
        };
        let old = match self {
            Top => return,
            Bottom => {
                *self = Value(new);
                return;
            }
            Value(s) => std::mem::take(s),
        };
        let growing: BTreeSet<ObjId> = new
            .iter()
            .filter(|address| !old.contains(address))
            .map(|address| address.obj)
            .collect();
        let widened = old
            .into_iter()
            .chain(new)
            .map(|address| {
                if growing.contains(&address.obj) {
                    Address::summary(address.obj)
                } else {
                    address
                }
            })
            .collect();
        *self = Self::from_set(widened);
    }

    fn narrow_with(&mut self, rhs: Self) {
        if rhs.is_bottom() || self.is_top() {
            *self = rhs;
        }
    }
}

impl FromIterator<Address> for AddressValue {
    fn from_iter<T: IntoIterator<Item = Address>>(iter: T) -> Self {
        Self::from_set(iter.into_iter().collect())
    }
}

impl fmt::Display for AddressValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressValue::Top => write!(f, "{{*}}"),
            AddressValue::Bottom => write!(f, "{{}}"),
            AddressValue::Value(set) => {
                write!(f, "{{")?;
                for (i, address) in set.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", address)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(id: u32) -> ObjId {
        ObjId::new(id)
    }

    #[test]
    fn test_empty_set_is_bottom() {
        assert!(AddressValue::from_iter(std::iter::empty()).is_bottom());
        let a = AddressValue::singleton(Address::base(obj(1)));
        let b = AddressValue::singleton(Address::base(obj(2)));
        assert!(a.meet(b).is_bottom());
    }

    #[test]
    fn test_join_and_leq() {
        let a = AddressValue::singleton(Address::base(obj(1)));
        let b = AddressValue::singleton(Address::exact(obj(2), 4));
        let joined = a.clone().join(b.clone());
        assert_eq!(joined.len(), 2);
        assert!(a.leq(&joined));
        assert!(b.leq(&joined));
        assert!(!joined.leq(&a));
        assert!(joined.leq(&AddressValue::top()));
    }

    #[test]
    fn test_widen_collapses_growing_objects() {
        let old: AddressValue = [Address::exact(obj(1), 0), Address::base(obj(2))]
            .into_iter()
            .collect();
        let new: AddressValue = [Address::exact(obj(1), 4), Address::base(obj(2))]
            .into_iter()
            .collect();
        let widened = old.widen(new.clone());
        let expected: AddressValue = [Address::summary(obj(1)), Address::base(obj(2))]
            .into_iter()
            .collect();
        assert_eq!(widened, expected);
        assert_eq!(widened.clone().widen(new), widened);
    }

    #[test]
    fn test_object_bounds_cover_every_field() {
        let (lo, hi) = Address::object_bounds(obj(3));
        for address in [
            Address::exact(obj(3), -8),
            Address::base(obj(3)),
            Address::summary(obj(3)),
        ] {
            assert!(lo <= address && address <= hi);
        }
        assert!(Address::base(obj(4)) > hi);
        assert!(Address::summary(obj(2)) < lo);
    }
}
