/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;

use crate::datatype::AbstractDomain;
use crate::datatype::Address;
use crate::datatype::AddressValue;
use crate::datatype::DisjointUnion;
use crate::datatype::IntervalValue;

/// The value of a variable or memory cell: either an integer interval or a
/// set of addresses. Mixing both kinds goes to top.
#[derive(Clone, PartialEq, Eq, Debug, Hash, DisjointUnion)]
pub enum AbstractValue {
    Interval(IntervalValue),
    Address(AddressValue),
}

impl AbstractValue {
    pub fn is_interval(&self) -> bool {
        matches!(self, AbstractValue::Interval(_))
    }

    pub fn is_address(&self) -> bool {
        matches!(self, AbstractValue::Address(_))
    }

    /// The interval view. Address values have no numeric meaning and read
    /// as top.
    pub fn interval(&self) -> IntervalValue {
        match self {
            AbstractValue::Interval(interval) => *interval,
            AbstractValue::Address(_) => IntervalValue::top(),
        }
    }

    pub fn addresses(&self) -> Option<&AddressValue> {
        match self {
            AbstractValue::Address(addresses) => Some(addresses),
            AbstractValue::Interval(_) => None,
        }
    }

    pub fn from_address(address: Address) -> Self {
        AbstractValue::Address(AddressValue::singleton(address))
    }
}

impl From<IntervalValue> for AbstractValue {
    fn from(interval: IntervalValue) -> Self {
        AbstractValue::Interval(interval)
    }
}

impl From<AddressValue> for AbstractValue {
    fn from(addresses: AddressValue) -> Self {
        AbstractValue::Address(addresses)
    }
}

impl From<i64> for AbstractValue {
    fn from(value: i64) -> Self {
        AbstractValue::Interval(IntervalValue::singleton(value))
    }
}

impl fmt::Display for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractValue::Interval(interval) => write!(f, "{}", interval),
            AbstractValue::Address(addresses) => write!(f, "{}", addresses),
        }
    }
}
