/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::datatype::AbstractDomain;

/// An end point of an interval. The derived ordering puts `NegInf` below every
/// finite value and `PosInf` above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Bound {
    NegInf,
    Finite(i64),
    PosInf,
}

impl Bound {
    pub fn is_finite(self) -> bool {
        matches!(self, Bound::Finite(_))
    }

    pub fn finite(self) -> Option<i64> {
        match self {
            Bound::Finite(v) => Some(v),
            _ => None,
        }
    }

    fn signum(self) -> i64 {
        match self {
            Bound::NegInf => -1,
            Bound::Finite(v) => v.signum(),
            Bound::PosInf => 1,
        }
    }

    fn from_sign(sign: i64) -> Self {
        if sign < 0 {
            Bound::NegInf
        } else {
            Bound::PosInf
        }
    }

    /// Sum of two bounds. `toward` decides the result of `-inf + +inf`, which
    /// callers pick so that the enclosing interval only grows.
    fn add(self, rhs: Self, toward: Self) -> Self {
        match (self, rhs) {
            (Bound::Finite(x), Bound::Finite(y)) => match x.checked_add(y) {
                Some(v) => Bound::Finite(v),
                None => Bound::from_sign(y),
            },
            (Bound::Finite(_), inf) | (inf, Bound::Finite(_)) => inf,
            (x, y) if x == y => x,
            _ => toward,
        }
    }

    fn neg(self) -> Self {
        match self {
            Bound::NegInf => Bound::PosInf,
            Bound::PosInf => Bound::NegInf,
            Bound::Finite(v) => match v.checked_neg() {
                Some(n) => Bound::Finite(n),
                None => Bound::PosInf,
            },
        }
    }

    fn mul(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Bound::Finite(x), Bound::Finite(y)) => match x.checked_mul(y) {
                Some(v) => Bound::Finite(v),
                None => Bound::from_sign(x.signum() * y.signum()),
            },
            (Bound::Finite(0), _) | (_, Bound::Finite(0)) => Bound::Finite(0),
            (x, y) => Bound::from_sign(x.signum() * y.signum()),
        }
    }

    /// Truncating division, `rhs` is never zero.
    fn div(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Bound::Finite(x), Bound::Finite(y)) => match x.checked_div(y) {
                Some(v) => Bound::Finite(v),
                None => Bound::PosInf,
            },
            (Bound::Finite(_), _) => Bound::Finite(0),
            (x, Bound::Finite(y)) => Bound::from_sign(x.signum() * y.signum()),
            _ => Bound::Finite(0),
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::NegInf => write!(f, "-inf"),
            Bound::Finite(v) => write!(f, "{}", v),
            Bound::PosInf => write!(f, "+inf"),
        }
    }
}

/// A closed interval of integers with possibly infinite end points.
///
/// Bottom has a single representation (`[+inf, -inf]`), so structural
/// equality is lattice equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntervalValue {
    lb: Bound,
    ub: Bound,
}

impl IntervalValue {
    pub fn new(lb: Bound, ub: Bound) -> Self {
        if lb > ub || lb == Bound::PosInf || ub == Bound::NegInf {
            Self::bottom()
        } else {
            Self { lb, ub }
        }
    }

    pub fn from_range(lb: i64, ub: i64) -> Self {
        Self::new(Bound::Finite(lb), Bound::Finite(ub))
    }

    pub fn singleton(value: i64) -> Self {
        Self::from_range(value, value)
    }

    /// Value of a boolean whose truth is unknown.
    pub fn unknown_bool() -> Self {
        Self::from_range(0, 1)
    }

    pub fn from_bool(value: bool) -> Self {
        Self::singleton(value as i64)
    }

    /// `[0, +inf]`
    pub fn non_negative() -> Self {
        Self::new(Bound::Finite(0), Bound::PosInf)
    }

    pub fn lb(&self) -> Bound {
        self.lb
    }

    pub fn ub(&self) -> Bound {
        self.ub
    }

    /// True when the interval denotes exactly one integer.
    pub fn is_numeral(&self) -> bool {
        self.numeral().is_some()
    }

    pub fn numeral(&self) -> Option<i64> {
        match (self.lb, self.ub) {
            (Bound::Finite(l), Bound::Finite(u)) if l == u => Some(l),
            _ => None,
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        !self.is_bottom() && self.lb <= Bound::Finite(value) && Bound::Finite(value) <= self.ub
    }

    pub fn is_non_negative(&self) -> bool {
        !self.is_bottom() && self.lb >= Bound::Finite(0)
    }

    pub fn is_true(&self) -> bool {
        !self.is_bottom() && !self.contains(0)
    }

    pub fn is_false(&self) -> bool {
        self.numeral() == Some(0)
    }

    fn corners(values: [Bound; 4]) -> Self {
        let lb = values.iter().copied().min().unwrap_or(Bound::NegInf);
        let ub = values.iter().copied().max().unwrap_or(Bound::PosInf);
        Self::new(lb, ub)
    }

    fn lift2(self, rhs: Self, op: impl FnOnce(Self, Self) -> Self) -> Self {
        if self.is_bottom() || rhs.is_bottom() {
            Self::bottom()
        } else {
            op(self, rhs)
        }
    }

    pub fn add(self, rhs: Self) -> Self {
        self.lift2(rhs, |l, r| {
            Self::new(
                l.lb.add(r.lb, Bound::NegInf),
                l.ub.add(r.ub, Bound::PosInf),
            )
        })
    }

    pub fn sub(self, rhs: Self) -> Self {
        self.add(rhs.neg())
    }

    pub fn neg(self) -> Self {
        if self.is_bottom() {
            return self;
        }
        Self::new(self.ub.neg(), self.lb.neg())
    }

    pub fn mul(self, rhs: Self) -> Self {
        self.lift2(rhs, |l, r| {
            Self::corners([
                l.lb.mul(r.lb),
                l.lb.mul(r.ub),
                l.ub.mul(r.lb),
                l.ub.mul(r.ub),
            ])
        })
    }

    fn div_nonzero(self, rhs: Self) -> Self {
        if rhs.is_bottom() {
            return Self::bottom();
        }
        Self::corners([
            self.lb.div(rhs.lb),
            self.lb.div(rhs.ub),
            self.ub.div(rhs.lb),
            self.ub.div(rhs.ub),
        ])
    }

    /// Signed truncating division. A divisor that can only be zero yields
    /// top.
    pub fn div(self, rhs: Self) -> Self {
        self.lift2(rhs, |l, r| {
            let negative = r.meet(Self::new(Bound::NegInf, Bound::Finite(-1)));
            let positive = r.meet(Self::new(Bound::Finite(1), Bound::PosInf));
            if negative.is_bottom() && positive.is_bottom() {
                return Self::top();
            }
            l.div_nonzero(negative).join(l.div_nonzero(positive))
        })
    }

    /// Signed remainder, the result takes the sign of the dividend.
    pub fn rem(self, rhs: Self) -> Self {
        self.lift2(rhs, |l, r| {
            if let (Some(x), Some(y)) = (l.numeral(), r.numeral()) {
                return match x.checked_rem(y) {
                    Some(v) => Self::singleton(v),
                    None => Self::top(),
                };
            }
            if r.numeral() == Some(0) {
                return Self::top();
            }
            let magnitude = match (r.lb.finite(), r.ub.finite()) {
                (Some(lo), Some(hi)) => {
                    Bound::Finite(lo.unsigned_abs().max(hi.unsigned_abs()).saturating_sub(1).min(i64::MAX as u64) as i64)
                }
                _ => Bound::PosInf,
            };
            let divisor_range = Self::new(magnitude.neg(), magnitude);
            let dividend_range = if l.is_non_negative() {
                Self::new(Bound::Finite(0), l.ub)
            } else if l.ub <= Bound::Finite(0) {
                Self::new(l.lb, Bound::Finite(0))
            } else {
                l
            };
            dividend_range.meet(divisor_range)
        })
    }

    pub fn shl(self, rhs: Self) -> Self {
        self.lift2(rhs, |l, r| match r.numeral() {
            Some(k) if (0..63).contains(&k) => l.mul(Self::singleton(1i64 << k)),
            _ => Self::top(),
        })
    }

    /// Arithmetic shift right.
    pub fn ashr(self, rhs: Self) -> Self {
        self.lift2(rhs, |l, r| match r.numeral() {
            Some(k) if (0..64).contains(&k) => {
                let shift = |b: Bound| match b {
                    Bound::Finite(v) => Bound::Finite(v >> k),
                    inf => inf,
                };
                Self::new(shift(l.lb), shift(l.ub))
            }
            _ => Self::top(),
        })
    }

    /// Logical shift right. Negative operands depend on the bit width, which
    /// is not tracked.
    pub fn lshr(self, rhs: Self) -> Self {
        self.lift2(rhs, |l, r| {
            if l.is_non_negative() {
                l.ashr(r)
            } else if r.lb >= Bound::Finite(1) {
                Self::non_negative()
            } else {
                Self::top()
            }
        })
    }

    fn all_ones_above(b: Bound) -> Bound {
        match b {
            Bound::Finite(v) if v >= 0 => {
                let bits = 64 - (v as u64).leading_zeros();
                if bits >= 63 {
                    Bound::Finite(i64::MAX)
                } else {
                    Bound::Finite((1i64 << bits) - 1)
                }
            }
            _ => Bound::PosInf,
        }
    }

    pub fn bitand(self, rhs: Self) -> Self {
        self.lift2(rhs, |l, r| {
            if let (Some(x), Some(y)) = (l.numeral(), r.numeral()) {
                return Self::singleton(x & y);
            }
            match (l.is_non_negative(), r.is_non_negative()) {
                (true, true) => Self::new(Bound::Finite(0), l.ub.min(r.ub)),
                (true, false) => Self::new(Bound::Finite(0), l.ub),
                (false, true) => Self::new(Bound::Finite(0), r.ub),
                (false, false) => Self::top(),
            }
        })
    }

    pub fn bitor(self, rhs: Self) -> Self {
        self.lift2(rhs, |l, r| {
            if let (Some(x), Some(y)) = (l.numeral(), r.numeral()) {
                return Self::singleton(x | y);
            }
            if l.is_non_negative() && r.is_non_negative() {
                Self::new(l.lb.max(r.lb), Self::all_ones_above(l.ub.max(r.ub)))
            } else {
                Self::top()
            }
        })
    }

    pub fn bitxor(self, rhs: Self) -> Self {
        self.lift2(rhs, |l, r| {
            if let (Some(x), Some(y)) = (l.numeral(), r.numeral()) {
                return Self::singleton(x ^ y);
            }
            if l.is_non_negative() && r.is_non_negative() {
                Self::new(Bound::Finite(0), Self::all_ones_above(l.ub.max(r.ub)))
            } else {
                Self::top()
            }
        })
    }

    /// `!x`, i.e. `-x - 1`.
    pub fn bitnot(self) -> Self {
        self.neg().sub(Self::singleton(1))
    }

    /// Zero extension from `from_bits`: negative values reinterpret as large
    /// unsigned ones.
    pub fn zext(self, from_bits: u32) -> Self {
        if self.is_bottom() || self.is_non_negative() {
            return self;
        }
        if from_bits == 0 || from_bits >= 63 {
            Self::non_negative()
        } else {
            Self::from_range(0, (1i64 << from_bits) - 1)
        }
    }

    /// Truncation to `to_bits`. Values that fit either the signed or the
    /// unsigned range of the target width are kept.
    pub fn trunc(self, to_bits: u32) -> Self {
        if self.is_bottom() || to_bits == 0 || to_bits >= 64 {
            return self;
        }
        if to_bits == 1 {
            return if self.leq(&Self::unknown_bool()) {
                self
            } else {
                Self::unknown_bool()
            };
        }
        let signed = Self::from_range(-(1i64 << (to_bits - 1)), (1i64 << (to_bits - 1)) - 1);
        // 2^to_bits - 1, which is i64::MAX for 63 bits.
        let unsigned = Self::from_range(0, i64::MAX >> (63 - to_bits));
        if self.leq(&signed) || self.leq(&unsigned) {
            self
        } else {
            signed.join(unsigned)
        }
    }

    /// `[1, 1]` when every pair satisfies `==`, `[0, 0]` when none does.
    pub fn cmp_eq(&self, rhs: &Self) -> Self {
        if self.is_bottom() || rhs.is_bottom() {
            return Self::bottom();
        }
        match (self.numeral(), rhs.numeral()) {
            (Some(x), Some(y)) => Self::from_bool(x == y),
            _ if self.meet(*rhs).is_bottom() => Self::from_bool(false),
            _ => Self::unknown_bool(),
        }
    }

    pub fn cmp_ne(&self, rhs: &Self) -> Self {
        let eq = self.cmp_eq(rhs);
        if eq.is_bottom() || !eq.is_numeral() {
            eq
        } else {
            Self::from_bool(eq.is_false())
        }
    }

    /// Signed `<`.
    pub fn cmp_lt(&self, rhs: &Self) -> Self {
        if self.is_bottom() || rhs.is_bottom() {
            return Self::bottom();
        }
        if self.ub < rhs.lb {
            Self::from_bool(true)
        } else if self.lb >= rhs.ub {
            Self::from_bool(false)
        } else {
            Self::unknown_bool()
        }
    }

    /// Signed `<=`.
    pub fn cmp_le(&self, rhs: &Self) -> Self {
        if self.is_bottom() || rhs.is_bottom() {
            return Self::bottom();
        }
        if self.ub <= rhs.lb {
            Self::from_bool(true)
        } else if self.lb > rhs.ub {
            Self::from_bool(false)
        } else {
            Self::unknown_bool()
        }
    }

    pub fn cmp_gt(&self, rhs: &Self) -> Self {
        rhs.cmp_lt(self)
    }

    pub fn cmp_ge(&self, rhs: &Self) -> Self {
        rhs.cmp_le(self)
    }
}

impl PartialOrd for IntervalValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.leq(other), other.leq(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}

impl AbstractDomain for IntervalValue {
    fn bottom() -> Self {
        Self {
            lb: Bound::PosInf,
            ub: Bound::NegInf,
        }
    }

    fn top() -> Self {
        Self {
            lb: Bound::NegInf,
            ub: Bound::PosInf,
        }
    }

    fn is_bottom(&self) -> bool {
        self.lb == Bound::PosInf
    }

    fn is_top(&self) -> bool {
        self.lb == Bound::NegInf && self.ub == Bound::PosInf
    }

    fn leq(&self, rhs: &Self) -> bool {
        if self.is_bottom() {
            return true;
        }
        if rhs.is_bottom() {
            return false;
        }
        rhs.lb <= self.lb && self.ub <= rhs.ub
    }

    fn join_with(&mut self, rhs: Self) {
        if rhs.is_bottom() {
            return;
        }
        if self.is_bottom() {
            *self = rhs;
            return;
        }
        self.lb = self.lb.min(rhs.lb);
        self.ub = self.ub.max(rhs.ub);
    }

    fn meet_with(&mut self, rhs: Self) {
        *self = Self::new(self.lb.max(rhs.lb), self.ub.min(rhs.ub));
    }

    fn widen_with(&mut self, rhs: Self) {
        if rhs.is_bottom() {
            return;
        }
        if self.is_bottom() {
            *self = rhs;
            return;
        }
        if rhs.lb < self.lb {
            self.lb = Bound::NegInf;
        }
        if rhs.ub > self.ub {
            self.ub = Bound::PosInf;
        }
    }

    fn narrow_with(&mut self, rhs: Self) {
        if self.is_bottom() {
            return;
        }
        if rhs.is_bottom() {
            *self = rhs;
            return;
        }
        let lb = if self.lb == Bound::NegInf { rhs.lb } else { self.lb };
        let ub = if self.ub == Bound::PosInf { rhs.ub } else { self.ub };
        *self = Self::new(lb, ub);
    }
}

impl From<i64> for IntervalValue {
    fn from(value: i64) -> Self {
        Self::singleton(value)
    }
}

impl fmt::Display for IntervalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bottom() {
            write!(f, "bottom")
        } else {
            write!(f, "[{}, {}]", self.lb, self.ub)
        }
    }
}
