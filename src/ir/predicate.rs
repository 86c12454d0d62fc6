/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Comparison predicates, with the LLVM meaning of each code.
///
/// Floating point predicates are ordered (`O*`, false when an operand is
/// NaN) or unordered (`U*`, true when an operand is NaN).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum Predicate {
    FCMP_FALSE,
    FCMP_OEQ,
    FCMP_OGT,
    FCMP_OGE,
    FCMP_OLT,
    FCMP_OLE,
    FCMP_ONE,
    FCMP_ORD,
    FCMP_UNO,
    FCMP_UEQ,
    FCMP_UGT,
    FCMP_UGE,
    FCMP_ULT,
    FCMP_ULE,
    FCMP_UNE,
    FCMP_TRUE,
    ICMP_EQ,
    ICMP_NE,
    ICMP_UGT,
    ICMP_UGE,
    ICMP_ULT,
    ICMP_ULE,
    ICMP_SGT,
    ICMP_SGE,
    ICMP_SLT,
    ICMP_SLE,
}

/// The relation a predicate tests once NaN and signedness are set aside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Always,
    Never,
}

impl Predicate {
    pub const ALL: [Predicate; 26] = [
        Predicate::FCMP_FALSE,
        Predicate::FCMP_OEQ,
        Predicate::FCMP_OGT,
        Predicate::FCMP_OGE,
        Predicate::FCMP_OLT,
        Predicate::FCMP_OLE,
        Predicate::FCMP_ONE,
        Predicate::FCMP_ORD,
        Predicate::FCMP_UNO,
        Predicate::FCMP_UEQ,
        Predicate::FCMP_UGT,
        Predicate::FCMP_UGE,
        Predicate::FCMP_ULT,
        Predicate::FCMP_ULE,
        Predicate::FCMP_UNE,
        Predicate::FCMP_TRUE,
        Predicate::ICMP_EQ,
        Predicate::ICMP_NE,
        Predicate::ICMP_UGT,
        Predicate::ICMP_UGE,
        Predicate::ICMP_ULT,
        Predicate::ICMP_ULE,
        Predicate::ICMP_SGT,
        Predicate::ICMP_SGE,
        Predicate::ICMP_SLT,
        Predicate::ICMP_SLE,
    ];

    /// Logical negation, used for the false successor of a branch.
    /// Floating point negation flips orderedness: `!(a OGT b)` is `a ULE b`.
    pub fn reverse(self) -> Self {
        use Predicate::*;
        match self {
            FCMP_FALSE => FCMP_TRUE,
            FCMP_TRUE => FCMP_FALSE,
            FCMP_OEQ => FCMP_UNE,
            FCMP_UNE => FCMP_OEQ,
            FCMP_OGT => FCMP_ULE,
            FCMP_ULE => FCMP_OGT,
            FCMP_OGE => FCMP_ULT,
            FCMP_ULT => FCMP_OGE,
            FCMP_OLT => FCMP_UGE,
            FCMP_UGE => FCMP_OLT,
            FCMP_OLE => FCMP_UGT,
            FCMP_UGT => FCMP_OLE,
            FCMP_ONE => FCMP_UEQ,
            FCMP_UEQ => FCMP_ONE,
            FCMP_ORD => FCMP_UNO,
            FCMP_UNO => FCMP_ORD,
            ICMP_EQ => ICMP_NE,
            ICMP_NE => ICMP_EQ,
            ICMP_UGT => ICMP_ULE,
            ICMP_ULE => ICMP_UGT,
            ICMP_UGE => ICMP_ULT,
            ICMP_ULT => ICMP_UGE,
            ICMP_SGT => ICMP_SLE,
            ICMP_SLE => ICMP_SGT,
            ICMP_SGE => ICMP_SLT,
            ICMP_SLT => ICMP_SGE,
        }
    }

    /// The predicate `p'` such that `a p b` iff `b p' a`.
    pub fn swap(self) -> Self {
        use Predicate::*;
        match self {
            FCMP_OGT => FCMP_OLT,
            FCMP_OLT => FCMP_OGT,
            FCMP_OGE => FCMP_OLE,
            FCMP_OLE => FCMP_OGE,
            FCMP_UGT => FCMP_ULT,
            FCMP_ULT => FCMP_UGT,
            FCMP_UGE => FCMP_ULE,
            FCMP_ULE => FCMP_UGE,
            ICMP_UGT => ICMP_ULT,
            ICMP_ULT => ICMP_UGT,
            ICMP_UGE => ICMP_ULE,
            ICMP_ULE => ICMP_UGE,
            ICMP_SGT => ICMP_SLT,
            ICMP_SLT => ICMP_SGT,
            ICMP_SGE => ICMP_SLE,
            ICMP_SLE => ICMP_SGE,
            symmetric => symmetric,
        }
    }

    pub fn is_float(self) -> bool {
        !self.is_int()
    }

    pub fn is_int(self) -> bool {
        use Predicate::*;
        matches!(
            self,
            ICMP_EQ
                | ICMP_NE
                | ICMP_UGT
                | ICMP_UGE
                | ICMP_ULT
                | ICMP_ULE
                | ICMP_SGT
                | ICMP_SGE
                | ICMP_SLT
                | ICMP_SLE
        )
    }

    /// Integer predicates interpreting operands as unsigned.
    pub fn is_unsigned(self) -> bool {
        use Predicate::*;
        matches!(self, ICMP_UGT | ICMP_UGE | ICMP_ULT | ICMP_ULE)
    }

    /// Floating point predicates that hold when an operand is NaN.
    pub fn is_unordered(self) -> bool {
        use Predicate::*;
        matches!(
            self,
            FCMP_UNO | FCMP_UEQ | FCMP_UGT | FCMP_UGE | FCMP_ULT | FCMP_ULE | FCMP_UNE | FCMP_TRUE
        )
    }

    pub fn relation(self) -> Relation {
        use Predicate::*;
        match self {
            FCMP_OEQ | FCMP_UEQ | ICMP_EQ => Relation::Eq,
            FCMP_ONE | FCMP_UNE | ICMP_NE => Relation::Ne,
            FCMP_OGT | FCMP_UGT | ICMP_UGT | ICMP_SGT => Relation::Gt,
            FCMP_OGE | FCMP_UGE | ICMP_UGE | ICMP_SGE => Relation::Ge,
            FCMP_OLT | FCMP_ULT | ICMP_ULT | ICMP_SLT => Relation::Lt,
            FCMP_OLE | FCMP_ULE | ICMP_ULE | ICMP_SLE => Relation::Le,
            FCMP_TRUE | FCMP_ORD | FCMP_UNO => Relation::Always,
            FCMP_FALSE => Relation::Never,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
