/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use serde::Deserialize;
use serde::Serialize;

use crate::ir::NodeId;
use crate::ir::ObjId;
use crate::ir::Predicate;
use crate::ir::VarId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyKind {
    Value,
    /// Zero extension from the given source width.
    ZExt(u32),
    SExt,
    /// Truncation to the given target width.
    Trunc(u32),
    FpToInt,
    IntToFp,
    PtrToInt,
    IntToPtr,
    BitCast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOpKind {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOpKind {
    Neg,
    Not,
    FNeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GepIndex {
    Const(i64),
    Var(VarId),
}

/// The statements of a node. Each variant carries exactly the operands its
/// transfer function reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    /// `lhs = &obj`. `size` holds the byte size of a dynamically sized
    /// allocation.
    Addr {
        lhs: VarId,
        obj: ObjId,
        size: Option<VarId>,
    },
    Copy {
        lhs: VarId,
        rhs: VarId,
        kind: CopyKind,
    },
    /// `lhs = base + index * elem_bytes`.
    Gep {
        lhs: VarId,
        base: VarId,
        index: GepIndex,
        elem_bytes: i64,
    },
    /// `lhs = *ptr`
    Load { lhs: VarId, ptr: VarId },
    /// `*ptr = value`
    Store { ptr: VarId, value: VarId },
    /// Actual to formal parameter binding, only for `call_site`.
    CallPe {
        formal: VarId,
        actual: VarId,
        call_site: NodeId,
    },
    /// Callee return value to the call result, only for `call_site`.
    RetPe {
        actual: VarId,
        formal: VarId,
        call_site: NodeId,
    },
    Cmp {
        res: VarId,
        lhs: VarId,
        rhs: VarId,
        pred: Predicate,
    },
    BinaryOp {
        res: VarId,
        lhs: VarId,
        rhs: VarId,
        op: BinaryOpKind,
    },
    UnaryOp {
        res: VarId,
        operand: VarId,
        op: UnaryOpKind,
    },
    Branch {
        cond: Option<VarId>,
        successors: Vec<NodeId>,
    },
    Select {
        res: VarId,
        cond: VarId,
        if_true: VarId,
        if_false: VarId,
    },
    /// One operand per incoming predecessor node.
    Phi {
        res: VarId,
        operands: Vec<(VarId, NodeId)>,
    },
    /// Thread creation: the routine's formal receives `actual`.
    ThreadFork {
        formal: VarId,
        actual: VarId,
        call_site: NodeId,
    },
    /// Thread join: `actual` receives the routine's result.
    ThreadJoin {
        actual: VarId,
        formal: VarId,
        call_site: NodeId,
    },
}

impl Statement {
    /// The variable the statement defines, if any.
    pub fn def(&self) -> Option<VarId> {
        match self {
            Statement::Addr { lhs, .. }
            | Statement::Copy { lhs, .. }
            | Statement::Gep { lhs, .. }
            | Statement::Load { lhs, .. } => Some(*lhs),
            Statement::CallPe { formal, .. } | Statement::ThreadFork { formal, .. } => {
                Some(*formal)
            }
            Statement::RetPe { actual, .. } | Statement::ThreadJoin { actual, .. } => {
                Some(*actual)
            }
            Statement::Cmp { res, .. }
            | Statement::BinaryOp { res, .. }
            | Statement::UnaryOp { res, .. }
            | Statement::Select { res, .. }
            | Statement::Phi { res, .. } => Some(*res),
            Statement::Store { .. } | Statement::Branch { .. } => None,
        }
    }

    /// Every variable the statement reads.
    pub fn uses(&self) -> Vec<VarId> {
        match self {
            Statement::Addr { size, .. } => size.iter().copied().collect(),
            Statement::Copy { rhs, .. } => vec![*rhs],
            Statement::Gep { base, index, .. } => match index {
                GepIndex::Var(index) => vec![*base, *index],
                GepIndex::Const(_) => vec![*base],
            },
            Statement::Load { ptr, .. } => vec![*ptr],
            Statement::Store { ptr, value } => vec![*ptr, *value],
            Statement::CallPe { actual, .. } | Statement::ThreadFork { actual, .. } => {
                vec![*actual]
            }
            Statement::RetPe { formal, .. } | Statement::ThreadJoin { formal, .. } => {
                vec![*formal]
            }
            Statement::Cmp { lhs, rhs, .. } | Statement::BinaryOp { lhs, rhs, .. } => {
                vec![*lhs, *rhs]
            }
            Statement::UnaryOp { operand, .. } => vec![*operand],
            Statement::Branch { cond, .. } => cond.iter().copied().collect(),
            Statement::Select {
                cond,
                if_true,
                if_false,
                ..
            } => vec![*cond, *if_true, *if_false],
            Statement::Phi { operands, .. } => operands.iter().map(|(var, _)| *var).collect(),
        }
    }

    /// Nodes referenced by the statement.
    pub fn referenced_nodes(&self) -> Vec<NodeId> {
        match self {
            Statement::CallPe { call_site, .. }
            | Statement::RetPe { call_site, .. }
            | Statement::ThreadFork { call_site, .. }
            | Statement::ThreadJoin { call_site, .. } => vec![*call_site],
            Statement::Branch { successors, .. } => successors.clone(),
            Statement::Phi { operands, .. } => operands.iter().map(|(_, node)| *node).collect(),
            _ => Vec::new(),
        }
    }
}
