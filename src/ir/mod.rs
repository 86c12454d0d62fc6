/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! In-memory program representation consumed by the abstract interpreter.

mod builder;
mod callgraph;
mod icfg;
mod predicate;
mod statement;

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

pub use builder::*;
pub use callgraph::*;
pub use icfg::*;
pub use predicate::*;
pub use statement::*;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            pub fn new(index: u32) -> Self {
                Self(index)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// An ICFG node.
    NodeId,
    "n"
);
define_id!(
    /// An ICFG edge.
    EdgeId,
    "e"
);
define_id!(
    /// A top-level (SSA) variable.
    VarId,
    "%"
);
define_id!(
    /// An abstract memory object.
    ObjId,
    "o"
);
define_id!(
    /// A function, defined or external.
    FunId,
    "f"
);

/// Structured source location attached to nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
    pub column: Option<u32>,
}

impl SourceLoc {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column: None,
        }
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }

    pub fn matches(&self, file: &str, line: u32) -> bool {
        self.line == line && self.file == file
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(column) => write!(f, "{}:{}:{}", self.file, self.line, column),
            None => write!(f, "{}:{}", self.file, self.line),
        }
    }
}

/// What a variable denotes. Constants are variables too, so every operand
/// is a `VarId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Value,
    ConstInt(i64),
    ConstBool(bool),
    NullPtr,
    /// Address of a function, used as an indirect call target.
    Function(FunId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarInfo {
    pub name: String,
    pub kind: VarKind,
    /// Bit width of integer values, 64 when unknown.
    pub bits: u32,
    pub is_pointer: bool,
}

impl VarInfo {
    pub fn is_constant(&self) -> bool {
        !matches!(self.kind, VarKind::Value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjKind {
    /// Target of the null pointer constant.
    Null,
    Stack,
    Global,
    Heap,
    Function(FunId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemObj {
    pub name: String,
    pub kind: ObjKind,
    /// Static size in bytes, `None` when only known at the allocation site.
    pub byte_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// Entry and exit nodes, absent for declarations.
    pub entry: Option<NodeId>,
    pub exit: Option<NodeId>,
    pub formals: Vec<VarId>,
    /// Variable holding the return value at the exit node.
    pub ret: Option<VarId>,
    /// Object whose address is taken to form function pointers.
    pub obj: ObjId,
}

impl Function {
    pub fn has_body(&self) -> bool {
        self.entry.is_some()
    }
}
