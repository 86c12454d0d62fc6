/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crate::ir::FunId;
use crate::ir::NodeId;
use crate::ir::ObjId;
use crate::ir::VarId;

/// Violations of invariants a well-formed program and a correct traversal
/// guarantee. They abort the analysis and are not meant to be recovered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Inconsistency {
    #[error("no abstract state recorded for {0}")]
    MissingState(NodeId),
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("unknown variable {0}")]
    UnknownVariable(VarId),
    #[error("unknown function {0}")]
    UnknownFunction(FunId),
    #[error("{0} is not a call site")]
    NotACallSite(NodeId),
    #[error("unknown memory object {0}")]
    UnknownObject(ObjId),
}

#[derive(Debug, thiserror::Error)]
pub enum AeError {
    #[error("internal inconsistency: {0}")]
    Inconsistency(#[from] Inconsistency),
    #[error("invalid analysis options: {0}")]
    Options(#[from] serde_json::Error),
}

pub type Result<T, E = AeError> = std::result::Result<T, E>;
