/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::error::Result;
use crate::ir::NodeId;
use crate::ir::SourceLoc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BugKind {
    BufferOverflow,
}

impl fmt::Display for BugKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BugKind::BufferOverflow => write!(f, "buffer overflow"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BugEntry {
    pub kind: BugKind,
    pub node: NodeId,
    pub function: Option<String>,
    pub loc: Option<SourceLoc>,
    pub message: String,
}

impl fmt::Display for BugEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.node)?;
        if let Some(loc) = &self.loc {
            write!(f, " ({})", loc)?;
        }
        if let Some(function) = &self.function {
            write!(f, " in {}", function)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Bugs found by the detectors, at most one per node and kind. A node is
/// reported the first time a detector flags it; later visits of the same
/// node during fixpoint iteration add nothing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BugReport {
    entries: Vec<BugEntry>,
    #[serde(skip)]
    seen: HashSet<(NodeId, BugKind)>,
}

impl BugReport {
    /// Returns false when the node already has a report of this kind.
    pub fn add(&mut self, entry: BugEntry) -> bool {
        if !self.seen.insert((entry.node, entry.kind)) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[BugEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, node: NodeId, kind: BugKind) -> bool {
        self.seen.contains(&(node, kind))
    }

    /// Entries whose location is `file:line`.
    pub fn at(&self, file: &str, line: u32) -> Vec<&BugEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.loc.as_ref().map_or(false, |loc| loc.matches(file, line)))
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for BugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}
