/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Counters collected while the analysis runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AeStats {
    /// Function bodies entered, counting every call context.
    pub functions_traversed: u64,
    /// Node visits, including repeated visits inside cycles.
    pub nodes_analysed: u64,
    pub cycle_iterations: u64,
    /// External, recursive and unresolved calls whose effect was modeled.
    pub calls_skipped: u64,
    /// Largest number of bindings held by a single state.
    pub max_state_size: usize,
    pub elapsed: Duration,
}

impl AeStats {
    pub(crate) fn record_state_size(&mut self, size: usize) {
        self.max_state_size = self.max_state_size.max(size);
    }
}

impl fmt::Display for AeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} functions, {} node visits, {} cycle iterations, {} skipped calls, \
             max state size {}, {:.3}s",
            self.functions_traversed,
            self.nodes_analysed,
            self.cycle_iterations,
            self.calls_skipped,
            self.max_state_size,
            self.elapsed.as_secs_f64()
        )
    }
}
