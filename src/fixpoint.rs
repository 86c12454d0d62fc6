/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;
use std::hash::Hash;

use log::warn;

use crate::datatype::AbstractDomain;
use crate::options::AnalysisOptions;

/// Iteration counters of cycle heads. Local counters restart every time a
/// cycle is entered, global ones accumulate over the whole analysis.
pub struct FixpointIteratorContext<N: Copy + Hash + Eq> {
    local_iterations: HashMap<N, u32>,
    global_iterations: HashMap<N, u32>,
}

impl<N: Copy + Hash + Eq> Default for FixpointIteratorContext<N> {
    fn default() -> Self {
        Self {
            local_iterations: HashMap::new(),
            global_iterations: HashMap::new(),
        }
    }
}

impl<N: Copy + Hash + Eq> FixpointIteratorContext<N> {
    pub fn get_local_iterations_for(&self, n: N) -> u32 {
        *self.local_iterations.get(&n).unwrap_or(&0)
    }

    pub fn get_global_iterations_for(&self, n: N) -> u32 {
        *self.global_iterations.get(&n).unwrap_or(&0)
    }

    pub fn increase_iteration_count_for(&mut self, n: N) {
        *self.local_iterations.entry(n).or_default() += 1;
        *self.global_iterations.entry(n).or_default() += 1;
    }

    pub fn reset_local_iteration_count_for(&mut self, n: N) {
        self.local_iterations.insert(n, 0);
    }

    /// Sum of every head's iterations.
    pub fn total_iterations(&self) -> u64 {
        self.global_iterations.values().map(|&n| n as u64).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Widening until the head state stops growing.
    Ascending,
    /// Narrowing to recover precision lost by widening.
    Descending,
}

/// What the traversal does after the head state has been updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStep<D> {
    /// Store the state at the head and re-run the cycle body.
    Body(D),
    /// Store the state at the head and recompute the head only.
    Head(D),
    /// Store the state at the head and leave the cycle.
    Done(D),
}

/// Per-entry progress of one cycle.
#[derive(Debug, Clone)]
pub struct CycleProgress {
    iteration: u32,
    narrowing_passes: u32,
    phase: Phase,
}

impl Default for CycleProgress {
    fn default() -> Self {
        Self {
            iteration: 0,
            narrowing_passes: 0,
            phase: Phase::Ascending,
        }
    }
}

impl CycleProgress {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }
}

/// Bounded widening and narrowing applied at cycle heads.
///
/// The first `widen_delay` iterations keep the merged state as is. The head
/// is then widened with every new state until it is stable, and narrowed
/// for at most `narrowing_passes` iterations. After `max_cycle_iterations`
/// ascending iterations without stabilization the head is set to top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtrapolationPolicy {
    pub widen_delay: u32,
    pub narrowing_passes: u32,
    pub max_cycle_iterations: u32,
}

impl From<&AnalysisOptions> for ExtrapolationPolicy {
    fn from(options: &AnalysisOptions) -> Self {
        Self {
            widen_delay: options.widen_delay,
            narrowing_passes: options.narrowing_passes,
            max_cycle_iterations: options.max_cycle_iterations,
        }
    }
}

impl Default for ExtrapolationPolicy {
    fn default() -> Self {
        Self::from(&AnalysisOptions::default())
    }
}

impl ExtrapolationPolicy {
    /// Combines the head state of the previous iteration with the freshly
    /// merged one.
    pub fn extrapolate<D: AbstractDomain>(
        &self,
        progress: &mut CycleProgress,
        previous: Option<D>,
        current: D,
    ) -> CycleStep<D> {
        let previous = match previous {
            Some(previous) if progress.iteration >= self.widen_delay => previous,
            _ => {
                progress.iteration += 1;
                return CycleStep::Body(current);
            }
        };

        match progress.phase {
            Phase::Ascending => {
                if progress.iteration >= self.max_cycle_iterations {
                    warn!(
                        "Cycle did not stabilize after {} iterations, giving up on its head",
                        progress.iteration
                    );
                    return CycleStep::Done(D::top());
                }
                let widened = previous.clone().widen(current);
                if widened == previous {
                    if self.narrowing_passes == 0 {
                        return CycleStep::Done(widened);
                    }
                    progress.phase = Phase::Descending;
                    return CycleStep::Head(widened);
                }
                progress.iteration += 1;
                CycleStep::Body(widened)
            }
            Phase::Descending => {
                let narrowed = previous.clone().narrow(current);
                progress.narrowing_passes += 1;
                if narrowed == previous || progress.narrowing_passes >= self.narrowing_passes {
                    return CycleStep::Done(narrowed);
                }
                progress.iteration += 1;
                CycleStep::Body(narrowed)
            }
        }
    }
}
