/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

/// A lattice of abstract values.
///
/// `join` over-approximates control-flow merges, `meet` intersects
/// constraints (branch refinement), `widen` extrapolates growing chains on
/// loop heads and `narrow` recovers precision after widening has stabilized.
/// Every operation has an in-place form which implementors provide and a
/// consuming form which is derived from it.
pub trait AbstractDomain: Clone + Eq {
    fn bottom() -> Self;
    fn top() -> Self;
    fn is_bottom(&self) -> bool;
    fn is_top(&self) -> bool;
    fn leq(&self, rhs: &Self) -> bool;

    fn join(mut self, rhs: Self) -> Self {
        self.join_with(rhs);
        self
    }

    fn meet(mut self, rhs: Self) -> Self {
        self.meet_with(rhs);
        self
    }

    fn widen(mut self, rhs: Self) -> Self {
        self.widen_with(rhs);
        self
    }

    fn narrow(mut self, rhs: Self) -> Self {
        self.narrow_with(rhs);
        self
    }

    /// Join of every element, bottom for an empty iterator.
    fn join_all<I: IntoIterator<Item = Self>>(values: I) -> Self {
        values
            .into_iter()
            .fold(Self::bottom(), |acc, value| acc.join(value))
    }

    fn join_with(&mut self, rhs: Self);
    fn meet_with(&mut self, rhs: Self);
    fn widen_with(&mut self, rhs: Self);
    fn narrow_with(&mut self, rhs: Self);
}
