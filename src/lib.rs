/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Abstract execution of whole programs over an interprocedural control-flow
//! graph. Functions are traversed in weak topological order with an interval
//! and address-set domain, calls are followed context-sensitively up to
//! recursion, and infeasible branches are pruned through interval reasoning.
//! Detectors observe every node and report bugs such as buffer overflows.

// Lets the `DisjointUnion` derive refer to `::aexec` from inside this crate.
extern crate self as aexec;

pub mod ae;
pub mod datatype;
pub mod error;
pub mod fixpoint;
pub mod graph;
pub mod ir;
pub mod options;
pub mod wto;

pub use ae::AbstractInterpretation;
pub use error::AeError;
pub use options::AnalysisOptions;
