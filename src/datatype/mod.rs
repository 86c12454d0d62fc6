/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

mod abstract_domain;
mod abstract_environment;
mod abstract_state;
mod abstract_value;
mod address;
mod interval;

pub use abstract_domain::*;
pub use abstract_environment::*;
pub use abstract_state::*;
pub use abstract_value::*;
pub use address::*;
pub use interval::*;

extern crate aexec_proc_macros;
pub use aexec_proc_macros::DisjointUnion;
