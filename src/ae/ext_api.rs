/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Semantics of functions without a body, looked up by name.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::trace;

use crate::ae::transfer::value_of;
use crate::datatype::AbstractDomain;
use crate::datatype::AbstractState;
use crate::datatype::AbstractValue;
use crate::datatype::Address;
use crate::datatype::Field;
use crate::datatype::IntervalValue;
use crate::error::Inconsistency;
use crate::ir::CallSite;
use crate::ir::Icfg;
use crate::ir::IcfgNode;
use crate::ir::Statement;
use crate::ir::VarId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtOutcome {
    Returns,
    /// Control never comes back to the caller.
    NoReturn,
}

/// A call to an external function, as seen by its handler.
pub struct ExtCall<'c> {
    pub icfg: &'c Icfg,
    pub node: &'c IcfgNode,
    pub site: &'c CallSite,
    pub callee: &'c str,
}

impl<'c> ExtCall<'c> {
    pub fn arg_count(&self) -> usize {
        self.site.args.len()
    }

    pub fn arg_var(&self, index: usize) -> Option<VarId> {
        self.site.args.get(index).copied()
    }

    /// Value of the `index`-th argument, top when the call has fewer
    /// arguments.
    pub fn arg(&self, state: &AbstractState, index: usize) -> Result<AbstractValue, Inconsistency> {
        match self.arg_var(index) {
            Some(var) => value_of(self.icfg, state, var),
            None => Ok(AbstractValue::top()),
        }
    }

    pub fn set_ret(&self, state: &mut AbstractState, value: AbstractValue) {
        if let Some(ret) = self.site.ret_var {
            state.set_var(ret, value);
        }
    }

    /// True when the call node itself binds the result to a fresh object,
    /// which is how allocation sites are represented.
    pub fn allocates(&self) -> bool {
        let ret = match self.site.ret_var {
            Some(ret) => ret,
            None => return false,
        };
        self.node
            .stmts
            .iter()
            .any(|stmt| matches!(stmt, Statement::Addr { lhs, .. } if *lhs == ret))
    }
}

pub type ExtHandler =
    Rc<dyn Fn(&ExtCall<'_>, &mut AbstractState) -> Result<ExtOutcome, Inconsistency>>;

/// Name to handler table consulted for every call to a function without a
/// body. Unknown names get the conservative default effect.
#[derive(Clone)]
pub struct ExtApiRegistry {
    handlers: HashMap<String, ExtHandler>,
}

impl Default for ExtApiRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for ExtApiRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

impl ExtApiRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("set_value", set_value);
        registry.register("nondet", nondet);
        registry.register("strlen", strlen);
        for name in ["exit", "_exit", "abort", "__assert_fail"] {
            registry.register(name, |_, _| Ok(ExtOutcome::NoReturn));
        }
        for name in ["malloc", "calloc", "realloc", "alloca"] {
            registry.register(name, allocate);
        }
        for name in ["memcpy", "memmove"] {
            registry.register(name, memcpy);
        }
        registry.register("memset", memset);
        registry
    }

    /// Adds or replaces the handler of `name`.
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&ExtCall<'_>, &mut AbstractState) -> Result<ExtOutcome, Inconsistency> + 'static,
    {
        self.handlers.insert(name.to_owned(), Rc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<ExtHandler> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the handler of the callee, or the default effect when none is
    /// registered.
    pub fn apply(
        &self,
        call: &ExtCall<'_>,
        state: &mut AbstractState,
    ) -> Result<ExtOutcome, Inconsistency> {
        match self.get(call.callee) {
            Some(handler) => handler(call, state),
            None => {
                trace!("no model for {}, using the default effect", call.callee);
                apply_default(call, state)?;
                Ok(ExtOutcome::Returns)
            }
        }
    }
}

/// Effect of an unknown function: the result is unknown and so is every
/// object reachable from a pointer argument. A pointer argument whose
/// targets are unknown forgets the whole memory.
pub fn apply_default(call: &ExtCall<'_>, state: &mut AbstractState) -> Result<(), Inconsistency> {
    for index in 0..call.arg_count() {
        let var = match call.arg_var(index) {
            Some(var) => var,
            None => continue,
        };
        let arg = call.arg(state, index)?;
        if call.icfg.var(var)?.is_pointer || arg.is_address() {
            state.havoc_pointees(&arg);
        }
    }
    call.set_ret(state, AbstractValue::top());
    Ok(())
}

fn range_of(lb: &AbstractValue, ub: &AbstractValue) -> IntervalValue {
    IntervalValue::new(lb.interval().lb(), ub.interval().ub())
}

/// `set_value(x, lb, ub)`: the value behind the pointer `x`, or the variable
/// `x` itself, is in `[lb, ub]`.
fn set_value(call: &ExtCall<'_>, state: &mut AbstractState) -> Result<ExtOutcome, Inconsistency> {
    let range = range_of(&call.arg(state, 1)?, &call.arg(state, 2)?);
    let target = call.arg(state, 0)?;
    if target.is_address() {
        state.store(&target, range.into());
    } else if let Some(var) = call.arg_var(0) {
        if !call.icfg.var(var)?.is_constant() {
            state.set_var(var, range.into());
        }
    }
    Ok(ExtOutcome::Returns)
}

/// `nondet()` is any integer, `nondet(lb, ub)` one in `[lb, ub]`.
fn nondet(call: &ExtCall<'_>, state: &mut AbstractState) -> Result<ExtOutcome, Inconsistency> {
    let value = if call.arg_count() >= 2 {
        range_of(&call.arg(state, 0)?, &call.arg(state, 1)?)
    } else {
        IntervalValue::top()
    };
    call.set_ret(state, value.into());
    Ok(ExtOutcome::Returns)
}

fn strlen(call: &ExtCall<'_>, state: &mut AbstractState) -> Result<ExtOutcome, Inconsistency> {
    call.set_ret(state, IntervalValue::non_negative().into());
    Ok(ExtOutcome::Returns)
}

/// The allocated address is bound by the call node itself, only calls
/// without such a binding get an unknown result.
fn allocate(call: &ExtCall<'_>, state: &mut AbstractState) -> Result<ExtOutcome, Inconsistency> {
    if !call.allocates() {
        call.set_ret(state, AbstractValue::top());
    }
    if call.callee == "realloc" {
        let old = call.arg(state, 0)?;
        state.havoc_pointees(&old);
    }
    Ok(ExtOutcome::Returns)
}

/// Copies the cells of a single exact source range to a single exact
/// destination. Anything less precise forgets the destination object.
fn memcpy(call: &ExtCall<'_>, state: &mut AbstractState) -> Result<ExtOutcome, Inconsistency> {
    let dst = call.arg(state, 0)?;
    let src = call.arg(state, 1)?;
    let len = call.arg(state, 2)?.interval().numeral();
    let exact = |value: &AbstractValue| {
        value
            .addresses()
            .and_then(|a| a.as_singleton())
            .and_then(|a| match a.field {
                Field::Exact(offset) => Some((a.obj, offset)),
                Field::Summary => None,
            })
    };
    match (exact(&dst), exact(&src), len) {
        (Some((dst_obj, dst_offset)), Some((src_obj, src_offset)), Some(len))
            if len >= 0 && (dst_obj != src_obj || dst_offset == src_offset) =>
        {
            let copied: Vec<(i64, AbstractValue)> = state
                .object_cells(src_obj)
                .filter_map(|(address, value)| match address.field {
                    Field::Exact(offset) if offset >= src_offset && offset - src_offset < len => {
                        Some((offset - src_offset, value.clone()))
                    }
                    _ => None,
                })
                .collect();
            state.havoc_cells(dst_obj, dst_offset, dst_offset.saturating_add(len));
            for (delta, value) in copied {
                state.store_strong(Address::exact(dst_obj, dst_offset + delta), value);
            }
        }
        _ => state.havoc_pointees(&dst),
    }
    call.set_ret(state, dst);
    Ok(ExtOutcome::Returns)
}

fn memset(call: &ExtCall<'_>, state: &mut AbstractState) -> Result<ExtOutcome, Inconsistency> {
    let dst = call.arg(state, 0)?;
    state.havoc_pointees(&dst);
    call.set_ret(state, dst);
    Ok(ExtOutcome::Returns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Callee;
    use crate::ir::IcfgBuilder;
    use crate::ir::ObjKind;

    #[test]
    fn test_builtins_are_registered() {
        let registry = ExtApiRegistry::default();
        for name in ["set_value", "nondet", "exit", "malloc", "memcpy", "memset", "strlen"] {
            assert!(registry.contains(name), "{}", name);
        }
        assert!(!ExtApiRegistry::empty().contains("malloc"));
    }

    #[test]
    fn test_nondet_range_and_default_effect() {
        let mut builder = IcfgBuilder::new();
        let main = builder.define_function("main", vec![], None);
        let nondet = builder.declare_function("nondet");
        let unknown = builder.declare_function("unknown");
        let lb = builder.const_int(3);
        let ub = builder.const_int(7);
        let x = builder.var("x");
        let p = builder.ptr_var("p");
        let y = builder.var("y");
        let first = builder.call(main.id, Callee::Direct(nondet), vec![lb, ub], Some(x), None);
        let second = builder.call(main.id, Callee::Direct(unknown), vec![p], Some(y), None);
        let buf = builder.object("buf", ObjKind::Stack, Some(8));
        let icfg = builder.finish().unwrap();

        let registry = ExtApiRegistry::default();
        let mut state = AbstractState::default();
        let node = icfg.node(first.call).unwrap();
        let call = ExtCall {
            icfg: &icfg,
            node,
            site: node.call_site().unwrap(),
            callee: "nondet",
        };
        assert_eq!(registry.apply(&call, &mut state).unwrap(), ExtOutcome::Returns);
        assert_eq!(state.var(x).interval(), IntervalValue::from_range(3, 7));

        let cell = Address::base(buf);
        state.set_var(p, AbstractValue::from_address(cell));
        state.store_strong(cell, AbstractValue::from(1));
        state.set_var(y, AbstractValue::from(5));
        let node = icfg.node(second.call).unwrap();
        let call = ExtCall {
            icfg: &icfg,
            node,
            site: node.call_site().unwrap(),
            callee: "unknown",
        };
        registry.apply(&call, &mut state).unwrap();
        assert!(state.load_address(cell).is_top());
        assert!(state.var(y).is_top());
    }
}
