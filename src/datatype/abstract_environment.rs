/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::borrow::Cow;
use std::fmt;

use im::OrdMap;

use crate::datatype::AbstractDomain;

/*
 * An abstract environment maps program entities (variables, memory cells) to
 * elements of a common abstract domain:
 *
 *   {%x -> [-1, 1], %i -> [0, 10], o3+8 -> {o5+0}, ...}
 *
 * This is a non-relational domain: unbound keys are implicitly top, so a
 * join only keeps the keys bound on both sides and binding top to a key
 * removes it. If _|_ appears in a binding then no concrete execution can be
 * described by the environment, hence binding _|_ to a key sets the entire
 * environment to _|_.
 */

pub trait AbstractEnvironment<K, D: AbstractDomain>: AbstractDomain {
    type ContainerType;
    fn bindings(&self) -> Option<&Self::ContainerType>;
    fn into_bindings(self) -> Option<Self::ContainerType>;

    fn len(&self) -> usize;
    fn is_empty(&self) -> bool;
    fn contains(&self, key: &K) -> bool;
    fn get(&self, key: &K) -> Cow<'_, D>;
    fn set(&mut self, key: K, domain: D);
    fn remove(&mut self, key: &K);
    fn update(&mut self, key: &K, op: impl FnOnce(&mut D));
}

/// Environment backed by a persistent ordered map, so that copying a state
/// across an edge is constant time and iteration order is deterministic.
#[derive(Clone, PartialEq, Eq)]
pub enum OrdMapAbstractEnvironment<K: Clone + Ord, D: AbstractDomain> {
    Value(OrdMap<K, D>),
    Bottom,
}

impl<K, D> OrdMapAbstractEnvironment<K, D>
where
    K: Clone + Ord,
    D: AbstractDomain,
{
    pub fn iter(&self) -> impl Iterator<Item = (&K, &D)> {
        self.bindings().into_iter().flat_map(|map| map.iter())
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    /// Bindings whose key lies in `[from, to]`.
    pub fn range(&self, from: &K, to: &K) -> impl Iterator<Item = (&K, &D)> {
        let bounds = from.clone()..=to.clone();
        self.bindings()
            .into_iter()
            .flat_map(move |map| map.range(bounds.clone()))
    }

    /// Weak update: joins `domain` into the current binding of `key`.
    pub fn join_at(&mut self, key: &K, domain: D) {
        self.update(key, |current| current.join_with(domain));
    }

    fn join_like_operation(lhs: &mut Self, rhs: Self, operation: impl Fn(&mut D, D)) {
        use OrdMapAbstractEnvironment::*;

        match (&mut *lhs, rhs) {
            (Value(l_map), Value(r_map)) => {
                let mut joined = OrdMap::new();
                for (r_k, r_v) in r_map.into_iter() {
                    if let Some(mut l_v) = l_map.remove(&r_k) {
                        operation(&mut l_v, r_v);
                        if !l_v.is_top() {
                            joined.insert(r_k, l_v);
                        }
                    }
                }
                *l_map = joined;
            }
            (Bottom, rhs) => *lhs = rhs,
            (_, Bottom) => {}
        }
    }

    fn meet_like_operation(lhs: &mut Self, rhs: Self, operation: impl Fn(&mut D, D)) {
        use OrdMapAbstractEnvironment::*;

        if lhs.is_bottom() {
            return;
        }

        if rhs.is_bottom() {
            *lhs = rhs;
            return;
        }

        let mut met_bottom = false;
        if let (Value(l_map), Value(r_map)) = (&mut *lhs, rhs) {
            for (r_k, r_v) in r_map.into_iter() {
                if let Some(l_v) = l_map.get_mut(&r_k) {
                    operation(l_v, r_v);
                    if l_v.is_bottom() {
                        met_bottom = true;
                        break;
                    }
                } else {
                    // Top is the identity of meet-like operations.
                    l_map.insert(r_k, r_v);
                }
            }
        }
        if met_bottom {
            *lhs = Bottom;
        }
    }
}

impl<K, D> AbstractEnvironment<K, D> for OrdMapAbstractEnvironment<K, D>
where
    K: Clone + Ord,
    D: AbstractDomain,
{
    type ContainerType = OrdMap<K, D>;

    fn bindings(&self) -> Option<&OrdMap<K, D>> {
        match self {
            OrdMapAbstractEnvironment::Value(map) => Some(map),
            _ => None,
        }
    }

    fn into_bindings(self) -> Option<OrdMap<K, D>> {
        match self {
            OrdMapAbstractEnvironment::Value(map) => Some(map),
            _ => None,
        }
    }

    fn len(&self) -> usize {
        self.bindings().map_or(0, |map| map.len())
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, key: &K) -> bool {
        self.bindings().map_or(false, |map| map.contains_key(key))
    }

    fn get(&self, key: &K) -> Cow<'_, D> {
        use OrdMapAbstractEnvironment::*;
        let map = match self {
            Value(map) => map,
            Bottom => return Cow::Owned(D::bottom()),
        };

        match map.get(key) {
            Some(domain) => Cow::Borrowed(domain),
            None => Cow::Owned(D::top()),
        }
    }

    fn set(&mut self, key: K, domain: D) {
        use OrdMapAbstractEnvironment::*;
        if let Value(map) = self {
            if domain.is_top() {
                map.remove(&key);
            } else if domain.is_bottom() {
                *self = Bottom;
            } else {
                map.insert(key, domain);
            }
        }
    }

    fn remove(&mut self, key: &K) {
        if let OrdMapAbstractEnvironment::Value(map) = self {
            map.remove(key);
        }
    }

    fn update(&mut self, key: &K, op: impl FnOnce(&mut D)) {
        use OrdMapAbstractEnvironment::*;

        if let Value(map) = self {
            let mut domain = match map.get(key) {
                Some(domain) => domain.clone(),
                None => D::top(),
            };
            op(&mut domain);
            if domain.is_top() {
                // Use the implicit binding.
                map.remove(key);
            } else if domain.is_bottom() {
                *self = Bottom;
            } else {
                map.insert(key.clone(), domain);
            }
        }
    }
}

impl<K, D> AbstractDomain for OrdMapAbstractEnvironment<K, D>
where
    K: Clone + Ord,
    D: AbstractDomain,
{
    fn bottom() -> Self {
        OrdMapAbstractEnvironment::Bottom
    }

    fn top() -> Self {
        OrdMapAbstractEnvironment::Value(OrdMap::new())
    }

    fn is_bottom(&self) -> bool {
        matches!(self, OrdMapAbstractEnvironment::Bottom)
    }

    fn is_top(&self) -> bool {
        match self {
            OrdMapAbstractEnvironment::Value(map) => map.is_empty(),
            _ => false,
        }
    }

    fn leq(&self, rhs: &Self) -> bool {
        use OrdMapAbstractEnvironment::*;
        match (self, rhs) {
            (Bottom, _) => true,
            (_, Bottom) => false,
            (Value(l_map), Value(r_map)) => {
                if l_map.len() < r_map.len() {
                    // Some key bound in rhs is top in lhs.
                    return false;
                }
                r_map.iter().all(|(r_k, r_v)| match l_map.get(r_k) {
                    Some(l_v) => l_v.leq(r_v),
                    None => false,
                })
            }
        }
    }

    fn join_with(&mut self, rhs: Self) {
        Self::join_like_operation(self, rhs, |d1, d2| d1.join_with(d2));
    }

    fn meet_with(&mut self, rhs: Self) {
        Self::meet_like_operation(self, rhs, |d1, d2| d1.meet_with(d2));
    }

    fn widen_with(&mut self, rhs: Self) {
        Self::join_like_operation(self, rhs, |d1, d2| d1.widen_with(d2));
    }

    fn narrow_with(&mut self, rhs: Self) {
        Self::meet_like_operation(self, rhs, |d1, d2| d1.narrow_with(d2));
    }
}

impl<K, D> fmt::Debug for OrdMapAbstractEnvironment<K, D>
where
    K: Clone + Ord + fmt::Debug,
    D: AbstractDomain + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrdMapAbstractEnvironment::Value(map) => f.debug_map().entries(map.iter()).finish(),
            OrdMapAbstractEnvironment::Bottom => write!(f, "_|_"),
        }
    }
}

impl<K, D> Default for OrdMapAbstractEnvironment<K, D>
where
    K: Clone + Ord,
    D: AbstractDomain,
{
    fn default() -> Self {
        Self::top()
    }
}
