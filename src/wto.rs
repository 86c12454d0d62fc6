/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::graph::SuccessorNodes;

/*
 * Weak topological ordering of a rooted graph, computed with the recursive
 * algorithm from:
 *
 *   F. Bourdoncle. Efficient chaotic iteration strategies with widenings.
 *   In Formal Methods in Programming and Their Applications, pp 128-141.
 *
 * A WTO is a sequence of components. A component is either a single vertex
 * or a cycle made of a head followed by nested components. Every back edge of
 * the graph targets the head of an enclosing cycle, so iterating the
 * components in order and stabilizing each cycle at its head computes a
 * fixpoint. Nodes unreachable from the root are absent.
 */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WtoComponent<N> {
    Vertex(N),
    Cycle(WtoCycle<N>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WtoCycle<N> {
    head: N,
    components: Vec<WtoComponent<N>>,
}

impl<N: Copy> WtoCycle<N> {
    pub fn head(&self) -> N {
        self.head
    }

    /// Components nested in the cycle, the head excluded.
    pub fn components(&self) -> &[WtoComponent<N>] {
        &self.components
    }
}

impl<N: Copy> WtoComponent<N> {
    /// The first node of the component: the vertex itself or the cycle head.
    pub fn node(&self) -> N {
        match self {
            WtoComponent::Vertex(n) => *n,
            WtoComponent::Cycle(cycle) => cycle.head,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wto<N> {
    components: Vec<WtoComponent<N>>,
}

const VISITED: u32 = u32::MAX;

struct WtoBuilder<'g, N, G> {
    graph: &'g G,
    dfn: HashMap<N, u32>,
    stack: Vec<N>,
    num: u32,
}

impl<'g, N, G> WtoBuilder<'g, N, G>
where
    N: Copy + Hash + Eq,
    G: SuccessorNodes<NodeId = N>,
{
    fn dfn(&self, n: N) -> u32 {
        self.dfn.get(&n).copied().unwrap_or(0)
    }

    fn visit(&mut self, v: N, partition: &mut Vec<WtoComponent<N>>) -> u32 {
        self.stack.push(v);
        self.num += 1;
        self.dfn.insert(v, self.num);
        let mut head = self.num;
        let mut is_loop = false;

        for w in self.graph.get_succ_nodes(v) {
            let min = match self.dfn(w) {
                0 => self.visit(w, partition),
                n => n,
            };
            if min <= head {
                head = min;
                is_loop = true;
            }
        }

        if head == self.dfn(v) {
            self.dfn.insert(v, VISITED);
            let mut element = self.stack.pop();
            if is_loop {
                while let Some(e) = element {
                    if e == v {
                        break;
                    }
                    self.dfn.insert(e, 0);
                    element = self.stack.pop();
                }
                partition.push(self.component(v));
            } else {
                partition.push(WtoComponent::Vertex(v));
            }
        }
        head
    }

    fn component(&mut self, v: N) -> WtoComponent<N> {
        let mut partition = Vec::new();
        for w in self.graph.get_succ_nodes(v) {
            if self.dfn(w) == 0 {
                self.visit(w, &mut partition);
            }
        }
        // Components are completed in reverse topological order.
        partition.reverse();
        WtoComponent::Cycle(WtoCycle {
            head: v,
            components: partition,
        })
    }
}

impl<N> Wto<N>
where
    N: Copy + Hash + Eq,
{
    pub fn new<G>(entry: N, graph: &G) -> Self
    where
        G: SuccessorNodes<NodeId = N>,
    {
        let mut builder = WtoBuilder {
            graph,
            dfn: HashMap::new(),
            stack: Vec::new(),
            num: 0,
        };
        let mut components = Vec::new();
        builder.visit(entry, &mut components);
        components.reverse();
        Self { components }
    }

    pub fn components(&self) -> &[WtoComponent<N>] {
        &self.components
    }

    /// Every node in iteration order, cycle heads included once.
    pub fn nodes(&self) -> Vec<N> {
        fn collect<N: Copy>(components: &[WtoComponent<N>], out: &mut Vec<N>) {
            for component in components {
                match component {
                    WtoComponent::Vertex(n) => out.push(*n),
                    WtoComponent::Cycle(cycle) => {
                        out.push(cycle.head);
                        collect(&cycle.components, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.components, &mut out);
        out
    }

    /// Heads of every cycle, outermost first.
    pub fn heads(&self) -> Vec<N> {
        fn collect<N: Copy>(components: &[WtoComponent<N>], out: &mut Vec<N>) {
            for component in components {
                if let WtoComponent::Cycle(cycle) = component {
                    out.push(cycle.head);
                    collect(&cycle.components, out);
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.components, &mut out);
        out
    }
}

fn fmt_components<N: fmt::Display>(
    components: &[WtoComponent<N>],
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    for (i, component) in components.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        match component {
            WtoComponent::Vertex(n) => write!(f, "{}", n)?,
            WtoComponent::Cycle(cycle) => {
                write!(f, "({}", cycle.head)?;
                if !cycle.components.is_empty() {
                    write!(f, " ")?;
                    fmt_components(&cycle.components, f)?;
                }
                write!(f, ")")?;
            }
        }
    }
    Ok(())
}

/// Prints the WTO in Bourdoncle's notation, e.g. `1 2 (3 4 (5 6) 7) 8`.
impl<N: fmt::Display> fmt::Display for Wto<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_components(&self.components, f)
    }
}
