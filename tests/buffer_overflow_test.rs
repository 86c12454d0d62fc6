/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

mod common;

use aexec::ae::BugKind;
use aexec::ae::CheckpointVerdict;
use aexec::ae::SAFE_BUFACCESS;
use aexec::ae::UNSAFE_BUFACCESS;
use aexec::ir::BinaryOpKind;
use aexec::ir::BranchCondition;
use aexec::ir::Callee;
use aexec::ir::GepIndex;
use aexec::ir::IcfgBuilder;
use aexec::ir::NodeId;
use aexec::ir::ObjKind;
use aexec::ir::Predicate;
use aexec::ir::Statement;
use common::program::*;
use test_log::test;

struct Access {
    gep: NodeId,
    checkpoint: NodeId,
}

/// ```c
/// int buf[10];
/// int x;
/// set_value(x, lb, ub);        // line 4
/// if (x > 0) {
///     buf[x] = 0;              // line 5
///     checkpoint(&buf[x], 4);  // line 6
/// }
/// ```
fn indexed_store(b: &mut IcfgBuilder, lb: i64, ub: i64, checkpoint: &str) -> Access {
    let main = b.define_function("main", vec![], None);
    let set_value = b.declare_function("set_value");
    let stub = b.declare_function(checkpoint);
    let buf = b.object("buf", ObjKind::Stack, Some(40));
    let p = b.ptr_var("p");
    let q = b.ptr_var("q");
    let x = b.var("x");
    let cond = b.var("cond");
    let lb = b.const_int(lb);
    let ub = b.const_int(ub);
    let zero = b.const_int(0);
    let four = b.const_int(4);
    let alloc = b.node(
        main.id,
        vec![Statement::Addr {
            lhs: p,
            obj: buf,
            size: None,
        }],
    );
    let set = b.call(main.id, Callee::Direct(set_value), vec![x, lb, ub], None, Some(loc(4)));
    let test = b.node(
        main.id,
        vec![Statement::Cmp {
            res: cond,
            lhs: x,
            rhs: zero,
            pred: Predicate::ICMP_SGT,
        }],
    );
    let gep = b.node_at(
        main.id,
        vec![
            Statement::Gep {
                lhs: q,
                base: p,
                index: GepIndex::Var(x),
                elem_bytes: 4,
            },
            Statement::Store { ptr: q, value: zero },
        ],
        loc(5),
    );
    let check = b.call(main.id, Callee::Direct(stub), vec![q, four], None, Some(loc(6)));
    chain(b, &[main.entry, alloc, set.call]);
    chain(b, &[set.ret, test]);
    b.cond_edge(test, gep, BranchCondition::Bool { cond, value: true });
    b.cond_edge(test, main.exit, BranchCondition::Bool { cond, value: false });
    chain(b, &[gep, check.call]);
    chain(b, &[check.ret, main.exit]);
    Access {
        gep,
        checkpoint: check.call,
    }
}

#[test]
fn test_out_of_bounds_index_is_reported() {
    let mut b = IcfgBuilder::new();
    let access = indexed_store(&mut b, 1, 100, UNSAFE_BUFACCESS);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    let bugs = ae.report().at(FILE, 5);
    assert_eq!(bugs.len(), 1);
    assert_eq!(bugs[0].kind, BugKind::BufferOverflow);
    assert_eq!(bugs[0].node, access.gep);
    assert_eq!(bugs[0].function.as_deref(), Some("main"));
    assert!(ae.report().contains(access.gep, BugKind::BufferOverflow));
    assert_eq!(
        ae.checkpoint_verdicts().get(&access.checkpoint),
        Some(&CheckpointVerdict::Confirmed)
    );
}

#[test]
fn test_in_bounds_index_is_not_reported() {
    let mut b = IcfgBuilder::new();
    let access = indexed_store(&mut b, 1, 5, SAFE_BUFACCESS);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert!(ae.report().is_empty());
    assert_eq!(
        ae.checkpoint_verdicts().get(&access.checkpoint),
        Some(&CheckpointVerdict::Confirmed)
    );
}

#[test]
fn test_wrong_claim_is_violated() {
    let mut b = IcfgBuilder::new();
    let access = indexed_store(&mut b, -3, 9, UNSAFE_BUFACCESS);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert!(ae.report().is_empty());
    assert_eq!(
        ae.checkpoint_verdicts().get(&access.checkpoint),
        Some(&CheckpointVerdict::Violated)
    );
}

#[test]
fn test_unreached_checkpoint_is_unresolved() {
    let mut b = IcfgBuilder::new();
    let main = b.define_function("main", vec![], None);
    let abort = b.declare_function("abort");
    let stub = b.declare_function(SAFE_BUFACCESS);
    let p = b.ptr_var("p");
    let four = b.const_int(4);
    let stop = b.call(main.id, Callee::Direct(abort), vec![], None, None);
    let check = b.call(main.id, Callee::Direct(stub), vec![p, four], None, None);
    chain(&mut b, &[main.entry, stop.call]);
    chain(&mut b, &[stop.ret, check.call]);
    chain(&mut b, &[check.ret, main.exit]);
    let icfg = b.finish().unwrap();

    let mut ae = aexec::AbstractInterpretation::new(&icfg, aexec::AnalysisOptions::default());
    ae.add_detector(Box::new(aexec::ae::BufOverflowDetector::new()));
    let summary = ae.analyse().unwrap();
    assert_eq!(summary.unresolved_checkpoints, vec![check.call]);
    assert!(summary.checkpoints.is_empty());
}

/// ```c
/// int buf[10];
/// for (i = 0; i <= bound; i++)
///     buf[i] = 0;         // line 8
/// ```
fn filling_loop(b: &mut IcfgBuilder, pred: Predicate) -> NodeId {
    let main = b.define_function("main", vec![], None);
    let buf = b.object("buf", ObjKind::Stack, Some(40));
    let p = b.ptr_var("p");
    let q = b.ptr_var("q");
    let i = b.var("i");
    let next = b.var("i.next");
    let cond = b.var("cond");
    let zero = b.const_int(0);
    let one = b.const_int(1);
    let ten = b.const_int(10);
    let init = b.node(
        main.id,
        vec![Statement::Addr {
            lhs: p,
            obj: buf,
            size: None,
        }],
    );
    let head = b.node(main.id, vec![]);
    let body = b.node_at(
        main.id,
        vec![
            Statement::Gep {
                lhs: q,
                base: p,
                index: GepIndex::Var(i),
                elem_bytes: 4,
            },
            Statement::Store { ptr: q, value: zero },
            Statement::BinaryOp {
                res: next,
                lhs: i,
                rhs: one,
                op: BinaryOpKind::Add,
            },
        ],
        loc(8),
    );
    b.push_stmt(
        head,
        Statement::Phi {
            res: i,
            operands: vec![(zero, init), (next, body)],
        },
    );
    b.push_stmt(
        head,
        Statement::Cmp {
            res: cond,
            lhs: i,
            rhs: ten,
            pred,
        },
    );
    chain(b, &[main.entry, init, head]);
    b.cond_edge(head, body, BranchCondition::Bool { cond, value: true });
    b.edge(body, head);
    b.cond_edge(head, main.exit, BranchCondition::Bool { cond, value: false });
    body
}

#[test]
fn test_off_by_one_loop_is_reported() {
    let mut b = IcfgBuilder::new();
    let body = filling_loop(&mut b, Predicate::ICMP_SLE);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert_eq!(ae.report().len(), 1);
    assert!(ae.report().contains(body, BugKind::BufferOverflow));
}

#[test]
fn test_bounded_loop_is_safe() {
    let mut b = IcfgBuilder::new();
    filling_loop(&mut b, Predicate::ICMP_SLT);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert!(ae.report().is_empty(), "{}", ae.report());
}

#[test]
fn test_heap_object_uses_allocation_size() {
    // char *m = malloc(16); m[16] = 0;
    let mut b = IcfgBuilder::new();
    let main = b.define_function("main", vec![], None);
    let malloc = b.declare_function("malloc");
    let heap = b.object("malloc@3", ObjKind::Heap, None);
    let m = b.ptr_var("m");
    let e = b.ptr_var("e");
    let sixteen = b.const_int(16);
    let zero = b.const_int(0);
    let call = b.call(main.id, Callee::Direct(malloc), vec![sixteen], Some(m), Some(loc(3)));
    b.push_stmt(
        call.call,
        Statement::Addr {
            lhs: m,
            obj: heap,
            size: Some(sixteen),
        },
    );
    let write = b.node_at(
        main.id,
        vec![
            Statement::Gep {
                lhs: e,
                base: m,
                index: GepIndex::Const(16),
                elem_bytes: 1,
            },
            Statement::Store { ptr: e, value: zero },
        ],
        loc(4),
    );
    chain(&mut b, &[main.entry, call.call]);
    chain(&mut b, &[call.ret, write, main.exit]);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert_eq!(ae.report().at(FILE, 4).len(), 1);
    assert!(ae.report().at(FILE, 3).is_empty());
}

#[test]
fn test_bulk_write_past_the_end() {
    // char buf[40]; memset(buf, 0, 64);
    let mut b = IcfgBuilder::new();
    let main = b.define_function("main", vec![], None);
    let memset = b.declare_function("memset");
    let buf = b.object("buf", ObjKind::Stack, Some(40));
    let p = b.ptr_var("p");
    let zero = b.const_int(0);
    let len = b.const_int(64);
    let alloc = b.node(
        main.id,
        vec![Statement::Addr {
            lhs: p,
            obj: buf,
            size: None,
        }],
    );
    let call = b.call(main.id, Callee::Direct(memset), vec![p, zero, len], None, Some(loc(7)));
    chain(&mut b, &[main.entry, alloc, call.call]);
    chain(&mut b, &[call.ret, main.exit]);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    let bugs = ae.report().at(FILE, 7);
    assert_eq!(bugs.len(), 1);
    assert_eq!(bugs[0].node, call.call);
}
