/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

mod common;

use aexec::datatype::AbstractDomain;
use aexec::datatype::IntervalValue;
use aexec::ir::BinaryOpKind;
use aexec::ir::Callee;
use aexec::ir::FunctionNodes;
use aexec::ir::IcfgBuilder;
use aexec::ir::ObjKind;
use aexec::ir::Statement;
use aexec::ir::VarId;
use aexec::AnalysisOptions;
use common::program::*;
use test_log::test;

/// `int name(int a) { return a + delta; }`
fn define_adder(b: &mut IcfgBuilder, name: &str, delta: i64) -> (FunctionNodes, VarId) {
    let a = b.var(format!("{}.a", name));
    let ret = b.var(format!("{}.ret", name));
    let delta = b.const_int(delta);
    let fun = b.define_function(name, vec![a], Some(ret));
    let body = b.node(
        fun.id,
        vec![Statement::BinaryOp {
            res: ret,
            lhs: a,
            rhs: delta,
            op: BinaryOpKind::Add,
        }],
    );
    chain(b, &[fun.entry, body, fun.exit]);
    (fun, a)
}

#[test]
fn test_direct_call_binds_parameters_and_result() {
    let mut b = IcfgBuilder::new();
    let (inc, formal) = define_adder(&mut b, "inc", 1);
    let main = b.define_function("main", vec![], None);
    let arg = b.const_int(41);
    let r = b.var("r");
    let call = b.call(main.id, Callee::Direct(inc.id), vec![arg], Some(r), None);
    chain(&mut b, &[main.entry, call.call]);
    chain(&mut b, &[call.ret, main.exit]);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert_eq!(interval(&ae, inc.entry, formal), IntervalValue::singleton(41));
    assert_eq!(interval(&ae, call.ret, r), IntervalValue::singleton(42));
    assert_eq!(interval(&ae, main.exit, r), IntervalValue::singleton(42));

    let outcome = ae.call_outcome(call.call).unwrap();
    assert_eq!(outcome.traversed, vec![inc.id]);
    assert!(!outcome.fallthrough);

    let ret_node = icfg.node(call.ret).unwrap();
    assert!(ret_node.stmts.iter().any(|stmt| matches!(
        stmt,
        Statement::RetPe { actual, call_site, .. } if *actual == r && *call_site == call.call
    )));
}

#[test]
fn test_callee_is_analysed_per_call_site() {
    let mut b = IcfgBuilder::new();
    let (inc, _) = define_adder(&mut b, "inc", 1);
    let main = b.define_function("main", vec![], None);
    let one = b.const_int(1);
    let ten = b.const_int(10);
    let r1 = b.var("r1");
    let r2 = b.var("r2");
    let first = b.call(main.id, Callee::Direct(inc.id), vec![one], Some(r1), None);
    let second = b.call(main.id, Callee::Direct(inc.id), vec![ten], Some(r2), None);
    chain(&mut b, &[main.entry, first.call]);
    chain(&mut b, &[first.ret, second.call]);
    chain(&mut b, &[second.ret, main.exit]);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert_eq!(interval(&ae, main.exit, r1), IntervalValue::singleton(2));
    assert_eq!(interval(&ae, main.exit, r2), IntervalValue::singleton(11));
    assert_eq!(ae.stats().functions_traversed, 3);
}

/// `void f(int *q) { *q = 1; f(q); }` called from main on a local.
fn recursive_store_program(b: &mut IcfgBuilder) -> (VarId, FunctionNodes) {
    let q = b.ptr_var("q");
    let one = b.const_int(1);
    let five = b.const_int(5);
    let f = b.define_function("f", vec![q], None);
    let store = b.node(f.id, vec![Statement::Store { ptr: q, value: one }]);
    let inner = b.call(f.id, Callee::Direct(f.id), vec![q], None, None);
    chain(b, &[f.entry, store, inner.call]);
    chain(b, &[inner.ret, f.exit]);

    let main = b.define_function("main", vec![], None);
    let cell = b.object("cell", ObjKind::Stack, Some(4));
    let p = b.ptr_var("p");
    let v = b.var("v");
    let init = b.node(
        main.id,
        vec![
            Statement::Addr {
                lhs: p,
                obj: cell,
                size: None,
            },
            Statement::Store { ptr: p, value: five },
        ],
    );
    let outer = b.call(main.id, Callee::Direct(f.id), vec![p], None, None);
    let load = b.node(main.id, vec![Statement::Load { lhs: v, ptr: p }]);
    chain(b, &[main.entry, init, outer.call]);
    chain(b, &[outer.ret, load, main.exit]);
    (v, main)
}

#[test]
fn test_recursive_call_havocs_written_memory() {
    let mut b = IcfgBuilder::new();
    let (v, main) = recursive_store_program(&mut b);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert!(interval(&ae, main.exit, v).is_top());
    assert_eq!(ae.stats().calls_skipped, 1);
    assert_eq!(ae.stats().functions_traversed, 2);
}

#[test]
fn test_recursive_call_keeps_memory_when_asked() {
    let mut b = IcfgBuilder::new();
    let (v, main) = recursive_store_program(&mut b);
    let icfg = b.finish().unwrap();

    let options = AnalysisOptions {
        skip_recursive_as_top: false,
        ..Default::default()
    };
    let ae = analyse_with(&icfg, options);
    assert_eq!(interval(&ae, main.exit, v), IntervalValue::singleton(1));
}

#[test]
fn test_recursive_result_is_unknown() {
    // int fact(int n) { return fact(n) * n; } called with 3.
    let mut b = IcfgBuilder::new();
    let n = b.var("n");
    let rec = b.var("rec");
    let ret = b.var("ret");
    let fact = b.define_function("fact", vec![n], Some(ret));
    let inner = b.call(fact.id, Callee::Direct(fact.id), vec![n], Some(rec), None);
    let mul = b.node(
        fact.id,
        vec![Statement::BinaryOp {
            res: ret,
            lhs: rec,
            rhs: n,
            op: BinaryOpKind::Mul,
        }],
    );
    chain(&mut b, &[fact.entry, inner.call]);
    chain(&mut b, &[inner.ret, mul, fact.exit]);
    let main = b.define_function("main", vec![], None);
    let three = b.const_int(3);
    let r = b.var("r");
    let outer = b.call(main.id, Callee::Direct(fact.id), vec![three], Some(r), None);
    chain(&mut b, &[main.entry, outer.call]);
    chain(&mut b, &[outer.ret, main.exit]);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert!(interval(&ae, main.exit, r).is_top());
    let skipped = ae.call_outcome(inner.call).unwrap();
    assert!(skipped.traversed.is_empty());
    assert!(skipped.fallthrough);
    assert_eq!(ae.call_outcome(outer.call).unwrap().traversed, vec![fact.id]);
}

#[test]
fn test_mutual_recursion_is_cut_at_the_cycle() {
    // int f(int a) { return g(a); } int g(int b) { return f(b); } r = f(1);
    let mut b = IcfgBuilder::new();
    let a = b.var("a");
    let rf = b.var("rf");
    let f = b.define_function("f", vec![a], Some(rf));
    let b_arg = b.var("b");
    let rg = b.var("rg");
    let g = b.define_function("g", vec![b_arg], Some(rg));
    let f_calls_g = b.call(f.id, Callee::Direct(g.id), vec![a], Some(rf), None);
    chain(&mut b, &[f.entry, f_calls_g.call]);
    chain(&mut b, &[f_calls_g.ret, f.exit]);
    let g_calls_f = b.call(g.id, Callee::Direct(f.id), vec![b_arg], Some(rg), None);
    chain(&mut b, &[g.entry, g_calls_f.call]);
    chain(&mut b, &[g_calls_f.ret, g.exit]);
    let main = b.define_function("main", vec![], None);
    let one = b.const_int(1);
    let r = b.var("r");
    let outer = b.call(main.id, Callee::Direct(f.id), vec![one], Some(r), None);
    chain(&mut b, &[main.entry, outer.call]);
    chain(&mut b, &[outer.ret, main.exit]);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert!(interval(&ae, main.exit, r).is_top());
    assert_eq!(ae.stats().functions_traversed, 2);
    assert_eq!(ae.stats().calls_skipped, 1);
    assert_eq!(ae.call_outcome(outer.call).unwrap().traversed, vec![f.id]);
    let skipped = ae.call_outcome(f_calls_g.call).unwrap();
    assert!(skipped.traversed.is_empty());
    assert!(skipped.fallthrough);
    assert!(ae.state_at_node(g.entry).is_none());
    assert!(ae.call_outcome(g_calls_f.call).is_none());
}

#[test]
fn test_self_call_through_function_pointer_is_recursive() {
    // void f() { void (*p)() = f; p(); } called from main.
    let mut b = IcfgBuilder::new();
    let f = b.define_function("f", vec![], None);
    let p = b.fun_ptr(f.id);
    let inner = b.call(f.id, Callee::Indirect(p), vec![], None, None);
    chain(&mut b, &[f.entry, inner.call]);
    chain(&mut b, &[inner.ret, f.exit]);
    let main = b.define_function("main", vec![], None);
    let outer = b.call(main.id, Callee::Direct(f.id), vec![], None, None);
    chain(&mut b, &[main.entry, outer.call]);
    chain(&mut b, &[outer.ret, main.exit]);
    let icfg = b.finish().unwrap();
    assert!(!icfg.call_graph().is_recursive(f.id));

    let ae = analyse(&icfg);
    assert!(ae.state_at_node(main.exit).is_some());
    let skipped = ae.call_outcome(inner.call).unwrap();
    assert!(skipped.traversed.is_empty());
    assert!(skipped.fallthrough);
    assert_eq!(ae.stats().calls_skipped, 1);
    assert_eq!(ae.stats().functions_traversed, 2);
}

#[test]
fn test_no_return_callee_cuts_the_path() {
    let mut b = IcfgBuilder::new();
    let main = b.define_function("main", vec![], None);
    let exit = b.declare_function("exit");
    let one = b.const_int(1);
    let call = b.call(main.id, Callee::Direct(exit), vec![one], None, None);
    let after = b.node(main.id, vec![]);
    chain(&mut b, &[main.entry, call.call]);
    chain(&mut b, &[call.ret, after, main.exit]);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert!(ae.state_at_node(call.call).is_some());
    assert!(ae.call_outcome(call.call).unwrap().is_no_return());
    assert!(ae.state_at_node(call.ret).is_none());
    assert!(ae.state_at_node(main.exit).is_none());
}

#[test]
fn test_indirect_call_through_function_pointer() {
    let mut b = IcfgBuilder::new();
    let (inc, formal) = define_adder(&mut b, "inc", 1);
    let main = b.define_function("main", vec![], None);
    let fp = b.fun_ptr(inc.id);
    let arg = b.const_int(41);
    let r = b.var("r");
    let call = b.call(main.id, Callee::Indirect(fp), vec![arg], Some(r), None);
    chain(&mut b, &[main.entry, call.call]);
    chain(&mut b, &[call.ret, main.exit]);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert_eq!(interval(&ae, inc.entry, formal), IntervalValue::singleton(41));
    assert_eq!(interval(&ae, main.exit, r), IntervalValue::singleton(42));
}

#[test]
fn test_indirect_call_joins_resolved_targets() {
    let mut b = IcfgBuilder::new();
    let (inc, _) = define_adder(&mut b, "inc", 1);
    let (dec, _) = define_adder(&mut b, "dec", -1);
    let main = b.define_function("main", vec![], None);
    let fp = b.ptr_var("fp");
    let arg = b.const_int(41);
    let r = b.var("r");
    let call = b.call(main.id, Callee::Indirect(fp), vec![arg], Some(r), None);
    b.add_indirect_target(call.call, inc.id);
    b.add_indirect_target(call.call, dec.id);
    chain(&mut b, &[main.entry, call.call]);
    chain(&mut b, &[call.ret, main.exit]);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert_eq!(interval(&ae, main.exit, r), iv(40, 42));
    assert_eq!(ae.call_outcome(call.call).unwrap().traversed, vec![inc.id, dec.id]);
}

#[test]
fn test_unresolved_indirect_call_is_conservative() {
    let mut b = IcfgBuilder::new();
    let main = b.define_function("main", vec![], None);
    let cell = b.object("cell", ObjKind::Stack, Some(4));
    let fp = b.ptr_var("fp");
    let p = b.ptr_var("p");
    let v = b.var("v");
    let r = b.var("r");
    let two = b.const_int(2);
    let init = b.node(
        main.id,
        vec![
            Statement::Addr {
                lhs: p,
                obj: cell,
                size: None,
            },
            Statement::Store { ptr: p, value: two },
            Statement::Copy {
                lhs: r,
                rhs: two,
                kind: aexec::ir::CopyKind::Value,
            },
        ],
    );
    let r2 = b.var("r2");
    let call = b.call(main.id, Callee::Indirect(fp), vec![p], Some(r2), None);
    let load = b.node(main.id, vec![Statement::Load { lhs: v, ptr: p }]);
    chain(&mut b, &[main.entry, init, call.call]);
    chain(&mut b, &[call.ret, load, main.exit]);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert!(interval(&ae, load, v).is_top());
    assert!(interval(&ae, load, r2).is_top());
    assert_eq!(interval(&ae, load, r), IntervalValue::singleton(2));
    assert!(ae.call_outcome(call.call).unwrap().fallthrough);
}
