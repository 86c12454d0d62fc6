/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

mod common;

use aexec::ae::ExtOutcome;
use aexec::datatype::AbstractDomain;
use aexec::datatype::AbstractValue;
use aexec::datatype::IntervalValue;
use aexec::ir::Callee;
use aexec::ir::CopyKind;
use aexec::ir::IcfgBuilder;
use aexec::ir::ObjKind;
use aexec::ir::Statement;
use aexec::AbstractInterpretation;
use aexec::AnalysisOptions;
use common::program::*;
use test_log::test;

#[test]
fn test_custom_handler_overrides_default_effect() {
    let mut b = IcfgBuilder::new();
    let main = b.define_function("main", vec![], None);
    let answer = b.declare_function("answer");
    let r = b.var("r");
    let call = b.call(main.id, Callee::Direct(answer), vec![], Some(r), None);
    chain(&mut b, &[main.entry, call.call]);
    chain(&mut b, &[call.ret, main.exit]);
    let icfg = b.finish().unwrap();

    let mut ae = AbstractInterpretation::new(&icfg, AnalysisOptions::default());
    assert!(!ae.ext_api().contains("answer"));
    ae.ext_api_mut().register("answer", |call, state| {
        call.set_ret(state, AbstractValue::from(42));
        Ok(ExtOutcome::Returns)
    });
    ae.analyse().unwrap();
    assert_eq!(interval(&ae, main.exit, r), IntervalValue::singleton(42));
    assert_eq!(ae.stats().calls_skipped, 1);
}

#[test]
fn test_memcpy_copies_exact_cells() {
    // int src[2] = {3, 4}; int dst[2]; memcpy(dst, src, 8); v = dst[1];
    let mut b = IcfgBuilder::new();
    let main = b.define_function("main", vec![], None);
    let memcpy = b.declare_function("memcpy");
    let src = b.object("src", ObjKind::Stack, Some(8));
    let dst = b.object("dst", ObjKind::Stack, Some(8));
    let s = b.ptr_var("s");
    let s1 = b.ptr_var("s1");
    let d = b.ptr_var("d");
    let d1 = b.ptr_var("d1");
    let v = b.var("v");
    let three = b.const_int(3);
    let four = b.const_int(4);
    let eight = b.const_int(8);
    let init = b.node(
        main.id,
        vec![
            Statement::Addr {
                lhs: s,
                obj: src,
                size: None,
            },
            Statement::Gep {
                lhs: s1,
                base: s,
                index: aexec::ir::GepIndex::Const(1),
                elem_bytes: 4,
            },
            Statement::Store { ptr: s, value: three },
            Statement::Store { ptr: s1, value: four },
            Statement::Addr {
                lhs: d,
                obj: dst,
                size: None,
            },
        ],
    );
    let call = b.call(main.id, Callee::Direct(memcpy), vec![d, s, eight], None, None);
    let read = b.node(
        main.id,
        vec![
            Statement::Gep {
                lhs: d1,
                base: d,
                index: aexec::ir::GepIndex::Const(1),
                elem_bytes: 4,
            },
            Statement::Load { lhs: v, ptr: d1 },
        ],
    );
    chain(&mut b, &[main.entry, init, call.call]);
    chain(&mut b, &[call.ret, read, main.exit]);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert_eq!(interval(&ae, read, v), IntervalValue::singleton(4));
    assert!(ae.report().is_empty());
}

#[test]
fn test_debug_queries_by_source_line() {
    let mut b = IcfgBuilder::new();
    let main = b.define_function("main", vec![], None);
    let nondet = b.declare_function("nondet");
    let lb = b.const_int(2);
    let ub = b.const_int(9);
    let x = b.var("x");
    let y = b.var("y");
    let call = b.call(main.id, Callee::Direct(nondet), vec![lb, ub], Some(x), Some(loc(10)));
    let copy = b.node_at(
        main.id,
        vec![Statement::Copy {
            lhs: y,
            rhs: x,
            kind: CopyKind::Value,
        }],
        loc(11),
    );
    chain(&mut b, &[main.entry, call.call]);
    chain(&mut b, &[call.ret, copy, main.exit]);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);

    let states = ae.states_at(FILE, 10);
    let nodes: Vec<_> = states.iter().map(|(node, _)| *node).collect();
    assert_eq!(nodes, vec![call.call, call.ret]);
    assert!(ae.states_at(FILE, 99).is_empty());

    let values = ae.var_values_at(FILE, 11, &["x", "y", "missing"]).unwrap();
    assert_eq!(values["y"].interval(), iv(2, 9));
    assert_eq!(values["x"].interval(), iv(2, 9));
    assert!(!values.contains_key("missing"));
    assert!(ae.var_values_at("other.c", 11, &["x"]).is_none());

    let dump = ae.dump_trace();
    assert!(dump.contains("in main"));
    assert!(dump.contains(&format!("at {}:11", FILE)));
    assert!(dump.contains("y => [2, 9]"), "{}", dump);
}

#[test]
fn test_thread_fork_passes_the_argument() {
    // pthread_create(&t, NULL, routine, 7);
    let mut b = IcfgBuilder::new();
    let main = b.define_function("main", vec![], None);
    let routine_arg = b.var("arg");
    let routine = b.define_function("routine", vec![routine_arg], None);
    b.edge(routine.entry, routine.exit);
    let create = b.declare_function("pthread_create");
    let seven = b.const_int(7);
    let fork = b.call(main.id, Callee::Direct(create), vec![seven], None, None);
    b.push_stmt(
        fork.call,
        Statement::ThreadFork {
            formal: routine_arg,
            actual: seven,
            call_site: fork.call,
        },
    );
    chain(&mut b, &[main.entry, fork.call]);
    chain(&mut b, &[fork.ret, main.exit]);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert_eq!(interval(&ae, fork.call, routine_arg), IntervalValue::singleton(7));
    assert_eq!(interval(&ae, main.exit, routine_arg), IntervalValue::singleton(7));
    assert!(!state(&ae, fork.ret).var(routine_arg).is_top());
}

#[test]
fn test_unknown_call_through_unknown_pointer_forgets_memory() {
    // c = 5; before = c; q = getptr(); write_through(q); after = c;
    let mut b = IcfgBuilder::new();
    let main = b.define_function("main", vec![], None);
    let getptr = b.declare_function("getptr");
    let write_through = b.declare_function("write_through");
    let c = b.object("c", ObjKind::Stack, Some(4));
    let p = b.ptr_var("p");
    let q = b.ptr_var("q");
    let before = b.var("before");
    let after = b.var("after");
    let five = b.const_int(5);
    let init = b.node(
        main.id,
        vec![
            Statement::Addr {
                lhs: p,
                obj: c,
                size: None,
            },
            Statement::Store { ptr: p, value: five },
            Statement::Load { lhs: before, ptr: p },
        ],
    );
    let get = b.call(main.id, Callee::Direct(getptr), vec![], Some(q), None);
    let write = b.call(main.id, Callee::Direct(write_through), vec![q], None, None);
    let read = b.node(main.id, vec![Statement::Load { lhs: after, ptr: p }]);
    chain(&mut b, &[main.entry, init, get.call]);
    chain(&mut b, &[get.ret, write.call]);
    chain(&mut b, &[write.ret, read, main.exit]);
    let icfg = b.finish().unwrap();

    let ae = analyse(&icfg);
    assert_eq!(interval(&ae, init, before), IntervalValue::singleton(5));
    assert!(state(&ae, write.call).var(q).is_top());
    assert!(interval(&ae, read, after).is_top());
    assert!(!state(&ae, read).is_bottom());
}
