/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use aexec::datatype::AbstractDomain;
use aexec::datatype::Address;
use aexec::datatype::AddressValue;
use aexec::datatype::DisjointUnion;
use aexec::datatype::IntervalValue;
use aexec::ir::ObjId;

#[derive(Clone, PartialEq, Eq, Debug, DisjointUnion)]
enum Operand {
    Number(IntervalValue),
    Pointer(AddressValue),
}

fn pointer(objs: &[u32]) -> AddressValue {
    objs.iter()
        .map(|&obj| Address::base(ObjId::new(obj)))
        .collect()
}

#[test]
fn test_basic_union_top_bottom_leq() {
    assert!(Operand::top().is_top());
    assert!(Operand::Pointer(AbstractDomain::top()).is_top());
    assert!(Operand::Pointer(AbstractDomain::bottom()).is_bottom());

    let top: Operand = AbstractDomain::top();
    let bot: Operand = AbstractDomain::bottom();
    assert!(bot.leq(&top));

    let narrow = IntervalValue::from_range(1, 2);
    let wide = IntervalValue::from_range(0, 3);
    assert!(Operand::Number(narrow).leq(&Operand::Number(wide)));
    assert!(Operand::Pointer(pointer(&[1])).leq(&Operand::Pointer(pointer(&[1, 2]))));
}

#[test]
fn test_diff_arms_no_leq() {
    // Two different arms never compare, whatever their contents.
    let number = Operand::Number(IntervalValue::from_range(1, 2));
    let address = Operand::Pointer(pointer(&[1, 2, 3]));

    assert!(!number.leq(&address));
    assert!(!address.leq(&number));
}

#[test]
fn test_join_and_meet_same_arm() {
    let joined = Operand::Number(IntervalValue::from_range(1, 2))
        .join(Operand::Number(IntervalValue::from_range(5, 6)));
    assert_eq!(joined, Operand::Number(IntervalValue::from_range(1, 6)));

    let met = Operand::Pointer(pointer(&[1, 2])).meet(Operand::Pointer(pointer(&[2, 3])));
    assert_eq!(met, Operand::Pointer(pointer(&[2])));
}

#[test]
fn test_join_diff_arm() {
    let joined = Operand::Number(IntervalValue::singleton(0)).join(Operand::Pointer(pointer(&[1])));
    assert!(joined.is_top());
}

#[test]
fn test_meet_diff_arm() {
    let met = Operand::Number(IntervalValue::singleton(0)).meet(Operand::Pointer(pointer(&[1])));
    assert!(met.is_bottom());
}

#[test]
fn test_widen_is_forwarded_to_the_arm() {
    let widened = Operand::Number(IntervalValue::from_range(0, 1))
        .widen(Operand::Number(IntervalValue::from_range(0, 2)));
    match widened {
        Operand::Number(interval) => {
            assert_eq!(interval.lb(), IntervalValue::singleton(0).lb());
            assert!(interval.ub() > IntervalValue::singleton(i64::MAX).ub());
        }
        _ => panic!("Unexpected case"),
    }
}
