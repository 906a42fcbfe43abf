// SPDX-License-Identifier: GPL-3.0-or-later

use super::*;
use crate::heap::Heap;

#[test]
fn debug_format_distinguishes_fixnum_and_singleton() {
    assert_eq!(format!("{:?}", Value::fixnum(5)), "Fixnum(5)");
    assert_eq!(format!("{:?}", Value::nil()), "Nil");
}

#[test]
fn type_name_covers_immediates() {
    assert_eq!(Value::fixnum(1).type_name(), "fixnum");
    assert_eq!(Value::nil().type_name(), "nil");
    assert_eq!(Value::bool(true).type_name(), "boolean");
    assert_eq!(Value::code_point(CodePoint::new('x')).type_name(), "unicode");
}

#[test]
fn heap_ref_prints_with_ref_prefix() {
    let r = HeapRef::from_index(42);
    assert_eq!(format!("{r:?}"), "#<ref 0x2a>");
}

#[test]
fn printer_round_trips_a_simple_string() {
    let mut heap = Heap::new();
    let v = heap.alloc_string("hi");
    assert_eq!(print_value(v, &heap), "\"hi\"");
}

#[test]
fn printer_renders_a_pair_as_a_list() {
    let mut heap = Heap::new();
    let tail = heap.alloc_pair(Value::fixnum(2), Value::nil());
    let head = heap.alloc_pair(Value::fixnum(1), tail);
    assert_eq!(print_value(head, &heap), "(1 2)");
}
