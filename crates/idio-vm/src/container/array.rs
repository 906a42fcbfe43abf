// SPDX-License-Identifier: GPL-3.0-or-later

//! Array operations (spec.md §3.3): negative indexing, bounds-checked
//! ref/set, and the doubling-then-linear growth policy implemented on
//! [`crate::value::heapobj::IdioArray`] itself.

use crate::heap::Heap;
use crate::value::{HeapObject, Value};
use crate::vm::RuntimeError;

/// `array-ref` (spec.md §3.3): negative indices count from the end.
///
/// # Errors
///
/// Returns [`RuntimeError::WrongType`] if `array` is not an array, or
/// [`RuntimeError::ArrayBounds`] if `index` is out of range.
pub fn array_ref(heap: &Heap, array: Value, index: i64) -> Result<Value, RuntimeError> {
    let r = array.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "array", got: array.type_name() })?;
    let HeapObject::Array(a) = heap.get(r).ok_or(RuntimeError::WrongType { expected: "array", got: "garbage" })? else {
        return Err(RuntimeError::WrongType { expected: "array", got: array.type_name() });
    };
    a.get(index).ok_or(RuntimeError::ArrayBounds { index, len: a.len() })
}

/// `array-set!` (spec.md §3.3).
///
/// # Errors
///
/// As [`array_ref`].
pub fn array_set(heap: &mut Heap, array: Value, index: i64, value: Value) -> Result<(), RuntimeError> {
    let r = array.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "array", got: array.type_name() })?;
    let HeapObject::Array(a) = heap.get_mut(r).ok_or(RuntimeError::WrongType { expected: "array", got: "garbage" })? else {
        return Err(RuntimeError::WrongType { expected: "array", got: array.type_name() });
    };
    let len = a.len();
    if a.set(index, value) {
        Ok(())
    } else {
        Err(RuntimeError::ArrayBounds { index, len })
    }
}

/// `array-push!` (spec.md §3.3's growth policy).
///
/// # Errors
///
/// Returns [`RuntimeError::WrongType`] if `array` is not an array.
pub fn array_push(heap: &mut Heap, array: Value, value: Value) -> Result<(), RuntimeError> {
    let r = array.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "array", got: array.type_name() })?;
    let HeapObject::Array(a) = heap.get_mut(r).ok_or(RuntimeError::WrongType { expected: "array", got: "garbage" })? else {
        return Err(RuntimeError::WrongType { expected: "array", got: array.type_name() });
    };
    a.push(value);
    Ok(())
}

/// `array-length` (spec.md §3.3).
///
/// # Errors
///
/// Returns [`RuntimeError::WrongType`] if `array` is not an array.
pub fn array_length(heap: &Heap, array: Value) -> Result<usize, RuntimeError> {
    let r = array.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "array", got: array.type_name() })?;
    let HeapObject::Array(a) = heap.get(r).ok_or(RuntimeError::WrongType { expected: "array", got: "garbage" })? else {
        return Err(RuntimeError::WrongType { expected: "array", got: array.type_name() });
    };
    Ok(a.len())
}

#[cfg(test)]
mod array_test {
    use super::*;
    use crate::value::heapobj::IdioArray;

    fn make_array(heap: &mut Heap, values: &[Value]) -> Value {
        heap.alloc(HeapObject::Array(IdioArray { elements: values.to_vec() })).unwrap()
    }

    #[test]
    fn positive_index_reads_in_order() {
        let mut heap = Heap::new();
        let a = make_array(&mut heap, &[Value::fixnum(1), Value::fixnum(2), Value::fixnum(3)]);
        assert_eq!(array_ref(&heap, a, 1).unwrap(), Value::fixnum(2));
    }

    #[test]
    fn negative_index_reads_from_the_end() {
        let mut heap = Heap::new();
        let a = make_array(&mut heap, &[Value::fixnum(1), Value::fixnum(2), Value::fixnum(3)]);
        assert_eq!(array_ref(&heap, a, -1).unwrap(), Value::fixnum(3));
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let mut heap = Heap::new();
        let a = make_array(&mut heap, &[Value::fixnum(1)]);
        assert!(matches!(array_ref(&heap, a, 5), Err(RuntimeError::ArrayBounds { .. })));
    }

    #[test]
    fn array_set_then_ref_round_trips() {
        let mut heap = Heap::new();
        let a = make_array(&mut heap, &[Value::fixnum(1), Value::fixnum(2)]);
        array_set(&mut heap, a, 0, Value::fixnum(99)).unwrap();
        assert_eq!(array_ref(&heap, a, 0).unwrap(), Value::fixnum(99));
    }

    #[test]
    fn array_push_grows_length() {
        let mut heap = Heap::new();
        let a = make_array(&mut heap, &[]);
        array_push(&mut heap, a, Value::fixnum(1)).unwrap();
        array_push(&mut heap, a, Value::fixnum(2)).unwrap();
        assert_eq!(array_length(&heap, a).unwrap(), 2);
    }

    #[test]
    fn wrong_type_is_reported() {
        let heap = Heap::new();
        assert!(matches!(array_ref(&heap, Value::fixnum(1), 0), Err(RuntimeError::WrongType { .. })));
    }
}
