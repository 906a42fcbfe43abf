// SPDX-License-Identifier: GPL-3.0-or-later

//! String operations (spec.md §4.5): bounds-checked ref/set, substring
//! construction that normalises through to the ultimate parent, and
//! resolved-code-point-sequence equality. The data layout itself lives in
//! [`crate::string::IdioString`] and [`crate::value::heapobj::Substring`];
//! this module is the operation surface `crate::intrinsics` installs as
//! primitives, mirroring `array.rs`/`hash.rs`'s split between storage and
//! bounds-checked access.

use crate::heap::Heap;
use crate::string::IdioString;
use crate::value::{HeapObject, HeapRef, Value};
use crate::vm::RuntimeError;

/// The code points `value` (a `String` or `Substring`) denotes, resolved
/// through any substring indirection.
///
/// # Errors
///
/// Returns [`RuntimeError::WrongType`] if `value` is neither a string nor a
/// substring.
pub fn code_points(heap: &Heap, value: Value) -> Result<Vec<u32>, RuntimeError> {
    let r = value.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "string", got: value.type_name() })?;
    match heap.get(r).ok_or(RuntimeError::WrongType { expected: "string", got: "garbage" })? {
        HeapObject::String(s) => Ok(s.code_points()),
        HeapObject::Substring(sub) => {
            let Some(HeapObject::String(parent)) = heap.get(sub.parent) else {
                unreachable!("a substring's parent always resolves to a live String")
            };
            Ok(parent.code_points()[sub.offset..sub.offset + sub.len].to_vec())
        }
        _ => Err(RuntimeError::WrongType { expected: "string", got: value.type_name() }),
    }
}

/// `string-ref` (spec.md §4.5): indexed, bounds-checked code-point read.
///
/// # Errors
///
/// As [`code_points`], plus [`RuntimeError::ArrayBounds`] if `index` is out
/// of range.
pub fn string_ref(heap: &Heap, value: Value, index: usize) -> Result<u32, RuntimeError> {
    let cps = code_points(heap, value)?;
    let len = cps.len();
    cps.get(index).copied().ok_or(RuntimeError::ArrayBounds { index: i64::try_from(index).unwrap_or(i64::MAX), len })
}

/// `string-length` in code points (spec.md §4.5), resolving substrings the
/// same way [`code_points`] does rather than duplicating the walk.
///
/// # Errors
///
/// As [`code_points`].
pub fn string_length(heap: &Heap, value: Value) -> Result<usize, RuntimeError> {
    let r = value.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "string", got: value.type_name() })?;
    match heap.get(r).ok_or(RuntimeError::WrongType { expected: "string", got: "garbage" })? {
        HeapObject::String(s) => Ok(s.len()),
        HeapObject::Substring(sub) => Ok(sub.len),
        _ => Err(RuntimeError::WrongType { expected: "string", got: value.type_name() }),
    }
}

/// Build a substring view of `parent`, normalising through to the ultimate
/// owning string (spec.md §4.5: "substrings of substrings normalise to
/// reference the ultimate parent" — a substring's `parent` field is never
/// itself a `Substring`).
///
/// # Errors
///
/// Returns [`RuntimeError::WrongType`] if `parent` is not a string or
/// substring, or [`RuntimeError::ArrayBounds`] if `[offset, offset + len)`
/// falls outside it (spec.md §3.3's invariant: "substring offset+length ≤
/// parent code-point length").
pub fn substring(heap: &mut Heap, parent: Value, offset: usize, len: usize) -> Result<Value, RuntimeError> {
    let mut parent_ref = parent.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "string", got: parent.type_name() })?;
    let mut resolved_offset = offset;
    let resolved_parent: HeapRef = loop {
        match heap.get(parent_ref).ok_or(RuntimeError::WrongType { expected: "string", got: "garbage" })? {
            HeapObject::Substring(sub) => {
                resolved_offset += sub.offset;
                parent_ref = sub.parent;
            }
            HeapObject::String(s) => {
                if resolved_offset + len > s.len() {
                    return Err(RuntimeError::ArrayBounds {
                        index: i64::try_from(resolved_offset + len).unwrap_or(i64::MAX),
                        len: s.len(),
                    });
                }
                break parent_ref;
            }
            _ => return Err(RuntimeError::WrongType { expected: "string", got: parent.type_name() }),
        }
    };
    heap.alloc(HeapObject::Substring(crate::value::heapobj::Substring { parent: resolved_parent, offset: resolved_offset, len }))
        .map_err(RuntimeError::Gc)
}

/// Equality by resolved code-point sequence, regardless of storage width or
/// substring indirection (spec.md §4.5 "Equality is by code-point sequence
/// regardless of storage width"; testable property #6).
///
/// # Errors
///
/// As [`code_points`].
pub fn string_equal(heap: &Heap, a: Value, b: Value) -> Result<bool, RuntimeError> {
    Ok(code_points(heap, a)? == code_points(heap, b)?)
}

/// `string-set!` (spec.md §4.5): overwrite the code point at `index` in
/// place. A `Substring` mutates through to its parent's storage at the
/// resolved position — it is a view, not a copy.
///
/// # Errors
///
/// Returns [`RuntimeError::WrongType`] if `value` is neither a string nor a
/// substring, [`RuntimeError::ArrayBounds`] if `index` is out of range, and
/// [`RuntimeError::StringWidthOverflow`] if `code_point` doesn't fit the
/// target string's existing storage width — the caller is expected to turn
/// that into a `^string-error/width` condition via
/// `crate::condition::raise_string_width_error`.
pub fn string_set(heap: &mut Heap, value: Value, index: usize, code_point: u32) -> Result<(), RuntimeError> {
    let r = value.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "string", got: value.type_name() })?;
    let (target, local_index, len) = match heap.get(r).ok_or(RuntimeError::WrongType { expected: "string", got: "garbage" })? {
        HeapObject::String(s) => (r, index, s.len()),
        HeapObject::Substring(sub) => (sub.parent, sub.offset + index, sub.len),
        _ => return Err(RuntimeError::WrongType { expected: "string", got: value.type_name() }),
    };
    if index >= len {
        return Err(RuntimeError::ArrayBounds { index: i64::try_from(index).unwrap_or(i64::MAX), len });
    }
    let HeapObject::String(s) = heap.get_mut(target).expect("resolved target is always a live String") else {
        unreachable!("string_set only ever resolves to a String slot")
    };
    s.set(local_index, code_point).map_err(|_| RuntimeError::StringWidthOverflow)
}

/// `split-string` (spec.md §4.5): tokenise `value` on the set of code
/// points in `delimiters`, returning one heap-allocated string per token.
///
/// # Errors
///
/// As [`code_points`].
pub fn split(heap: &mut Heap, value: Value, delimiters: &[u32], exact: bool) -> Result<Vec<Value>, RuntimeError> {
    let owned = IdioString::from_code_points(code_points(heap, value)?);
    Ok(owned
        .split(delimiters, exact)
        .into_iter()
        .map(|part| heap.alloc(HeapObject::String(part)).expect("unbounded heap alloc cannot fail"))
        .collect())
}

#[cfg(test)]
mod string_test {
    use super::*;

    #[test]
    fn string_ref_reads_in_bounds() {
        let mut heap = Heap::new();
        let s = heap.alloc_string("hello");
        assert_eq!(string_ref(&heap, s, 1).unwrap(), u32::from(b'e'));
    }

    #[test]
    fn string_ref_out_of_bounds_is_rejected() {
        let mut heap = Heap::new();
        let s = heap.alloc_string("hi");
        assert!(matches!(string_ref(&heap, s, 5), Err(RuntimeError::ArrayBounds { .. })));
    }

    #[test]
    fn substring_of_a_string_resolves_directly() {
        let mut heap = Heap::new();
        let s = heap.alloc_string("hello world");
        let sub = substring(&mut heap, s, 6, 5).unwrap();
        assert_eq!(code_points(&heap, sub).unwrap(), "world".chars().map(|c| c as u32).collect::<Vec<_>>());
    }

    #[test]
    fn substring_of_a_substring_normalises_to_the_ultimate_parent() {
        let mut heap = Heap::new();
        let s = heap.alloc_string("hello world");
        let sub = substring(&mut heap, s, 6, 5).unwrap(); // "world"
        let sub2 = substring(&mut heap, sub, 1, 3).unwrap(); // "orl"
        let r = sub2.as_heap_ref().unwrap();
        let HeapObject::Substring(inner) = heap.get(r).unwrap() else { panic!("expected substring") };
        assert_eq!(inner.parent, s.as_heap_ref().unwrap(), "must point at the ultimate parent, not the intermediate substring");
        assert_eq!(inner.offset, 7);
        assert_eq!(code_points(&heap, sub2).unwrap(), "orl".chars().map(|c| c as u32).collect::<Vec<_>>());
    }

    #[test]
    fn substring_out_of_bounds_is_rejected() {
        let mut heap = Heap::new();
        let s = heap.alloc_string("hi");
        assert!(matches!(substring(&mut heap, s, 1, 5), Err(RuntimeError::ArrayBounds { .. })));
    }

    #[test]
    fn substring_equals_the_equivalent_direct_slice() {
        let mut heap = Heap::new();
        let s = heap.alloc_string("hello world");
        let sub = substring(&mut heap, s, 0, 5).unwrap();
        let direct = heap.alloc_string("hello");
        assert!(string_equal(&heap, sub, direct).unwrap());
    }

    #[test]
    fn string_set_overwrites_in_place() {
        let mut heap = Heap::new();
        let s = heap.alloc_string("hello");
        string_set(&mut heap, s, 0, u32::from(b'H')).unwrap();
        assert_eq!(code_points(&heap, s).unwrap()[0], u32::from(b'H'));
    }

    #[test]
    fn string_set_on_a_substring_mutates_the_parent_storage() {
        let mut heap = Heap::new();
        let s = heap.alloc_string("hello world");
        let sub = substring(&mut heap, s, 6, 5).unwrap(); // "world"
        string_set(&mut heap, sub, 0, u32::from(b'W')).unwrap();
        assert_eq!(code_points(&heap, s).unwrap()[6], u32::from(b'W'));
    }

    #[test]
    fn string_set_rejects_a_code_point_too_wide_for_storage() {
        let mut heap = Heap::new();
        let s = heap.alloc_string("hello");
        let err = string_set(&mut heap, s, 0, 0x1F600);
        assert!(matches!(err, Err(RuntimeError::StringWidthOverflow)));
    }

    #[test]
    fn string_set_out_of_bounds_is_rejected() {
        let mut heap = Heap::new();
        let s = heap.alloc_string("hi");
        assert!(matches!(string_set(&mut heap, s, 5, u32::from(b'x')), Err(RuntimeError::ArrayBounds { .. })));
    }

    #[test]
    fn split_collapses_delimiters_by_default_and_allocates_each_token() {
        let mut heap = Heap::new();
        let s = heap.alloc_string("a::b::c");
        let parts = split(&mut heap, s, &[u32::from(b':')], false).unwrap();
        let rendered: Vec<Vec<u32>> = parts.iter().map(|&p| code_points(&heap, p).unwrap()).collect();
        assert_eq!(rendered, vec!["a", "b", "c"].into_iter().map(|s| s.chars().map(|c| c as u32).collect()).collect::<Vec<_>>());
    }

    #[test]
    fn split_works_on_a_substring() {
        let mut heap = Heap::new();
        let s = heap.alloc_string("--a,b--");
        let sub = substring(&mut heap, s, 2, 3).unwrap(); // "a,b"
        let parts = split(&mut heap, sub, &[u32::from(b',')], false).unwrap();
        assert_eq!(parts.len(), 2);
    }
}
