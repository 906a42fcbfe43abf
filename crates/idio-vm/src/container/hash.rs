// SPDX-License-Identifier: GPL-3.0-or-later

//! Hash-table operations (spec.md §3.3). Native equality compares
//! immediates by value and heap objects by identity (pointer equality),
//! which is exactly what deriving `Hash`/`Eq` on [`Value`] already gives —
//! [`crate::value::heapobj::HashKey`] is a thin newtype over that.

use crate::heap::Heap;
use crate::value::heapobj::HashKey;
use crate::value::{HeapObject, Value};
use crate::vm::RuntimeError;

/// `hash-ref` (spec.md §3.3).
///
/// # Errors
///
/// Returns [`RuntimeError::WrongType`] if `hash` is not a hash, or
/// [`RuntimeError::HashKeyNotFound`] if `key` is absent.
pub fn hash_ref(heap: &Heap, hash: Value, key: Value) -> Result<Value, RuntimeError> {
    let r = hash.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "hash", got: hash.type_name() })?;
    let HeapObject::Hash(h) = heap.get(r).ok_or(RuntimeError::WrongType { expected: "hash", got: "garbage" })? else {
        return Err(RuntimeError::WrongType { expected: "hash", got: hash.type_name() });
    };
    h.entries.get(&HashKey(key)).copied().ok_or(RuntimeError::HashKeyNotFound)
}

/// `hash-set!` (spec.md §3.3).
///
/// # Errors
///
/// Returns [`RuntimeError::WrongType`] if `hash` is not a hash.
pub fn hash_set(heap: &mut Heap, hash: Value, key: Value, value: Value) -> Result<(), RuntimeError> {
    let r = hash.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "hash", got: hash.type_name() })?;
    let HeapObject::Hash(h) = heap.get_mut(r).ok_or(RuntimeError::WrongType { expected: "hash", got: "garbage" })? else {
        return Err(RuntimeError::WrongType { expected: "hash", got: hash.type_name() });
    };
    h.entries.insert(HashKey(key), value);
    Ok(())
}

/// `hash-exists?` (spec.md §3.3).
///
/// # Errors
///
/// Returns [`RuntimeError::WrongType`] if `hash` is not a hash.
pub fn hash_exists(heap: &Heap, hash: Value, key: Value) -> Result<bool, RuntimeError> {
    let r = hash.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "hash", got: hash.type_name() })?;
    let HeapObject::Hash(h) = heap.get(r).ok_or(RuntimeError::WrongType { expected: "hash", got: "garbage" })? else {
        return Err(RuntimeError::WrongType { expected: "hash", got: hash.type_name() });
    };
    Ok(h.entries.contains_key(&HashKey(key)))
}

/// `hash-delete!` (spec.md §3.3). Returns whether a key was present.
///
/// # Errors
///
/// Returns [`RuntimeError::WrongType`] if `hash` is not a hash.
pub fn hash_delete(heap: &mut Heap, hash: Value, key: Value) -> Result<bool, RuntimeError> {
    let r = hash.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "hash", got: hash.type_name() })?;
    let HeapObject::Hash(h) = heap.get_mut(r).ok_or(RuntimeError::WrongType { expected: "hash", got: "garbage" })? else {
        return Err(RuntimeError::WrongType { expected: "hash", got: hash.type_name() });
    };
    Ok(h.entries.remove(&HashKey(key)).is_some())
}

#[cfg(test)]
mod hash_test {
    use super::*;
    use crate::value::heapobj::IdioHash;
    use std::collections::HashMap;

    fn make_hash(heap: &mut Heap) -> Value {
        heap.alloc(HeapObject::Hash(IdioHash { entries: HashMap::new(), weak_keys: false })).unwrap()
    }

    #[test]
    fn set_then_ref_round_trips() {
        let mut heap = Heap::new();
        let h = make_hash(&mut heap);
        let key = heap.intern("name");
        hash_set(&mut heap, h, key, Value::fixnum(42)).unwrap();
        assert_eq!(hash_ref(&heap, h, key).unwrap(), Value::fixnum(42));
    }

    #[test]
    fn missing_key_is_not_found() {
        let mut heap = Heap::new();
        let h = make_hash(&mut heap);
        let key = heap.intern("missing");
        assert!(matches!(hash_ref(&heap, h, key), Err(RuntimeError::HashKeyNotFound)));
    }

    #[test]
    fn exists_reflects_presence() {
        let mut heap = Heap::new();
        let h = make_hash(&mut heap);
        let key = heap.intern("k");
        assert!(!hash_exists(&heap, h, key).unwrap());
        hash_set(&mut heap, h, key, Value::fixnum(1)).unwrap();
        assert!(hash_exists(&heap, h, key).unwrap());
    }

    #[test]
    fn delete_removes_the_entry() {
        let mut heap = Heap::new();
        let h = make_hash(&mut heap);
        let key = heap.intern("k");
        hash_set(&mut heap, h, key, Value::fixnum(1)).unwrap();
        assert!(hash_delete(&mut heap, h, key).unwrap());
        assert!(!hash_exists(&heap, h, key).unwrap());
    }

    #[test]
    fn symbols_with_the_same_name_hash_equal_by_identity() {
        let mut heap = Heap::new();
        let h = make_hash(&mut heap);
        let k1 = heap.intern("dup");
        let k2 = heap.intern("dup");
        hash_set(&mut heap, h, k1, Value::fixnum(1)).unwrap();
        assert_eq!(hash_ref(&heap, h, k2).unwrap(), Value::fixnum(1));
    }
}
