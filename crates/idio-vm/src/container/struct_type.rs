// SPDX-License-Identifier: GPL-3.0-or-later

//! Struct-type and struct-instance operations (spec.md §3.3). Conditions
//! are struct-instances of a type somewhere under `^condition`
//! (`crate::condition`), so this is also the machinery that backs field
//! access on a caught condition.

use crate::heap::Heap;
use crate::value::heapobj::{StructInstance, StructType};
use crate::value::{HeapObject, HeapRef, Value};
use crate::vm::RuntimeError;

/// Define a new struct type (spec.md §3.3's `define-struct`).
pub fn define_type(heap: &mut Heap, name: &str, parent: Option<HeapRef>, field_names: &[&str]) -> Value {
    let name_value = heap.intern(name);
    let fields = field_names.iter().map(|f| heap.intern(f)).collect();
    heap.alloc(HeapObject::StructType(StructType { name: name_value, parent, field_names: fields }))
        .expect("unbounded heap alloc cannot fail")
}

/// Construct an instance, positionally matching `field_names`' order.
///
/// # Errors
///
/// Returns [`RuntimeError::Arity`] if `values.len()` does not match the
/// type's field count, or [`RuntimeError::WrongType`] if `struct_type`
/// does not name a struct type.
pub fn make_instance(heap: &mut Heap, struct_type: Value, values: Vec<Value>) -> Result<Value, RuntimeError> {
    let r = struct_type
        .as_heap_ref()
        .ok_or(RuntimeError::WrongType { expected: "struct-type", got: struct_type.type_name() })?;
    let HeapObject::StructType(st) =
        heap.get(r).ok_or(RuntimeError::WrongType { expected: "struct-type", got: "garbage" })?
    else {
        return Err(RuntimeError::WrongType { expected: "struct-type", got: struct_type.type_name() });
    };
    if st.field_names.len() != values.len() {
        return Err(RuntimeError::Arity {
            expected: u32::try_from(st.field_names.len()).unwrap_or(u32::MAX),
            got: u32::try_from(values.len()).unwrap_or(u32::MAX),
        });
    }
    Ok(heap.alloc(HeapObject::StructInstance(StructInstance { struct_type: r, fields: values }))?)
}

/// Field access by name, walking the instance's own type (not its
/// ancestors — field names are already flattened at type-construction
/// time, see `crate::condition::install_types`).
///
/// # Errors
///
/// Returns [`RuntimeError::WrongType`] if `instance` is not a
/// struct-instance or `field` is not one of its fields.
pub fn field_ref(heap: &Heap, instance: Value, field: &str) -> Result<Value, RuntimeError> {
    let r = instance
        .as_heap_ref()
        .ok_or(RuntimeError::WrongType { expected: "struct-instance", got: instance.type_name() })?;
    let HeapObject::StructInstance(si) =
        heap.get(r).ok_or(RuntimeError::WrongType { expected: "struct-instance", got: "garbage" })?
    else {
        return Err(RuntimeError::WrongType { expected: "struct-instance", got: instance.type_name() });
    };
    let HeapObject::StructType(st) = heap.get(si.struct_type).ok_or(RuntimeError::WrongType {
        expected: "struct-type",
        got: "garbage",
    })?
    else {
        unreachable!("struct_type field always points at a StructType");
    };
    for (i, name) in st.field_names.iter().enumerate() {
        let name_ref = name.as_heap_ref().expect("field names are interned symbols");
        if let Some(HeapObject::Symbol(s)) = heap.get(name_ref) {
            if s.to_string() == field {
                return Ok(si.fields[i]);
            }
        }
    }
    Err(RuntimeError::WrongType { expected: "a valid field name", got: "unknown field" })
}

#[cfg(test)]
mod struct_type_test {
    use super::*;

    #[test]
    fn make_instance_with_matching_arity_succeeds() {
        let mut heap = Heap::new();
        let st = define_type(&mut heap, "point", None, &["x", "y"]);
        let instance = make_instance(&mut heap, st, vec![Value::fixnum(1), Value::fixnum(2)]).unwrap();
        assert_eq!(field_ref(&heap, instance, "x").unwrap(), Value::fixnum(1));
        assert_eq!(field_ref(&heap, instance, "y").unwrap(), Value::fixnum(2));
    }

    #[test]
    fn make_instance_with_wrong_arity_errors() {
        let mut heap = Heap::new();
        let st = define_type(&mut heap, "point", None, &["x", "y"]);
        assert!(matches!(make_instance(&mut heap, st, vec![Value::fixnum(1)]), Err(RuntimeError::Arity { .. })));
    }

    #[test]
    fn unknown_field_name_errors() {
        let mut heap = Heap::new();
        let st = define_type(&mut heap, "point", None, &["x"]);
        let instance = make_instance(&mut heap, st, vec![Value::fixnum(1)]).unwrap();
        assert!(field_ref(&heap, instance, "z").is_err());
    }
}
