// SPDX-License-Identifier: GPL-3.0-or-later

//! Operations over the container heap types (spec.md §3.3): arrays,
//! hashes, and struct instances. The data layouts themselves live in
//! [`crate::value::heapobj`] (`IdioArray`, `IdioHash`, `StructInstance`);
//! this module is the operation surface `crate::intrinsics` installs as
//! primitives and that `crate::vm` uses for its own calling convention
//! (argument frames are themselves built from a `Frame`, not an
//! `IdioArray`, but sharing the bounds-checking helpers avoids duplicating
//! that logic).

pub mod array;
pub mod hash;
pub mod string;
pub mod struct_type;

use crate::heap::Heap;
use crate::value::{HeapObject, Value};
use crate::vm::RuntimeError;

/// Read every slot out of a `Frame` value, in order — used to gather a
/// primitive call's arguments (spec.md §4.2's calling convention: a
/// primitive receives its arguments as a plain slice, not a frame chain).
///
/// # Errors
///
/// Returns [`RuntimeError::WrongType`] if `frame` is not a frame.
pub fn frame_values(heap: &Heap, frame: Value) -> Result<Vec<Value>, RuntimeError> {
    let r = frame.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "frame", got: frame.type_name() })?;
    let HeapObject::Frame(f) = heap.get(r).ok_or(RuntimeError::WrongType { expected: "frame", got: "garbage" })? else {
        return Err(RuntimeError::WrongType { expected: "frame", got: frame.type_name() });
    };
    Ok(f.slots.clone())
}
