// SPDX-License-Identifier: GPL-3.0-or-later

//! Conditions and traps (spec.md §4.3).
//!
//! A condition is an ordinary struct-instance of a type somewhere under
//! `^condition`; `raise` walks the active thread's trap stack looking for
//! a handler whose watched types include (an ancestor of) the condition's
//! type, falling back to a process-wide default-handler table and finally
//! to a built-in reset/restart handler that the executor invokes to
//! abandon the current computation.

pub mod types;

use crate::heap::Heap;
use crate::value::{HeapObject, HeapRef, Value};
use crate::vm::thread::Thread;
use std::collections::HashMap;

/// A handler installed by `trap` (spec.md §4.3): a closure/primitive
/// [`Value`] plus the condition type names it watches.
#[derive(Debug, Clone)]
pub struct TrapFrame {
    pub handler: Value,
    pub watched_types: Vec<String>,
}

impl TrapFrame {
    #[must_use]
    pub fn watches(&self, condition_type: &str) -> bool {
        self.watched_types.iter().any(|t| types::is_a(condition_type, t))
    }
}

/// Errors internal to the condition machinery itself (not conditions to be
/// raised — these indicate the VM's trap bookkeeping is broken).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("unknown condition type {0:?}")]
    UnknownType(String),
    #[error("condition {0:?} raised with no trap and no default handler: unhandled")]
    Unhandled(String),
    #[error("feature not implemented: {0}")]
    Unimplemented(&'static str),
}

/// Process-wide condition-type registry: name to the heap slot holding its
/// `StructType` (built once at VM init by [`install_types`]).
#[derive(Debug, Default)]
pub struct ConditionTypeTable {
    by_name: HashMap<String, HeapRef>,
}

impl ConditionTypeTable {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<HeapRef> {
        self.by_name.get(name).copied()
    }
}

/// Build the full condition-type hierarchy as heap `StructType` objects
/// and return a lookup table by name.
pub fn install_types(heap: &mut Heap) -> ConditionTypeTable {
    let mut table = ConditionTypeTable::default();
    let mut own_fields: HashMap<String, &'static [&'static str]> = HashMap::new();
    for info in types::HIERARCHY {
        own_fields.insert((*info.name).to_owned(), info.fields);
        // Flatten: a struct-instance carries every ancestor's fields plus
        // its own, root (`^condition`) first, same as the field order the
        // accessors in `examples/original_source/src/condition.c` expect.
        let mut flattened: Vec<&'static str> = Vec::new();
        let mut chain: Vec<&'static str> = Vec::new();
        let mut current = Some(info.name);
        while let Some(name) = current {
            chain.push(name);
            current = types::find(name).and_then(|t| t.parent);
        }
        for name in chain.into_iter().rev() {
            flattened.extend_from_slice(own_fields.get(name).copied().unwrap_or(info.fields));
        }
        let name_value = heap.intern(info.name);
        let parent = info.parent.and_then(|p| table.get(p));
        let field_names = flattened.into_iter().map(|f| heap.intern(f)).collect();
        let r = heap
            .alloc_raw(HeapObject::StructType(crate::value::heapobj::StructType {
                name: name_value,
                parent,
                field_names,
            }))
            .expect("unbounded heap alloc cannot fail");
        table.by_name.insert((*info.name).to_owned(), r);
    }
    table
}

/// What the VM does with a raised condition, in the order spec.md §4.3
/// describes: an installed `trap` first, then a module-global default
/// handler keyed by condition type, then the built-in restart handler
/// (rewind to the nearest ABORT continuation), and only then a full reset
/// to the toplevel.
#[derive(Debug, Clone)]
pub enum Disposition {
    /// A trap handled it; execution should call `handler` with the
    /// condition and, for `raise-continuable`, resume afterward.
    Trap { continuable: bool },
    /// No trap matched but a default handler for this type (or an
    /// ancestor) is registered; same call/resume contract as `Trap`.
    Default { continuable: bool },
    /// Nothing claimed it; unwind to the nearest ABORT continuation.
    Restart(crate::continuation::Continuation),
    /// No trap, no default handler, and no ABORT continuation to restart:
    /// unwind this thread's computation back to the toplevel prompt.
    Reset,
}

/// The outcome of [`raise`]: either a handler to invoke, a continuation to
/// restart, or an instruction to reset to toplevel.
#[derive(Debug, Clone)]
pub struct RaiseOutcome {
    pub disposition: Disposition,
    pub handler: Option<Value>,
}

/// Process-wide condition-type to handler map (spec.md §4.3: "a
/// module-global hash maps condition-type to handler"). Consulted only
/// after the trap stack has been searched with no match.
#[derive(Debug, Default)]
pub struct DefaultHandlerTable {
    by_name: HashMap<String, Value>,
}

impl DefaultHandlerTable {
    /// Register (or replace) the default handler for `type_name`.
    pub fn install(&mut self, type_name: &str, handler: Value) {
        self.by_name.insert(type_name.to_owned(), handler);
    }

    /// Find the nearest registered handler for `type_name` or one of its
    /// ancestors, walking the hierarchy the same way [`TrapFrame::watches`]
    /// does.
    #[must_use]
    pub fn lookup_hierarchy(&self, type_name: &str) -> Option<Value> {
        let mut current = Some(type_name);
        while let Some(name) = current {
            if let Some(handler) = self.by_name.get(name) {
                return Some(*handler);
            }
            current = types::find(name).and_then(|t| t.parent);
        }
        None
    }
}

/// Look up `condition`'s struct-type name by walking the heap.
fn condition_type_name(heap: &Heap, condition: Value) -> Option<String> {
    let r = condition.as_heap_ref()?;
    let HeapObject::StructInstance(instance) = heap.get(r)? else { return None };
    let HeapObject::StructType(st) = heap.get(instance.struct_type)? else { return None };
    let name_ref = st.name.as_heap_ref()?;
    match heap.get(name_ref)? {
        HeapObject::Symbol(s) => Some(s.to_string()),
        _ => None,
    }
}

/// Raise `condition` on `thread` (spec.md §4.3/§6.3).
///
/// Searches `thread.trap_stack` innermost-first for a frame that watches
/// `condition`'s type (or an ancestor of it); the matching frame is popped
/// (traps are one-shot: the handler itself re-establishes a trap if it
/// wants to keep catching) so the handler runs with the *enclosing* trap
/// active, exactly as spec.md describes nested trap frames behaving.
///
/// With no trap installed, falls back to `defaults` (the module-global
/// condition-type to handler map); with neither, falls back to the
/// built-in restart handler, which rewinds to the nearest ABORT
/// continuation on `thread.abort_stack` if one exists, and only resets to
/// the toplevel if the thread never established one.
pub fn raise(thread: &mut Thread, heap: &Heap, defaults: &DefaultHandlerTable, condition: Value, continuable: bool) -> RaiseOutcome {
    let Some(type_name) = condition_type_name(heap, condition) else {
        return fallback(thread);
    };
    if let Some(pos) = thread.trap_stack.iter().rposition(|t| t.watches(&type_name)) {
        let frame = thread.trap_stack.remove(pos);
        return RaiseOutcome { disposition: Disposition::Trap { continuable }, handler: Some(frame.handler) };
    }
    if let Some(handler) = defaults.lookup_hierarchy(&type_name) {
        return RaiseOutcome { disposition: Disposition::Default { continuable }, handler: Some(handler) };
    }
    fallback(thread)
}

/// No trap, no default handler: rewind to the nearest ABORT continuation,
/// or reset to toplevel if the thread never established one (spec.md
/// §4.3's restart/reset handler).
fn fallback(thread: &mut Thread) -> RaiseOutcome {
    match thread.abort_stack.pop() {
        Some(k) => RaiseOutcome { disposition: Disposition::Restart(k), handler: None },
        None => RaiseOutcome { disposition: Disposition::Reset, handler: None },
    }
}

/// Build a `^system-error` condition instance (spec.md §6.3,
/// `SPEC_FULL.md` §12's `idio_error_system`). Field order follows §6.3:
/// `^idio-error`'s `[message, location, detail]` first, then
/// `^system-error`'s own `[errno, function]`.
pub fn raise_system_error(
    heap: &mut Heap,
    types: &ConditionTypeTable,
    function: &str,
    errno: i32,
    message: &str,
) -> Result<Value, ConditionError> {
    make_condition(heap, types, "^system-error", &[("message", message), ("function", function)], Some(errno))
}

/// Build a `^rt-divide-by-zero-error` condition (spec.md §8 scenario #3).
/// Raised continuably (`examples/original_source/src/error.c`'s
/// `idio_error_divide_by_zero` calls the `_cont` raise variant): a
/// handler's return value becomes `/`'s own result.
pub fn raise_divide_by_zero_error(heap: &mut Heap, types: &ConditionTypeTable, location: &str, message: &str) -> Result<Value, ConditionError> {
    make_condition(heap, types, "^rt-divide-by-zero-error", &[("message", message), ("location", location)], None)
}

/// Build a `^string-error/width` condition (spec.md §4.5 `string-set!`:
/// raised when a replacement code point doesn't fit a string's existing
/// storage width). `examples/original_source/src/string.c`'s
/// `idio_string_width_error` raises non-continuably via `idio_S_false`.
pub fn raise_string_width_error(heap: &mut Heap, types: &ConditionTypeTable, message: &str) -> Result<Value, ConditionError> {
    make_condition(heap, types, "^string-error/width", &[("message", message)], None)
}

/// Build an `^rt-signal` condition (spec.md §6.3: `[signum]`).
pub fn raise_signal(heap: &mut Heap, types: &ConditionTypeTable, signum: i32) -> Result<Value, ConditionError> {
    let struct_type = types.get("^rt-signal").ok_or_else(|| ConditionError::UnknownType("^rt-signal".to_owned()))?;
    let HeapObject::StructType(st) = heap.get(struct_type).expect("condition type table is internally consistent") else {
        unreachable!("condition_types only ever holds StructType refs")
    };
    let field_names = st.field_names.clone();
    let fields = field_names.iter().map(|_| Value::fixnum(i64::from(signum))).collect();
    heap.alloc(HeapObject::StructInstance(crate::value::heapobj::StructInstance { struct_type, fields }))
        .map_err(|_| ConditionError::Unimplemented("heap exhausted while constructing a condition"))
}

/// Convert a [`nix::Error`] into a `^system-error` condition (the one place
/// host errors cross into the condition system, per `SPEC_FULL.md` §14.2).
#[cfg(unix)]
pub fn from_nix_error(
    heap: &mut Heap,
    types: &ConditionTypeTable,
    function: &str,
    err: nix::Error,
) -> Result<Value, ConditionError> {
    raise_system_error(heap, types, function, err as i32, &err.to_string())
}

fn make_condition(
    heap: &mut Heap,
    types: &ConditionTypeTable,
    type_name: &str,
    string_fields: &[(&str, &str)],
    errno: Option<i32>,
) -> Result<Value, ConditionError> {
    let struct_type = types.get(type_name).ok_or_else(|| ConditionError::UnknownType(type_name.to_owned()))?;
    let HeapObject::StructType(st) = heap.get(struct_type).expect("condition type table is internally consistent")
    else {
        unreachable!("condition_types only ever holds StructType refs")
    };
    let field_names: Vec<Value> = st.field_names.clone();
    let mut fields = Vec::with_capacity(field_names.len());
    for name in &field_names {
        let name_ref = name.as_heap_ref().expect("field names are always symbols");
        let HeapObject::Symbol(sym) = heap.get(name_ref).expect("field name symbol is live") else {
            unreachable!()
        };
        let field_name = sym.to_string();
        let value = if field_name == "errno" {
            Value::fixnum(i64::from(errno.unwrap_or(0)))
        } else if let Some((_, v)) = string_fields.iter().find(|(k, _)| *k == field_name) {
            heap.alloc_string(v)
        } else {
            Value::nil()
        };
        fields.push(value);
    }
    heap.alloc(HeapObject::StructInstance(crate::value::heapobj::StructInstance { struct_type, fields }))
        .map_err(|_| ConditionError::Unimplemented("heap exhausted while constructing a condition"))
}
