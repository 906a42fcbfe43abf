// SPDX-License-Identifier: GPL-3.0-or-later

//! Printed representation of values (spec.md §3.1/§3.3).
//!
//! This is the `write`-style printer (quoted strings, `#\`-prefixed
//! characters), not `display` — a full reader-compatible printer is enough
//! for error messages and `--dump`, and is all this core needs since the
//! reader itself is out of scope.

use super::heapobj::HeapObject;
use super::{HeapRef, Singleton, Value};
use crate::heap::Heap;
use core::fmt::Write as _;

/// Render `value` to a string, resolving heap pointers through `heap`.
///
/// Cyclic structures are not guarded against here (spec.md does not call
/// out cycle detection as a printer requirement); a cyclic pair would
/// recurse until the call stack gives up, same as the original.
#[must_use]
pub fn print_value(value: Value, heap: &Heap) -> String {
    let mut out = String::new();
    write_value(&mut out, value, heap);
    out
}

fn write_value(out: &mut String, value: Value, heap: &Heap) {
    if let Some(n) = value.as_fixnum() {
        let _ = write!(out, "{n}");
        return;
    }
    if let Some(s) = value.as_singleton() {
        let text = match s {
            Singleton::Nil => "()",
            Singleton::Undef => "#<undef>",
            Singleton::Unspec => "#<unspec>",
            Singleton::Eof => "#<eof>",
            Singleton::True => "#t",
            Singleton::False => "#f",
            Singleton::Void => "#<void>",
            Singleton::NaN => "#<NaN>",
            _ => "#<stack-marker>",
        };
        out.push_str(text);
        return;
    }
    if let Some(c) = value.as_code_point() {
        let _ = write!(out, "#\\{}", c.to_char());
        return;
    }
    if let Some(r) = value.as_heap_ref() {
        write_heap_ref(out, r, heap);
        return;
    }
    out.push_str("#<reserved>");
}

fn write_heap_ref(out: &mut String, r: HeapRef, heap: &Heap) {
    let Some(obj) = heap.get(r) else {
        out.push_str("#<garbage>");
        return;
    };
    match obj {
        HeapObject::String(s) => {
            out.push('"');
            for cp in s.code_points() {
                match char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER) {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    c => out.push(c),
                }
            }
            out.push('"');
        }
        HeapObject::Substring(sub) => {
            let Some(HeapObject::String(parent)) = heap.get(sub.parent) else {
                out.push_str("#<garbage>");
                return;
            };
            out.push('"');
            for &cp in &parent.code_points()[sub.offset..sub.offset + sub.len] {
                out.push(char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            out.push('"');
        }
        HeapObject::Symbol(s) | HeapObject::Keyword(s) => {
            let _ = write!(out, "{s}");
        }
        HeapObject::Pair(_) => write_list(out, Value::from_heap_ref(r), heap),
        HeapObject::Array(a) => {
            out.push_str("#[");
            for (i, elt) in a.elements.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(out, *elt, heap);
            }
            out.push(']');
        }
        HeapObject::Hash(h) => {
            let _ = write!(out, "#<hash {} entries>", h.entries.len());
        }
        HeapObject::Closure(_) => out.push_str("#<closure>"),
        HeapObject::Primitive(_) => out.push_str("#<primitive>"),
        HeapObject::Bignum(b) => {
            let _ = write!(out, "{}", b.magnitude);
        }
        HeapObject::Module(_) => out.push_str("#<module>"),
        HeapObject::Frame(_) => out.push_str("#<frame>"),
        HeapObject::Handle(h) => {
            let _ = write!(out, "#<handle fd={}>", h.raw_fd);
        }
        HeapObject::StructType(st) => {
            out.push_str("#<struct-type ");
            write_value(out, st.name, heap);
            out.push('>');
        }
        HeapObject::StructInstance(_) => out.push_str("#<struct-instance>"),
        HeapObject::Thread(_) => out.push_str("#<thread>"),
        HeapObject::Continuation(_) => out.push_str("#<continuation>"),
        HeapObject::Bitset(b) => {
            let _ = write!(out, "#<bitset len={}>", b.len_bits);
        }
        HeapObject::CBox(_) => out.push_str("#<C/pointer>"),
        HeapObject::Span(_) => out.push_str("#<span>"),
    }
}

fn write_list(out: &mut String, mut value: Value, heap: &Heap) {
    out.push('(');
    let mut first = true;
    loop {
        let Some(r) = value.as_heap_ref() else {
            if !value.is_nil() {
                out.push_str(" . ");
                write_value(out, value, heap);
            }
            break;
        };
        let Some(HeapObject::Pair(p)) = heap.get(r) else {
            out.push_str(" . ");
            write_value(out, value, heap);
            break;
        };
        if !first {
            out.push(' ');
        }
        first = false;
        write_value(out, p.head, heap);
        value = p.tail;
    }
    out.push(')');
}
