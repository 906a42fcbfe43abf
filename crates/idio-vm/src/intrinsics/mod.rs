// SPDX-License-Identifier: GPL-3.0-or-later

//! Native primitives (spec.md §6.4).
//!
//! Each primitive is a descriptor — name, arity, a docstring, and a
//! source location for `describe`-style introspection — paired with a
//! plain Rust function. [`install`] interns each name as a symbol, binds
//! it in the `predef` global table, and records the descriptor so
//! `crate::vm::Vm::step`'s `Predefined` opcode can resolve straight to a
//! heap-allocated [`crate::value::heapobj::Primitive`] pointing back at
//! the descriptor's index.

use crate::container::{array, hash, string, struct_type};
use crate::heap::Heap;
use crate::value::{HeapObject, Value};
use crate::vm::{RuntimeError, Vm};

/// A primitive's metadata (spec.md §6.4: "name, arity, signature,
/// docstring, source file/line, function pointer").
pub struct Descriptor {
    pub name: &'static str,
    pub arity: u8,
    pub varargs: bool,
    pub signature: &'static str,
    pub docstring: &'static str,
    pub source_file: &'static str,
    pub source_line: u32,
    pub func: fn(&mut Vm, &[Value]) -> Result<Value, RuntimeError>,
}

macro_rules! prim {
    ($name:literal, $arity:literal, $varargs:literal, $sig:literal, $doc:literal, $func:path) => {
        Descriptor {
            name: $name,
            arity: $arity,
            varargs: $varargs,
            signature: $sig,
            docstring: $doc,
            source_file: file!(),
            source_line: line!(),
            func: $func,
        }
    };
}

/// The built-in primitive set (spec.md §8's end-to-end scenarios: `+`,
/// `/`, `string-length`, plus the handful of predicates/accessors needed
/// to exercise pairs, arrays, and hashes without a reader).
pub static REGISTRY: &[Descriptor] = &[
    prim!("+", 2, false, "(+ a b)", "sum of two fixnums", prim_add),
    prim!("-", 2, false, "(- a b)", "difference of two fixnums", prim_sub),
    prim!("*", 2, false, "(* a b)", "product of two fixnums", prim_mul),
    prim!("/", 2, false, "(/ a b)", "quotient of two fixnums; errors on division by zero", prim_div),
    prim!("eq?", 2, false, "(eq? a b)", "identity/immediate equality", prim_eq),
    prim!("not", 1, false, "(not a)", "boolean negation; only #f is false", prim_not),
    prim!("pair?", 1, false, "(pair? a)", "is a a pair", prim_pairp),
    prim!("cons", 2, false, "(cons a d)", "allocate a pair", prim_cons),
    prim!("car", 1, false, "(car p)", "head of a pair", prim_car),
    prim!("cdr", 1, false, "(cdr p)", "tail of a pair", prim_cdr),
    prim!("string-length", 1, false, "(string-length s)", "code point count of a string", prim_string_length),
    prim!("string-ref", 2, false, "(string-ref s i)", "indexed code-point read", prim_string_ref),
    prim!(
        "string-set!",
        3,
        false,
        "(string-set! s i c)",
        "overwrite the code point at i; raises ^string-error/width if c is too wide",
        prim_string_set
    ),
    prim!("substring", 3, false, "(substring s offset len)", "zero-copy view into s, normalised to its ultimate parent", prim_substring),
    prim!(
        "split-string",
        2,
        true,
        "(split-string s delim [exact?])",
        "tokenise s on the set of code points in delim; collapses delimiter runs unless exact? is true",
        prim_split_string
    ),
    prim!("array-ref", 2, false, "(array-ref a i)", "indexed array read, negative i counts from the end", prim_array_ref),
    prim!("array-set!", 3, false, "(array-set! a i v)", "indexed array write", prim_array_set),
    prim!("hash-ref", 2, false, "(hash-ref h k)", "hash lookup", prim_hash_ref),
    prim!("hash-set!", 3, false, "(hash-set! h k v)", "hash insert", prim_hash_set),
    prim!("struct-instance-ref", 2, false, "(struct-instance-ref i name)", "field access by name", prim_struct_ref),
    prim!(
        "%default-signal-handler",
        1,
        false,
        "(%default-signal-handler c)",
        "the process-wide ^rt-signal default handler; dispatches SIGCHLD/SIGHUP job notifications",
        prim_default_signal_handler
    ),
];

/// Install every [`REGISTRY`] entry into `vm`'s `predef` table, interning
/// each primitive's name in the process (spec.md §6.4).
pub fn install(vm: &mut Vm) {
    for (id, desc) in REGISTRY.iter().enumerate() {
        let primitive = vm
            .heap
            .alloc(HeapObject::Primitive(crate::value::heapobj::Primitive {
                intrinsic_id: u16::try_from(id).expect("primitive registry exceeds u16 index space"),
                arity: desc.arity,
                varargs: desc.varargs,
            }))
            .expect("unbounded heap alloc cannot fail");
        vm.globals.define_predef(desc.name, primitive);
        vm.heap.intern(desc.name);
    }
}

/// Invoke primitive `id` with `args`, checking arity first (spec.md
/// §6.4's `^rt-parameter-error` family covers arity mismatches too, but a
/// plain [`RuntimeError::Arity`] is enough at this core's layer —
/// `crate::condition` wraps it into a condition at the call site that
/// needs one).
///
/// # Errors
///
/// Returns [`RuntimeError::Arity`] on mismatch, or whatever the primitive
/// itself returns.
pub fn invoke(vm: &mut Vm, id: u16, args: &[Value]) -> Result<Value, RuntimeError> {
    let desc = REGISTRY.get(id as usize).ok_or(RuntimeError::Unimplemented("unknown primitive id"))?;
    if !desc.varargs && args.len() != desc.arity as usize {
        return Err(RuntimeError::Arity { expected: u32::from(desc.arity), got: u32::try_from(args.len()).unwrap_or(u32::MAX) });
    }
    (desc.func)(vm, args)
}

fn want_fixnum(v: Value) -> Result<i64, RuntimeError> {
    v.as_fixnum().ok_or(RuntimeError::WrongType { expected: "fixnum", got: v.type_name() })
}

fn prim_add(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let (a, b) = (want_fixnum(args[0])?, want_fixnum(args[1])?);
    a.checked_add(b).map(Value::fixnum).ok_or(RuntimeError::Unimplemented("bignum promotion on overflow"))
}

fn prim_sub(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let (a, b) = (want_fixnum(args[0])?, want_fixnum(args[1])?);
    a.checked_sub(b).map(Value::fixnum).ok_or(RuntimeError::Unimplemented("bignum promotion on overflow"))
}

fn prim_mul(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let (a, b) = (want_fixnum(args[0])?, want_fixnum(args[1])?);
    a.checked_mul(b).map(Value::fixnum).ok_or(RuntimeError::Unimplemented("bignum promotion on overflow"))
}

fn prim_div(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let (a, b) = (want_fixnum(args[0])?, want_fixnum(args[1])?);
    if b == 0 {
        let cond = crate::condition::raise_divide_by_zero_error(&mut vm.heap, &vm.condition_types, "/", "division by zero")?;
        // Continuable: `examples/original_source/src/error.c`'s
        // `idio_error_divide_by_zero` raises via the `_cont` variant, so a
        // handler's return value becomes `/`'s own result.
        return vm.raise(cond, true);
    }
    Ok(Value::fixnum(a / b))
}

fn prim_eq(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::bool(args[0] == args[1]))
}

fn prim_not(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::bool(args[0].is_false()))
}

fn prim_pairp(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let is_pair = args[0]
        .as_heap_ref()
        .and_then(|r| vm.heap.get(r))
        .is_some_and(|o| matches!(o, HeapObject::Pair(_)));
    Ok(Value::bool(is_pair))
}

fn prim_cons(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(vm.heap.alloc_pair(args[0], args[1]))
}

fn prim_car(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let r = args[0].as_heap_ref().ok_or(RuntimeError::WrongType { expected: "pair", got: args[0].type_name() })?;
    match vm.heap.get(r) {
        Some(HeapObject::Pair(p)) => Ok(p.head),
        _ => Err(RuntimeError::WrongType { expected: "pair", got: args[0].type_name() }),
    }
}

fn prim_cdr(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let r = args[0].as_heap_ref().ok_or(RuntimeError::WrongType { expected: "pair", got: args[0].type_name() })?;
    match vm.heap.get(r) {
        Some(HeapObject::Pair(p)) => Ok(p.tail),
        _ => Err(RuntimeError::WrongType { expected: "pair", got: args[0].type_name() }),
    }
}

fn prim_string_length(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::fixnum(i64::try_from(string::string_length(&vm.heap, args[0])?).unwrap_or(i64::MAX)))
}

fn want_code_point(v: Value) -> Result<u32, RuntimeError> {
    v.as_code_point().map(crate::value::CodePoint::to_u32).ok_or(RuntimeError::WrongType { expected: "unicode code point", got: v.type_name() })
}

fn want_index(v: Value) -> Result<usize, RuntimeError> {
    let n = want_fixnum(v)?;
    usize::try_from(n).map_err(|_| RuntimeError::ArrayBounds { index: n, len: 0 })
}

fn prim_string_ref(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let index = want_index(args[1])?;
    let cp = string::string_ref(&vm.heap, args[0], index)?;
    Ok(Value::code_point(crate::value::CodePoint::new(char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER))))
}

fn prim_string_set(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let index = want_index(args[1])?;
    let code_point = want_code_point(args[2])?;
    match string::string_set(&mut vm.heap, args[0], index, code_point) {
        Ok(()) => Ok(Value::singleton(crate::value::Singleton::Unspec)),
        Err(RuntimeError::StringWidthOverflow) => {
            // `examples/original_source/src/string.c`'s `idio_string_width_error`
            // raises via `idio_S_false`: non-continuable.
            let cond =
                crate::condition::raise_string_width_error(&mut vm.heap, &vm.condition_types, "replacement code point too wide for string storage")?;
            vm.raise(cond, false)
        }
        Err(e) => Err(e),
    }
}

fn prim_substring(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let offset = want_index(args[1])?;
    let len = want_index(args[2])?;
    string::substring(&mut vm.heap, args[0], offset, len)
}

fn prim_split_string(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() < 2 || args.len() > 3 {
        return Err(RuntimeError::Arity { expected: 2, got: u32::try_from(args.len()).unwrap_or(u32::MAX) });
    }
    let delimiters = string::code_points(&vm.heap, args[1])?;
    let exact = args.get(2).is_some_and(|v| !v.is_false());
    let parts = string::split(&mut vm.heap, args[0], &delimiters, exact)?;
    Ok(list_from_values(&mut vm.heap, &parts))
}

/// Fold a slice of values into a proper, nil-terminated list (spec.md
/// §3.3's pair chain), innermost (last element) first so the result reads
/// in the same order as `parts`.
fn list_from_values(heap: &mut Heap, values: &[Value]) -> Value {
    values.iter().rev().fold(Value::nil(), |tail, &head| heap.alloc_pair(head, tail))
}

fn prim_array_ref(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    array::array_ref(&vm.heap, args[0], want_fixnum(args[1])?)
}

fn prim_array_set(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    array::array_set(&mut vm.heap, args[0], want_fixnum(args[1])?, args[2])?;
    Ok(Value::singleton(crate::value::Singleton::Unspec))
}

fn prim_hash_ref(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    hash::hash_ref(&vm.heap, args[0], args[1])
}

fn prim_hash_set(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    hash::hash_set(&mut vm.heap, args[0], args[1], args[2])?;
    Ok(Value::singleton(crate::value::Singleton::Unspec))
}

/// The process-wide `^rt-signal` default handler (spec.md §4.3/§4.6): read
/// the signal number back off the condition and dispatch SIGCHLD/SIGHUP
/// job-control notifications. `examples/original_source/src/condition.c`'s
/// default condition handler does the same field-based dispatch on one
/// `^rt-signal` type rather than a distinct type per signal.
fn prim_default_signal_handler(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let signum = struct_type::field_ref(&vm.heap, args[0], "signal")?.as_fixnum().unwrap_or(-1);
    match signum {
        17 => {
            if let Some(table) = vm.job_table.as_mut() {
                let _ = crate::jobcontrol::do_job_notification(table);
            }
        }
        1 => {
            if let Some(table) = vm.job_table.as_ref() {
                for id in table.job_ids() {
                    crate::jobcontrol::hangup_job(table, id);
                }
            }
        }
        _ => {}
    }
    Ok(Value::singleton(crate::value::Singleton::Unspec))
}

fn prim_struct_ref(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let r = args[1].as_heap_ref().ok_or(RuntimeError::WrongType { expected: "symbol", got: args[1].type_name() })?;
    let name = match vm.heap.get(r) {
        Some(HeapObject::Symbol(s)) => s.to_string(),
        _ => return Err(RuntimeError::WrongType { expected: "symbol", got: args[1].type_name() }),
    };
    struct_type::field_ref(&vm.heap, args[0], &name)
}

#[cfg(test)]
mod intrinsics_test {
    use super::*;

    fn setup() -> Vm {
        // `Vm::new` already calls `install` itself.
        Vm::new(Vec::new(), Vec::new())
    }

    #[test]
    fn install_binds_every_primitive_by_name() {
        let vm = setup();
        for desc in REGISTRY {
            assert!(vm.globals.predef_index(desc.name).is_some(), "{} not bound", desc.name);
        }
    }

    #[test]
    fn addition_adds() {
        let mut vm = setup();
        let id = REGISTRY.iter().position(|d| d.name == "+").unwrap();
        let result = invoke(&mut vm, id as u16, &[Value::fixnum(2), Value::fixnum(3)]).unwrap();
        assert_eq!(result, Value::fixnum(5));
    }

    #[test]
    fn division_by_zero_raises_a_condition() {
        let mut vm = setup();
        let id = REGISTRY.iter().position(|d| d.name == "/").unwrap();
        let result = invoke(&mut vm, id as u16, &[Value::fixnum(1), Value::fixnum(0)]);
        assert!(matches!(result, Err(RuntimeError::Unhandled(_))));
    }

    #[test]
    fn arity_mismatch_is_rejected_before_the_primitive_runs() {
        let mut vm = setup();
        let id = REGISTRY.iter().position(|d| d.name == "+").unwrap();
        let result = invoke(&mut vm, id as u16, &[Value::fixnum(1)]);
        assert!(matches!(result, Err(RuntimeError::Arity { .. })));
    }

    #[test]
    fn cons_car_cdr_round_trip() {
        let mut vm = setup();
        let cons_id = REGISTRY.iter().position(|d| d.name == "cons").unwrap();
        let pair = invoke(&mut vm, cons_id as u16, &[Value::fixnum(1), Value::fixnum(2)]).unwrap();
        let car_id = REGISTRY.iter().position(|d| d.name == "car").unwrap();
        let cdr_id = REGISTRY.iter().position(|d| d.name == "cdr").unwrap();
        assert_eq!(invoke(&mut vm, car_id as u16, &[pair]).unwrap(), Value::fixnum(1));
        assert_eq!(invoke(&mut vm, cdr_id as u16, &[pair]).unwrap(), Value::fixnum(2));
    }

    #[test]
    fn overflow_reports_unimplemented_bignum_promotion() {
        let mut vm = setup();
        let id = REGISTRY.iter().position(|d| d.name == "+").unwrap();
        let result = invoke(&mut vm, id as u16, &[Value::fixnum(idio_core::FIXNUM_MAX), Value::fixnum(1)]);
        assert!(matches!(result, Err(RuntimeError::Unimplemented(_))));
    }

    #[test]
    fn string_ref_reads_a_code_point() {
        let mut vm = setup();
        let s = vm.heap.alloc_string("hello");
        let id = REGISTRY.iter().position(|d| d.name == "string-ref").unwrap();
        let result = invoke(&mut vm, id as u16, &[s, Value::fixnum(1)]).unwrap();
        assert_eq!(result.as_code_point().map(crate::value::CodePoint::to_char), Some('e'));
    }

    #[test]
    fn string_set_overwrites_in_place() {
        let mut vm = setup();
        let s = vm.heap.alloc_string("hello");
        let id = REGISTRY.iter().position(|d| d.name == "string-set!").unwrap();
        let c = Value::code_point(crate::value::CodePoint::new('H'));
        invoke(&mut vm, id as u16, &[s, Value::fixnum(0), c]).unwrap();
        assert_eq!(string::code_points(&vm.heap, s).unwrap()[0], u32::from(b'H'));
    }

    #[test]
    fn string_set_width_overflow_raises_a_condition() {
        let mut vm = setup();
        let s = vm.heap.alloc_string("hello");
        let id = REGISTRY.iter().position(|d| d.name == "string-set!").unwrap();
        let c = Value::code_point(crate::value::CodePoint::new('\u{1F600}'));
        let result = invoke(&mut vm, id as u16, &[s, Value::fixnum(0), c]);
        assert!(matches!(result, Err(RuntimeError::Unhandled(_))));
    }

    #[test]
    fn substring_normalises_and_splits() {
        let mut vm = setup();
        let s = vm.heap.alloc_string("hello world");
        let sub_id = REGISTRY.iter().position(|d| d.name == "substring").unwrap();
        let sub = invoke(&mut vm, sub_id as u16, &[s, Value::fixnum(6), Value::fixnum(5)]).unwrap();
        assert_eq!(string::code_points(&vm.heap, sub).unwrap(), "world".chars().map(|c| c as u32).collect::<Vec<_>>());
    }

    #[test]
    fn split_string_collapses_by_default_and_can_go_exact() {
        let mut vm = setup();
        let s = vm.heap.alloc_string(",a,,b,");
        let delim = vm.heap.alloc_string(",");
        let id = REGISTRY.iter().position(|d| d.name == "split-string").unwrap();

        let inexact = invoke(&mut vm, id as u16, &[s, delim]).unwrap();
        assert_eq!(list_len(&vm, inexact), 2);

        let s2 = vm.heap.alloc_string(",a,,b,");
        let delim2 = vm.heap.alloc_string(",");
        let exact = invoke(&mut vm, id as u16, &[s2, delim2, Value::bool(true)]).unwrap();
        assert_eq!(list_len(&vm, exact), 5);
    }

    fn list_len(vm: &Vm, mut list: Value) -> usize {
        let mut n = 0;
        while let Some(r) = list.as_heap_ref() {
            let Some(HeapObject::Pair(p)) = vm.heap.get(r) else { break };
            n += 1;
            list = p.tail;
        }
        n
    }
}
