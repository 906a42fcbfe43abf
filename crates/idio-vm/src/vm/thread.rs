// SPDX-License-Identifier: GPL-3.0-or-later

//! A thread of execution (spec.md §3.4).
//!
//! Idio is single-threaded at the OS level but the VM itself models
//! "threads" as independent execution contexts (used for nested `load`
//! re-entry and coroutine-style switching); each carries its own stack,
//! frame chain, registers, and standard handles.

use crate::value::Value;

/// Delimited-continuation "hole": a marker pushed onto the stack that a
/// matching delimited continuation capture/invoke pair references by id
/// (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hole {
    pub id: u32,
    pub stack_depth: usize,
}

/// One VM thread's full mutable state.
#[derive(Debug, Clone)]
pub struct Thread {
    /// Program counter: offset into the active segment's instruction
    /// stream.
    pub pc: u32,
    /// Index of the active execution environment (module/closure nesting
    /// level), spec.md's "xenv".
    pub xenv: u32,
    /// The value stack. Holds ordinary [`Value`]s interleaved with stack
    /// marker singletons (spec.md §3.5) that delimit trap frames, dynamic
    /// bindings, and saved return addresses.
    pub stack: Vec<Value>,
    /// Current lexical frame chain (a `Value` pointing at a
    /// [`crate::value::HeapObject::Frame`], or `nil` at toplevel).
    pub frame: Value,
    /// The module active for unqualified toplevel lookups.
    pub module: Value,
    /// The `val` register: the last computed value, passed between
    /// instructions that produce a result and the ones that consume it.
    pub val: Value,
    /// The `func` register: the callee of an in-progress call.
    pub func: Value,
    pub reg1: Value,
    pub reg2: Value,
    /// Constant-pool index of the source expression presently executing,
    /// used for back-traces and condition reporting.
    pub source_expr_index: u32,
    pub stdin: Value,
    pub stdout: Value,
    pub stderr: Value,
    pub holes: Vec<Hole>,
    /// Set by `crate::continuation` when a continuation invocation needs
    /// the outer dispatch loop to discard in-flight execution and resume
    /// from a captured snapshot instead of falling through normally.
    pub resume: Option<crate::continuation::ContinuationInvoke>,
    /// Active trap handlers, innermost last (spec.md §4.2/§4.3: `push-trap`
    /// pushes a stack-marker singleton onto `stack` for unwinding
    /// visibility *and* a [`crate::condition::TrapFrame`] here, so `raise`
    /// can search without re-walking marker-tagged stack slots).
    pub trap_stack: Vec<crate::condition::TrapFrame>,
    /// Dynamic-variable bindings, innermost last (spec.md §4.2).
    pub dynamic_stack: Vec<(u32, Value)>,
    /// Environ-variable bindings, innermost last (spec.md §4.2).
    pub environ_stack: Vec<(u32, Value)>,
    /// ABORT continuations, innermost (most recent) last (spec.md §4.3's
    /// restart handler: "rewind to the most recent ABORT continuation").
    /// `Vm::run`/`Vm::call_thunk` push one on entry and pop it on exit, so
    /// an unhandled condition always has somewhere to restart to as long
    /// as some enclosing call pushed one.
    pub abort_stack: Vec<crate::continuation::Continuation>,
}

impl Thread {
    #[must_use]
    pub fn new(module: Value) -> Self {
        Self {
            pc: 0,
            xenv: 0,
            stack: Vec::new(),
            frame: Value::nil(),
            module,
            val: Value::nil(),
            func: Value::nil(),
            reg1: Value::nil(),
            reg2: Value::nil(),
            source_expr_index: 0,
            stdin: Value::nil(),
            stdout: Value::nil(),
            stderr: Value::nil(),
            holes: Vec::new(),
            resume: None,
            trap_stack: Vec::new(),
            dynamic_stack: Vec::new(),
            environ_stack: Vec::new(),
            abort_stack: Vec::new(),
        }
    }

    /// Apply a captured continuation's snapshot to this thread in place
    /// (spec.md §9's redesign: overwrite rather than `siglongjmp`).
    pub fn restore_from(&mut self, c: &crate::continuation::Continuation) {
        self.stack = c.stack.clone();
        self.frame = c.frame;
        self.module = c.module;
        self.pc = c.pc;
    }

    /// Outgoing GC references: everything reachable directly from this
    /// thread's registers and stack.
    #[must_use]
    pub fn references(&self) -> Vec<Value> {
        let mut out = self.stack.clone();
        out.extend([
            self.frame,
            self.module,
            self.val,
            self.func,
            self.reg1,
            self.reg2,
            self.stdin,
            self.stdout,
            self.stderr,
        ]);
        if let Some(invoke) = &self.resume {
            out.extend(invoke.continuation.references());
            out.extend(invoke.values.iter().copied());
        }
        out.extend(self.trap_stack.iter().map(|t| t.handler));
        out.extend(self.dynamic_stack.iter().map(|(_, v)| *v));
        out.extend(self.environ_stack.iter().map(|(_, v)| *v));
        out.extend(self.abort_stack.iter().flat_map(crate::continuation::Continuation::references));
        out
    }
}

#[cfg(test)]
mod thread_test {
    use super::*;

    #[test]
    fn new_thread_starts_at_pc_zero_with_empty_stack() {
        let t = Thread::new(Value::nil());
        assert_eq!(t.pc, 0);
        assert!(t.stack.is_empty());
    }

    #[test]
    fn restore_from_overwrites_stack_frame_module_and_pc() {
        let mut t = Thread::new(Value::fixnum(1));
        t.stack.push(Value::fixnum(99));
        let snapshot = crate::continuation::Continuation::capture(
            crate::continuation::Kind::Full,
            vec![Value::fixnum(1), Value::fixnum(2)],
            Value::fixnum(3),
            Value::fixnum(4),
            42,
            0,
        );
        t.restore_from(&snapshot);
        assert_eq!(t.stack, vec![Value::fixnum(1), Value::fixnum(2)]);
        assert_eq!(t.frame, Value::fixnum(3));
        assert_eq!(t.module, Value::fixnum(4));
        assert_eq!(t.pc, 42);
    }

    #[test]
    fn references_include_stack_and_registers() {
        let mut t = Thread::new(Value::fixnum(1));
        t.val = Value::fixnum(2);
        let refs = t.references();
        assert!(refs.contains(&Value::fixnum(1)));
        assert!(refs.contains(&Value::fixnum(2)));
    }
}
