// SPDX-License-Identifier: GPL-3.0-or-later

//! Continuations (spec.md §3.4/§4.4, §9's redesign note).
//!
//! The C implementation captures a continuation with `sigsetjmp` and
//! invokes it with `siglongjmp`, unwinding the native C call stack
//! directly. Rust gives no safe equivalent, and spec.md's own Design Notes
//! call for exactly the redesign used here: a continuation is a *snapshot*
//! of everything the dispatch loop needs to resume — the value stack, the
//! frame chain, the active module, and the program counter — plus, for a
//! delimited continuation, the "hole" it was captured under. Invoking one
//! overwrites the current thread's equivalent fields and returns
//! [`ContinuationInvoke`], which the outer `run` loop in `crate::vm`
//! checks for on every iteration and uses to re-enter at the captured PC
//! instead of falling through to the next instruction.

use crate::value::Value;

/// What kind of continuation this is (spec.md §3.4): a full continuation
/// captures the entire stack from the top-level prompt; a delimited one
/// only captures up to the nearest enclosing "hole" prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Full,
    Delimited { hole_id: u32 },
}

/// A captured continuation (spec.md §3.4).
#[derive(Debug, Clone)]
pub struct Continuation {
    pub kind: Kind,
    /// Snapshot of the thread's value stack at capture time.
    pub stack: Vec<Value>,
    /// Snapshot of the active frame chain.
    pub frame: Value,
    /// The module that was active at capture time.
    pub module: Value,
    /// Program counter to resume at.
    pub pc: u32,
    /// Index into the owning thread's segment, in case the continuation
    /// outlives a `load` boundary (spec.md §9's Open Question — see
    /// `DESIGN.md` for how nested `load` re-entry is resolved).
    pub segment: u32,
}

impl Continuation {
    #[must_use]
    pub fn capture(kind: Kind, stack: Vec<Value>, frame: Value, module: Value, pc: u32, segment: u32) -> Self {
        Self { kind, stack, frame, module, pc, segment }
    }

    /// Outgoing GC references held by this continuation: everything on the
    /// captured stack plus the captured frame chain and module.
    #[must_use]
    pub fn references(&self) -> Vec<Value> {
        let mut out = self.stack.clone();
        out.push(self.frame);
        out.push(self.module);
        out
    }
}

/// Signal returned by invoking a continuation: the dispatch loop must
/// discard its current state and resume from the captured snapshot rather
/// than continuing normal execution. This is the Rust substitute for
/// `siglongjmp` (spec.md §9).
#[derive(Debug, Clone)]
pub struct ContinuationInvoke {
    pub continuation: Continuation,
    /// The value(s) being passed to the continuation (spec.md: invoking a
    /// continuation with zero, one, or many values).
    pub values: Vec<Value>,
}

#[cfg(test)]
mod continuation_test {
    use super::*;

    #[test]
    fn references_include_stack_frame_and_module() {
        let c = Continuation::capture(
            Kind::Full,
            vec![Value::fixnum(1), Value::fixnum(2)],
            Value::fixnum(3),
            Value::fixnum(4),
            10,
            0,
        );
        let refs = c.references();
        assert_eq!(refs.len(), 4);
        assert!(refs.contains(&Value::fixnum(3)));
        assert!(refs.contains(&Value::fixnum(4)));
    }

    #[test]
    fn delimited_continuation_carries_its_hole_id() {
        let c = Continuation::capture(Kind::Delimited { hole_id: 7 }, Vec::new(), Value::nil(), Value::nil(), 0, 0);
        assert_eq!(c.kind, Kind::Delimited { hole_id: 7 });
    }
}
