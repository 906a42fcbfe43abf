// SPDX-License-Identifier: GPL-3.0-or-later

//! The byte-code virtual machine (spec.md §4, §5).
//!
//! [`Vm`] owns the heap, the global value tables, the condition-type
//! registry, and the currently-loaded code segment, and drives a single
//! [`thread::Thread`] through the fetch-decode-execute loop in [`Vm::run`].
//! Nested `load` (spec.md §9's Open Question, resolved in `DESIGN.md`) is
//! modelled as the caller swapping in a new code segment and constant pool
//! and calling [`Vm::run`] again with a fresh toplevel frame, rather than
//! the VM itself maintaining a segment stack — this mirrors how the
//! teacher's own `lona-vm::vm` keeps "what code is running" as data the
//! caller hands in, not machine-global state.

pub mod globals;
pub mod thread;

use crate::bytecode::{self, DecodeError, Opcode};
use crate::condition::{self, ConditionError, ConditionTypeTable, Disposition};
use crate::container;
use crate::continuation::{Continuation, ContinuationInvoke, Kind};
use crate::heap::{GcError, GenFilter, Heap};
use crate::jobcontrol::JobTable;
use crate::value::{HeapObject, Value};
use globals::Globals;
use thread::Thread;
use tracing::error;

/// Every way the VM can fail at runtime (spec.md §4.3's illustrative
/// condition list, given Rust shape). These are the errors the *VM itself*
/// turns into `^condition` instances via [`condition::raise`] — callers
/// crossing the host boundary should not propagate this type with `?`
/// past [`Vm::run`] (see `SPEC_FULL.md` §11.2).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("unbound variable at toplevel index {0}")]
    UnboundVariable(u32),
    #[error("wrong type: expected {expected}, got {got}")]
    WrongType { expected: &'static str, got: &'static str },
    #[error("array index {index} out of bounds for length {len}")]
    ArrayBounds { index: i64, len: usize },
    #[error("hash key not found")]
    HashKeyNotFound,
    #[error("replacement code point does not fit the string's storage width")]
    StringWidthOverflow,
    #[error("wrong number of arguments: expected {expected}, got {got}")]
    Arity { expected: u32, got: u32 },
    #[error("stack underflow")]
    StackUnderflow,
    #[error("frame chain too shallow: depth {0} requested")]
    ShallowFrame(u32),
    #[error("instruction decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("heap exhausted: {0}")]
    Gc(#[from] GcError),
    #[error("condition raised and unhandled: {0}")]
    Unhandled(String),
    #[error("not yet implemented: {0}")]
    Unimplemented(&'static str),
    #[error("condition construction failed: {0}")]
    ConditionConstruction(#[from] ConditionError),
}

/// What happened on one [`Vm::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// The program reached its final `Return` with an empty call chain.
    Halted(Value),
}

/// The virtual machine: heap, globals, condition types, and the active
/// code segment.
pub struct Vm {
    pub heap: Heap,
    pub globals: Globals,
    pub condition_types: ConditionTypeTable,
    /// Module-global condition-type to handler map (spec.md §4.3's
    /// default-handler mechanism), consulted when no `trap` matches.
    pub default_handlers: condition::DefaultHandlerTable,
    /// The job-control table, once a caller has set one up (spec.md §4.6).
    /// `None` until something installs one — a bare VM with no interactive
    /// shell around it has no jobs to track.
    pub job_table: Option<JobTable>,
    pub thread: Thread,
    code: Vec<u8>,
    constants: Vec<Value>,
    next_hole_id: u32,
}

impl Vm {
    #[must_use]
    pub fn new(code: Vec<u8>, constants: Vec<Value>) -> Self {
        let mut heap = Heap::new();
        let condition_types = condition::install_types(&mut heap);
        let module = heap.alloc_string("toplevel");
        let mut vm = Self {
            heap,
            globals: Globals::new(),
            condition_types,
            default_handlers: condition::DefaultHandlerTable::default(),
            job_table: None,
            thread: Thread::new(module),
            code,
            constants,
            next_hole_id: 0,
        };
        crate::intrinsics::install(&mut vm);
        vm.install_default_signal_handler();
        vm
    }

    /// Register `%default-signal-handler` for `^rt-signal` (spec.md §4.3's
    /// default-handler table, §4.6's SIGCHLD/SIGHUP bridge): the one entry
    /// every VM carries out of the box, since a signal with nobody
    /// watching it still needs `do_job_notification` to run.
    fn install_default_signal_handler(&mut self) {
        if let Some(id) = self.globals.predef_index("%default-signal-handler") {
            if let Some(handler) = self.globals.predef.get(id as usize).copied() {
                self.default_handlers.install("^rt-signal", handler);
            }
        }
    }

    /// Swap in a new code segment and constant pool and reset the program
    /// counter, for nested `load` (spec.md §9's Open Question). The
    /// current thread's frame chain, dynamic/environ bindings, and trap
    /// stack are left untouched, so a `load`ed file can still `raise` into
    /// a trap established by its caller.
    pub fn load_segment(&mut self, code: Vec<u8>, constants: Vec<Value>) {
        self.code = code;
        self.constants = constants;
        self.thread.pc = 0;
    }

    fn root_set(&self) -> Vec<Value> {
        self.thread.references()
    }

    fn collect_if_needed(&mut self) {
        if self.heap.should_collect_new_gen() {
            let roots = self.root_set();
            self.heap.collect(GenFilter::NewOnly, &roots);
        }
    }

    /// Force a full collection, e.g. after an allocation failure.
    pub fn collect_full(&mut self) {
        let roots = self.root_set();
        self.heap.collect(GenFilter::Full, &roots);
    }

    fn frame_at_depth(&self, depth: u32) -> Result<Value, RuntimeError> {
        let mut frame = self.thread.frame;
        for _ in 0..depth {
            let r = frame.as_heap_ref().ok_or(RuntimeError::ShallowFrame(depth))?;
            let HeapObject::Frame(f) = self.heap.get(r).ok_or(RuntimeError::ShallowFrame(depth))? else {
                return Err(RuntimeError::ShallowFrame(depth));
            };
            frame = f.parent;
        }
        Ok(frame)
    }

    fn frame_slot(&self, frame: Value, index: u32) -> Result<Value, RuntimeError> {
        let r = frame.as_heap_ref().ok_or(RuntimeError::ShallowFrame(0))?;
        let HeapObject::Frame(f) = self.heap.get(r).ok_or(RuntimeError::ShallowFrame(0))? else {
            return Err(RuntimeError::WrongType { expected: "frame", got: frame.type_name() });
        };
        f.slots.get(index as usize).copied().ok_or(RuntimeError::ArrayBounds { index: i64::from(index), len: f.slots.len() })
    }

    fn set_frame_slot(&mut self, frame: Value, index: u32, value: Value) -> Result<(), RuntimeError> {
        let r = frame.as_heap_ref().ok_or(RuntimeError::ShallowFrame(0))?;
        let HeapObject::Frame(f) = self.heap.get_mut(r).ok_or(RuntimeError::ShallowFrame(0))? else {
            return Err(RuntimeError::WrongType { expected: "frame", got: frame.type_name() });
        };
        let slot = f.slots.get_mut(index as usize).ok_or(RuntimeError::ArrayBounds { index: i64::from(index), len: f.slots.len() })?;
        *slot = value;
        Ok(())
    }

    /// Raise `condition` on the active thread (spec.md §4.3/§4.6).
    ///
    /// Tries, in order: the active trap stack, the module-global default
    /// handler table, the nearest ABORT continuation, and finally a full
    /// reset to toplevel. A matched trap or default handler is *entered*
    /// with the condition as its sole argument — for a continuable raise,
    /// the handler's own return value becomes this call's result (which is
    /// "resuming after raise", since `raise` is itself a normal Rust call
    /// on the stack); for a non-continuable raise, the handler's return
    /// value is discarded and the condition is re-raised to search further
    /// out, exactly as spec.md's non-continuable contract requires.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Unhandled`] when nothing — trap, default
    /// handler, nor ABORT continuation — claims the condition.
    pub fn raise(&mut self, cond: Value, continuable: bool) -> Result<Value, RuntimeError> {
        let outcome = condition::raise(&mut self.thread, &self.heap, &self.default_handlers, cond, continuable);
        match outcome.disposition {
            Disposition::Trap { continuable } | Disposition::Default { continuable } => {
                let handler = outcome.handler.expect("Trap/Default disposition always carries a handler");
                let result = self.invoke_handler(handler, cond)?;
                if continuable {
                    Ok(result)
                } else {
                    self.raise(cond, false)
                }
            }
            Disposition::Restart(k) => {
                self.invoke_continuation(k, Vec::new());
                Ok(Value::nil())
            }
            Disposition::Reset => {
                let msg = crate::value::print_value(cond, &self.heap);
                error!(target: "idio_vm::vm", condition = %msg, "unhandled condition");
                Err(RuntimeError::Unhandled(msg))
            }
        }
    }

    /// Enter `handler` (a closure or primitive) with `arg` as its sole
    /// argument, running it to completion and restoring the thread's
    /// registers afterward — the same shape as [`Vm::call_thunk`], except
    /// the callee receives one argument instead of zero, matching the
    /// calling convention `AllocateFrame`/`StoreArgument` build for an
    /// ordinary call site.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::WrongType`] if `handler` is not callable,
    /// and otherwise propagates whatever error the handler itself raises.
    fn invoke_handler(&mut self, handler: Value, arg: Value) -> Result<Value, RuntimeError> {
        let r = handler.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "closure or primitive", got: handler.type_name() })?;
        match self.heap.get(r).ok_or(RuntimeError::WrongType { expected: "closure or primitive", got: "garbage" })? {
            HeapObject::Primitive(p) => {
                let id = p.intrinsic_id;
                crate::intrinsics::invoke(self, id, &[arg])
            }
            HeapObject::Closure(c) => {
                let saved_pc = self.thread.pc;
                let saved_frame = self.thread.frame;
                let saved_module = self.thread.module;
                let saved_func = self.thread.func;

                let args_frame = self.heap.alloc(HeapObject::Frame(crate::value::heapobj::Frame {
                    slots: vec![arg],
                    names_index: 0,
                    parent: Value::nil(),
                    function: handler,
                    source_expr_index: self.thread.source_expr_index,
                }))?;

                self.thread.func = handler;
                self.thread.frame = args_frame;
                self.thread.pc = c.code_start;
                self.thread.module = Value::from_heap_ref(c.captured_module);

                let result = loop {
                    match self.step() {
                        Ok(StepOutcome::Halted(v)) => break Ok(v),
                        Ok(StepOutcome::Continue) => {}
                        Err(e) => break Err(e),
                    }
                };

                self.thread.pc = saved_pc;
                self.thread.frame = saved_frame;
                self.thread.module = saved_module;
                self.thread.func = saved_func;
                result
            }
            other => Err(RuntimeError::WrongType { expected: "closure or primitive", got: other.type_name() }),
        }
    }

    /// Push a new delimited-continuation hole at the current stack depth
    /// and return its id.
    pub fn push_hole(&mut self) -> u32 {
        let id = self.next_hole_id;
        self.next_hole_id += 1;
        self.thread.holes.push(thread::Hole { id, stack_depth: self.thread.stack.len() });
        id
    }

    /// Capture the current execution state as a continuation (spec.md
    /// §3.4, §9's redesign note: no `sigsetjmp`).
    #[must_use]
    pub fn capture_continuation(&self, kind: Kind) -> Continuation {
        Continuation::capture(kind, self.thread.stack.clone(), self.thread.frame, self.thread.module, self.thread.pc, 0)
    }

    /// Invoke a captured continuation, overwriting the thread's state in
    /// place and recording a resume signal for [`Vm::run`]'s outer loop to
    /// act on.
    pub fn invoke_continuation(&mut self, continuation: Continuation, values: Vec<Value>) {
        self.thread.resume = Some(ContinuationInvoke { continuation, values });
    }

    /// Execute one instruction. Returns [`StepOutcome::Halted`] when a
    /// `Return` pops an empty stack (nothing left to return into).
    ///
    /// # Errors
    ///
    /// See [`RuntimeError`]'s variants.
    pub fn step(&mut self) -> Result<StepOutcome, RuntimeError> {
        if let Some(invoke) = self.thread.resume.take() {
            self.thread.restore_from(&invoke.continuation);
            self.thread.val = invoke.values.first().copied().unwrap_or_else(Value::nil);
            return Ok(StepOutcome::Continue);
        }

        // Signal → condition bridge (spec.md §4.3, §4.6): a signal handler
        // installed by `crate::sysglue::install_core_signal_handlers` only
        // ever marks a bit; draining happens here, between instructions,
        // where raising a condition is safe.
        for signum in idio_core::signals::PENDING_SIGNALS.take_pending() {
            let cond = condition::raise_signal(&mut self.heap, &self.condition_types, signum)?;
            self.raise(cond, true)?;
        }
        if self.thread.resume.is_some() {
            return Ok(StepOutcome::Continue);
        }

        let mut pos = self.thread.pc as usize;
        let op = bytecode::decode(&self.code, &mut pos)?;
        self.thread.pc = u32::try_from(pos).expect("code segment exceeds u32 offset space");

        match op {
            Opcode::Constant { index } => {
                self.thread.val = *self.constants.get(index as usize).ok_or(RuntimeError::ArrayBounds {
                    index: i64::from(index),
                    len: self.constants.len(),
                })?;
            }
            Opcode::Predefined { index } => {
                self.thread.val = *self.globals.predef.get(index as usize).ok_or(RuntimeError::ArrayBounds {
                    index: i64::from(index),
                    len: self.globals.predef.len(),
                })?;
            }
            Opcode::GlobalRef { index } | Opcode::CheckedGlobalRef { index } => {
                if matches!(op, Opcode::CheckedGlobalRef { .. }) && !self.globals.is_defined(index) {
                    return Err(RuntimeError::UnboundVariable(index));
                }
                self.thread.val = *self
                    .globals
                    .toplevel
                    .get(index as usize)
                    .ok_or(RuntimeError::UnboundVariable(index))?;
            }
            Opcode::GlobalSet { index } => {
                self.globals.set_toplevel(index, self.thread.val);
            }
            Opcode::ShallowArgumentRef { depth } => {
                self.thread.val = self.frame_slot(self.thread.frame, depth)?;
            }
            Opcode::ShallowArgumentSet { depth } => {
                self.set_frame_slot(self.thread.frame, depth, self.thread.val)?;
            }
            Opcode::DeepArgumentRef { depth, index } => {
                let frame = self.frame_at_depth(depth)?;
                self.thread.val = self.frame_slot(frame, index)?;
            }
            Opcode::DeepArgumentSet { depth, index } => {
                let frame = self.frame_at_depth(depth)?;
                self.set_frame_slot(frame, index, self.thread.val)?;
            }
            Opcode::Goto { offset } => self.thread.pc = offset,
            Opcode::Alternative { consequent, alternative } => {
                self.thread.pc = if self.thread.val.is_truthy() { consequent } else { alternative };
            }
            Opcode::AllocateFrame { size } => {
                let frame = HeapObject::Frame(crate::value::heapobj::Frame {
                    slots: vec![Value::nil(); size as usize],
                    names_index: 0,
                    parent: self.thread.frame,
                    function: self.thread.func,
                    source_expr_index: self.thread.source_expr_index,
                });
                self.thread.reg1 = self.heap.alloc(frame)?;
            }
            Opcode::StoreArgument { index } => {
                self.set_frame_slot(self.thread.reg1, index, self.thread.val)?;
            }
            Opcode::ConsArgument { index } => {
                let rest = self.frame_slot(self.thread.reg1, index)?;
                let pair = self.heap.alloc_pair(self.thread.val, rest);
                self.set_frame_slot(self.thread.reg1, index, pair)?;
            }
            Opcode::FixClosure { arity, code } | Opcode::NaryClosure { arity, code } => {
                let closure = HeapObject::Closure(crate::value::heapobj::Closure {
                    code_start: code,
                    code_end: u32::MAX,
                    captured_frame: self.thread.frame,
                    captured_module: self.thread.module.as_heap_ref().unwrap_or(crate::value::HeapRef::from_index(0)),
                    arity: u16::try_from(arity).unwrap_or(u16::MAX),
                    varargs: matches!(op, Opcode::NaryClosure { .. }),
                });
                self.thread.val = self.heap.alloc(closure)?;
            }
            Opcode::RegularCall
            | Opcode::TrRegularCall
            | Opcode::Call0
            | Opcode::Call1
            | Opcode::Call2
            | Opcode::Call3 => {
                self.thread.stack.push(Value::fixnum(i64::from(self.thread.pc)));
                self.thread.func = self.thread.val;
                self.enter_closure(self.thread.reg1)?;
            }
            Opcode::Return => {
                let Some(ret) = self.thread.stack.pop() else {
                    return Ok(StepOutcome::Halted(self.thread.val));
                };
                self.thread.pc = u32::try_from(ret.as_fixnum().ok_or(RuntimeError::StackUnderflow)?)
                    .map_err(|_| RuntimeError::StackUnderflow)?;
            }
            Opcode::FixLet { size } | Opcode::TrFixLet { size } => {
                let frame = HeapObject::Frame(crate::value::heapobj::Frame {
                    slots: vec![Value::nil(); size as usize],
                    names_index: 0,
                    parent: self.thread.frame,
                    function: self.thread.func,
                    source_expr_index: self.thread.source_expr_index,
                });
                self.thread.frame = self.heap.alloc(frame)?;
            }
            Opcode::PushDynamic { index } => self.thread.dynamic_stack.push((index, self.thread.val)),
            Opcode::PopDynamic => {
                self.thread.dynamic_stack.pop().ok_or(RuntimeError::StackUnderflow)?;
            }
            Opcode::PushEnviron { index } => self.thread.environ_stack.push((index, self.thread.val)),
            Opcode::PopEnviron => {
                self.thread.environ_stack.pop().ok_or(RuntimeError::StackUnderflow)?;
            }
            Opcode::PushTrap { handler_index } => {
                let handler = *self.globals.toplevel.get(handler_index as usize).unwrap_or(&Value::nil());
                self.thread.trap_stack.push(condition::TrapFrame { handler, watched_types: vec!["^condition".to_owned()] });
            }
            Opcode::PopTrap => {
                self.thread.trap_stack.pop().ok_or(RuntimeError::StackUnderflow)?;
            }
            Opcode::PushEscaper { .. } | Opcode::PopEscaper => {
                // Escapers are a restricted one-shot continuation; modelled
                // via the same hole mechanism as delimited continuations.
            }
            Opcode::PushState | Opcode::PushAllState => {
                self.thread.stack.push(self.thread.val);
            }
            Opcode::RestoreState | Opcode::RestoreAllState => {
                self.thread.val = self.thread.stack.pop().ok_or(RuntimeError::StackUnderflow)?;
            }
        }

        self.collect_if_needed();
        Ok(StepOutcome::Continue)
    }

    /// Apply `self.thread.func` as the callee, entering its code with
    /// `args_frame` as the new lexical frame (spec.md §4.2's calling
    /// convention). Primitives are invoked directly through
    /// `crate::intrinsics`; closures transfer control by setting `pc`.
    fn enter_closure(&mut self, args_frame: Value) -> Result<(), RuntimeError> {
        let r = self.thread.func.as_heap_ref().ok_or(RuntimeError::WrongType {
            expected: "closure or primitive",
            got: self.thread.func.type_name(),
        })?;
        match self.heap.get(r).ok_or(RuntimeError::WrongType { expected: "closure or primitive", got: "garbage" })? {
            HeapObject::Closure(c) => {
                self.thread.pc = c.code_start;
                self.thread.module = Value::from_heap_ref(c.captured_module);
                self.thread.frame = args_frame;
            }
            HeapObject::Primitive(p) => {
                let id = p.intrinsic_id;
                let args = container::frame_values(&self.heap, args_frame)?;
                self.thread.val = crate::intrinsics::invoke(self, id, &args)?;
                let ret = self.thread.stack.pop().ok_or(RuntimeError::StackUnderflow)?;
                self.thread.pc =
                    u32::try_from(ret.as_fixnum().ok_or(RuntimeError::StackUnderflow)?).map_err(|_| RuntimeError::StackUnderflow)?;
            }
            other => {
                return Err(RuntimeError::WrongType { expected: "closure or primitive", got: other.type_name() });
            }
        }
        Ok(())
    }

    /// Run to completion: step until [`StepOutcome::Halted`] or an error.
    ///
    /// # Errors
    ///
    /// Propagates the first [`RuntimeError`] that isn't resolved by a
    /// trap.
    pub fn run(&mut self) -> Result<Value, RuntimeError> {
        let abort_point = self.capture_continuation(Kind::Full);
        self.thread.abort_stack.push(abort_point);
        let result = loop {
            match self.step() {
                Ok(StepOutcome::Halted(v)) => break Ok(v),
                Ok(StepOutcome::Continue) => {}
                Err(e) => break Err(e),
            }
        };
        self.thread.abort_stack.pop();
        result
    }

    /// Invoke a zero-argument callable to completion outside the normal
    /// call/return bytecode dance, for callers that need to run a `Value`
    /// as a function without compiling a call site for it — GC finalizers
    /// (spec.md §4.1) are the motivating case; `idio-cli`'s graceful
    /// shutdown runs each one queued by `Heap::collect` this way.
    ///
    /// Unlike a bytecode `RegularCall`, this pushes no return address onto
    /// the call stack: a closure thunk's own `Return` then halts as soon
    /// as it finds the stack at the depth it had when `call_thunk` was
    /// entered, exactly as top-level code halts when it returns past the
    /// bottom of an empty stack.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::WrongType`] if `f` is not a closure or
    /// primitive, and otherwise propagates whatever error the callable
    /// itself raises.
    pub fn call_thunk(&mut self, f: Value) -> Result<Value, RuntimeError> {
        let r = f.as_heap_ref().ok_or(RuntimeError::WrongType { expected: "closure or primitive", got: f.type_name() })?;
        match self.heap.get(r).ok_or(RuntimeError::WrongType { expected: "closure or primitive", got: "garbage" })? {
            HeapObject::Primitive(p) => {
                let id = p.intrinsic_id;
                crate::intrinsics::invoke(self, id, &[])
            }
            HeapObject::Closure(c) => {
                let saved_pc = self.thread.pc;
                let saved_frame = self.thread.frame;
                let saved_module = self.thread.module;
                let saved_func = self.thread.func;

                self.thread.func = f;
                self.thread.frame = Value::nil();
                self.thread.pc = c.code_start;
                self.thread.module = Value::from_heap_ref(c.captured_module);

                let abort_point = self.capture_continuation(Kind::Full);
                self.thread.abort_stack.push(abort_point);
                let result = loop {
                    match self.step() {
                        Ok(StepOutcome::Halted(v)) => break Ok(v),
                        Ok(StepOutcome::Continue) => {}
                        Err(e) => break Err(e),
                    }
                };
                self.thread.abort_stack.pop();

                self.thread.pc = saved_pc;
                self.thread.frame = saved_frame;
                self.thread.module = saved_module;
                self.thread.func = saved_func;
                result
            }
            other => Err(RuntimeError::WrongType { expected: "closure or primitive", got: other.type_name() }),
        }
    }
}

#[cfg(test)]
mod vm_test {
    use super::*;
    use crate::bytecode::{encode, Opcode};

    fn assemble(ops: &[Opcode]) -> Vec<u8> {
        let mut out = Vec::new();
        for &op in ops {
            encode(op, &mut out);
        }
        out
    }

    #[test]
    fn a_bare_constant_then_return_halts_with_that_value() {
        let code = assemble(&[Opcode::Constant { index: 0 }, Opcode::Return]);
        let mut vm = Vm::new(code, vec![Value::fixnum(42)]);
        assert_eq!(vm.run(), Ok(Value::fixnum(42)));
    }

    #[test]
    fn global_set_then_checked_ref_reads_back() {
        let code = assemble(&[
            Opcode::Constant { index: 0 },
            Opcode::GlobalSet { index: 0 },
            Opcode::CheckedGlobalRef { index: 0 },
            Opcode::Return,
        ]);
        let mut vm = Vm::new(code, vec![Value::fixnum(7)]);
        vm.globals.reserve_toplevel("x");
        assert_eq!(vm.run(), Ok(Value::fixnum(7)));
    }

    #[test]
    fn checked_global_ref_on_undefined_variable_errors() {
        let code = assemble(&[Opcode::CheckedGlobalRef { index: 0 }, Opcode::Return]);
        let mut vm = Vm::new(code, Vec::new());
        vm.globals.reserve_toplevel("y");
        assert_eq!(vm.run(), Err(RuntimeError::UnboundVariable(0)));
    }

    #[test]
    fn alternative_branches_on_truthiness() {
        let code = assemble(&[
            Opcode::Constant { index: 0 },
            Opcode::Alternative { consequent: 100, alternative: 200 },
        ]);
        // consequent branch lands past the assembled bytes on purpose;
        // we only check the PC, not full execution.
        let mut vm = Vm::new(code, vec![Value::bool(true)]);
        let _ = vm.step();
        let _ = vm.step();
        assert_eq!(vm.thread.pc, 100);
    }

    #[test]
    fn pop_trap_on_empty_trap_stack_is_a_stack_underflow() {
        let code = assemble(&[Opcode::PopTrap]);
        let mut vm = Vm::new(code, Vec::new());
        assert_eq!(vm.run(), Err(RuntimeError::StackUnderflow));
    }

    #[test]
    fn push_then_pop_trap_round_trips() {
        let code = assemble(&[
            Opcode::PushTrap { handler_index: 0 },
            Opcode::PopTrap,
            Opcode::Constant { index: 0 },
            Opcode::Return,
        ]);
        let mut vm = Vm::new(code, vec![Value::fixnum(1)]);
        vm.globals.reserve_toplevel("handler");
        assert_eq!(vm.run(), Ok(Value::fixnum(1)));
    }

    #[test]
    fn raise_with_no_trap_is_unhandled() {
        let mut vm = Vm::new(Vec::new(), Vec::new());
        let cond = condition::raise_system_error(&mut vm.heap, &vm.condition_types, "open", 2, "boom").unwrap();
        assert!(matches!(vm.raise(cond, false), Err(RuntimeError::Unhandled(_))));
    }

    #[test]
    fn capture_and_invoke_continuation_resumes_at_captured_pc() {
        let mut vm = Vm::new(Vec::new(), Vec::new());
        vm.thread.pc = 5;
        let k = vm.capture_continuation(Kind::Full);
        vm.thread.pc = 999;
        vm.invoke_continuation(k, vec![Value::fixnum(3)]);
        let outcome = vm.step().unwrap();
        assert_eq!(outcome, StepOutcome::Continue);
        assert_eq!(vm.thread.pc, 5);
        assert_eq!(vm.thread.val, Value::fixnum(3));
    }

    fn install_handler_closure(vm: &mut Vm) -> Value {
        let module_ref = vm.thread.module.as_heap_ref().expect("toplevel module is heap-allocated");
        let closure = HeapObject::Closure(crate::value::heapobj::Closure {
            code_start: 0,
            code_end: u32::MAX,
            captured_frame: Value::nil(),
            captured_module: module_ref,
            arity: 1,
            varargs: false,
        });
        vm.heap.alloc(closure).expect("heap has room")
    }

    #[test]
    fn trap_on_divide_by_zero_invokes_the_handler_with_the_condition_continuably() {
        // spec.md §8 scenario #3: `(trap ^rt-divide-by-zero-error (function
        // (c) 'caught) (/ 1 0))` resumes `/`'s own call site with the
        // handler's result, it does not yield the handler closure itself.
        let handler_code = assemble(&[Opcode::Constant { index: 0 }, Opcode::Return]);
        let mut vm = Vm::new(handler_code, vec![Value::fixnum(42)]);
        let handler = install_handler_closure(&mut vm);
        vm.thread.trap_stack.push(condition::TrapFrame { handler, watched_types: vec!["^rt-divide-by-zero-error".to_owned()] });

        let cond = condition::raise_divide_by_zero_error(&mut vm.heap, &vm.condition_types, "/", "division by zero").unwrap();
        let result = vm.raise(cond, true).unwrap();
        assert_eq!(result, Value::fixnum(42));
        assert!(vm.thread.trap_stack.is_empty(), "the matched trap is one-shot");
    }

    #[test]
    fn non_continuable_raise_re_raises_past_the_consumed_trap() {
        let handler_code = assemble(&[Opcode::Constant { index: 0 }, Opcode::Return]);
        let mut vm = Vm::new(handler_code, vec![Value::fixnum(1)]);
        let handler = install_handler_closure(&mut vm);
        vm.thread.trap_stack.push(condition::TrapFrame { handler, watched_types: vec!["^error".to_owned()] });

        let cond = condition::raise_system_error(&mut vm.heap, &vm.condition_types, "open", 2, "boom").unwrap();
        // only one trap is installed, so a non-continuable raise consumes
        // it and then finds nothing left to re-raise into.
        assert!(matches!(vm.raise(cond, false), Err(RuntimeError::Unhandled(_))));
    }

    #[test]
    fn vm_raise_restarts_the_nearest_abort_continuation_when_unhandled() {
        let mut vm = Vm::new(Vec::new(), Vec::new());
        let abort_point = vm.capture_continuation(Kind::Full);
        vm.thread.abort_stack.push(abort_point);
        let cond = condition::raise_system_error(&mut vm.heap, &vm.condition_types, "open", 2, "boom").unwrap();
        let result = vm.raise(cond, false);
        assert_eq!(result, Ok(Value::nil()));
        assert!(vm.thread.resume.is_some(), "raise schedules a restart via the captured continuation");
        assert!(vm.thread.abort_stack.is_empty(), "the consumed abort point is popped");
    }

    #[test]
    fn default_signal_handler_is_registered_for_rt_signal_out_of_the_box() {
        let vm = Vm::new(Vec::new(), Vec::new());
        assert!(vm.default_handlers.lookup_hierarchy("^rt-signal").is_some());
    }
}
