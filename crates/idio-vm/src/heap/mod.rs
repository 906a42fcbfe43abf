// SPDX-License-Identifier: GPL-3.0-or-later

//! Tri-colour mark-and-sweep garbage collector with two generations
//! (spec.md §4.1).
//!
//! The heap is a plain `Vec`-backed arena of slots rather than raw
//! pointers; a [`crate::value::HeapRef`] is an index into it. This mirrors
//! the teacher's `lona-vm` arena design, generalized from a single bump
//! arena to a real collector: freed slots go back on a free list and are
//! reused by later allocations.
//!
//! The collector does not drive itself — it has no notion of "VM stack" or
//! "registers". Callers (`crate::vm::Vm`) decide when to collect and supply
//! the current root set explicitly via [`Heap::collect`]. This keeps the
//! heap testable in isolation (see `heap_test.rs`), matching the layering
//! the teacher keeps between `lona-vm::heap` and `lona-vm::vm`.


use crate::string::IdioString;
use crate::symbol::SymbolTable;
use crate::value::{HeapObject, HeapRef, Value};
use std::collections::HashMap;
use tracing::debug;

/// Tri-colour mark bit (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

/// Which generation an object currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    New,
    Old,
}

/// Which generations a collection pass should sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenFilter {
    NewOnly,
    Full,
}

struct Slot {
    object: HeapObject,
    color: Color,
    generation: Generation,
    /// Reference count from [`Heap::protect`]; while nonzero, the slot is
    /// an implicit root regardless of graph reachability.
    protect_count: u32,
}

/// Statistics from one [`Heap::collect`] call, logged at `debug` by the
/// caller (spec.md §11.1: GC cycles log generation, objects found/freed,
/// pause durations — the duration itself is timed by the caller, since the
/// heap has no clock dependency).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub examined: usize,
    pub freed: usize,
    pub promoted: usize,
}

/// Errors the GC-visible allocation contract can raise (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GcError {
    #[error("heap exhausted: {used} slots in use, cap is {cap}")]
    OutOfMemory { used: usize, cap: usize },
}

/// The heap: an arena of slots plus the symbol intern table (interning has
/// to allocate through here, since an interned symbol is a GC-managed heap
/// object like any other).
pub struct Heap {
    slots: Vec<Option<Slot>>,
    free_list: Vec<u32>,
    symbols: SymbolTable,
    weak: Vec<HeapRef>,
    finalizers: HashMap<u32, Value>,
    pause_depth: u32,
    /// Soft cap; `None` means unbounded (the default, and what every test
    /// other than the OOM test uses).
    max_slots: Option<usize>,
    new_gen_count: usize,
    /// Threshold of live new-generation objects past which
    /// [`Heap::should_collect_new_gen`] recommends a minor collection.
    new_gen_threshold: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            symbols: SymbolTable::new(),
            weak: Vec::new(),
            finalizers: HashMap::new(),
            pause_depth: 0,
            max_slots: None,
            new_gen_count: 0,
            new_gen_threshold: 4096,
        }
    }

    #[must_use]
    pub fn with_max_slots(max_slots: usize) -> Self {
        Self { max_slots: Some(max_slots), ..Self::new() }
    }

    // --- Allocation ---------------------------------------------------

    /// Allocate a heap object, returning its [`Value`] wrapper.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::OutOfMemory`] if a cap was set via
    /// [`Self::with_max_slots`] and is still exceeded after accounting for
    /// the free list (the caller is expected to have already run a full
    /// collection and retried before treating this as fatal).
    pub fn alloc(&mut self, object: HeapObject) -> Result<Value, GcError> {
        let r = self.alloc_raw(object)?;
        Ok(Value::from_heap_ref(r))
    }

    /// As [`Self::alloc`], but returns the raw [`HeapRef`] rather than a
    /// boxed [`Value`] — used internally when constructing composite
    /// objects (e.g. a substring's parent pointer) that need the ref
    /// before wrapping it.
    pub fn alloc_raw(&mut self, object: HeapObject) -> Result<HeapRef, GcError> {
        if let Some(cap) = self.max_slots {
            let used = self.slots.len() - self.free_list.len();
            if used >= cap && self.free_list.is_empty() {
                return Err(GcError::OutOfMemory { used, cap });
            }
        }
        let slot = Slot { object, color: Color::White, generation: Generation::New, protect_count: 0 };
        let index = if let Some(i) = self.free_list.pop() {
            self.slots[i as usize] = Some(slot);
            i
        } else {
            let i = u32::try_from(self.slots.len()).expect("heap arena exceeds u32 index space");
            self.slots.push(Some(slot));
            i
        };
        self.new_gen_count += 1;
        Ok(HeapRef::from_index(index))
    }

    /// Convenience constructor used throughout the VM and by tests: allocate
    /// an owned string. Never fails in practice (no cap set) but surfaces
    /// the same [`GcError`] contract as everything else for consistency;
    /// call sites that never set a cap unwrap freely, matching how the
    /// teacher's arena allocator is used in its own tests.
    pub fn alloc_string(&mut self, s: &str) -> Value {
        self.alloc(HeapObject::String(IdioString::from_str(s))).expect("unbounded heap alloc cannot fail")
    }

    pub fn alloc_pair(&mut self, head: Value, tail: Value) -> Value {
        self.alloc(HeapObject::Pair(crate::value::heapobj::Pair { head, tail }))
            .expect("unbounded heap alloc cannot fail")
    }

    // --- Symbols --------------------------------------------------------

    /// Intern a symbol by name, allocating it on first use (spec.md §3.3).
    pub fn intern(&mut self, name: &str) -> Value {
        if let Some(r) = self.symbols.lookup(name) {
            return Value::from_heap_ref(r);
        }
        let r = self
            .alloc_raw(HeapObject::Symbol(IdioString::from_str(name)))
            .expect("unbounded heap alloc cannot fail");
        self.symbols.register(name, r);
        Value::from_heap_ref(r)
    }

    /// Allocate a fresh, never-interned symbol (spec.md's GLOSSARY `gensym` entry).
    pub fn gensym(&mut self) -> Value {
        let name = self.symbols.next_gensym_name();
        self.alloc(HeapObject::Symbol(IdioString::from_str(&name))).expect("unbounded heap alloc cannot fail")
    }

    // --- Access -----------------------------------------------------------

    #[must_use]
    pub fn get(&self, r: HeapRef) -> Option<&HeapObject> {
        self.slots.get(r.index())?.as_ref().map(|s| &s.object)
    }

    pub fn get_mut(&mut self, r: HeapRef) -> Option<&mut HeapObject> {
        self.slots.get_mut(r.index())?.as_mut().map(|s| &mut s.object)
    }

    #[must_use]
    pub fn is_live(&self, r: HeapRef) -> bool {
        matches!(self.slots.get(r.index()), Some(Some(_)))
    }

    // --- Protection / finalizers / weak refs -------------------------------

    /// Pin an object as an implicit root, independent of graph
    /// reachability (spec.md §4.1's `protect`). Reference-counted: call
    /// [`Self::expose`] an equal number of times to release.
    pub fn protect(&mut self, r: HeapRef) {
        if let Some(Some(slot)) = self.slots.get_mut(r.index()) {
            slot.protect_count += 1;
        }
    }

    pub fn expose(&mut self, r: HeapRef) {
        if let Some(Some(slot)) = self.slots.get_mut(r.index()) {
            slot.protect_count = slot.protect_count.saturating_sub(1);
        }
    }

    /// RAII guard form of [`Self::protect`]/[`Self::expose`], used where a
    /// Rust scope maps cleanly onto the protection lifetime (spec.md's
    /// `protect_auto`).
    pub fn protect_auto(&mut self, r: HeapRef) -> ProtectGuard<'_> {
        self.protect(r);
        ProtectGuard { heap: self, r }
    }

    pub fn register_finalizer(&mut self, r: HeapRef, finalizer: Value) {
        self.finalizers.insert(r.index() as u32, finalizer);
    }

    pub fn deregister_finalizer(&mut self, r: HeapRef) {
        self.finalizers.remove(&(r.index() as u32));
    }

    pub fn add_weak(&mut self, r: HeapRef) {
        if !self.weak.contains(&r) {
            self.weak.push(r);
        }
    }

    pub fn remove_weak(&mut self, r: HeapRef) {
        self.weak.retain(|&w| w != r);
    }

    pub fn pause(&mut self) {
        self.pause_depth += 1;
    }

    pub fn resume(&mut self) {
        self.pause_depth = self.pause_depth.saturating_sub(1);
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.pause_depth > 0
    }

    #[must_use]
    pub fn should_collect_new_gen(&self) -> bool {
        !self.is_paused() && self.new_gen_count >= self.new_gen_threshold
    }

    // --- Collection -------------------------------------------------------

    /// Run a mark-and-sweep pass over `filter`'s generations, with `roots`
    /// as the explicit root set (VM stack slots, registers, globals
    /// tables — whatever the caller considers live right now).
    ///
    /// Returns finalizer values queued for any object that was swept; the
    /// caller is responsible for invoking them through the VM's own call
    /// protocol (the heap has no notion of "calling a closure").
    pub fn collect(&mut self, filter: GenFilter, roots: &[Value]) -> (CollectStats, Vec<Value>) {
        if self.is_paused() {
            return (CollectStats::default(), Vec::new());
        }

        for slot in self.slots.iter_mut().flatten() {
            slot.color = Color::White;
        }

        let mut grey_stack: Vec<HeapRef> = Vec::new();
        let mut mark_value = |v: Value, grey_stack: &mut Vec<HeapRef>, slots: &mut [Option<Slot>]| {
            if let Some(r) = v.as_heap_ref() {
                if let Some(Some(slot)) = slots.get_mut(r.index()) {
                    if slot.color == Color::White {
                        slot.color = Color::Grey;
                        grey_stack.push(r);
                    }
                }
            }
        };

        for &root in roots {
            mark_value(root, &mut grey_stack, &mut self.slots);
        }
        // Protected and finalizer-bearing objects are roots too.
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(slot) = slot {
                if slot.protect_count > 0 && slot.color == Color::White {
                    grey_stack.push(HeapRef::from_index(u32::try_from(index).unwrap()));
                }
            }
        }
        for r in &grey_stack {
            if let Some(Some(slot)) = self.slots.get_mut(r.index()) {
                slot.color = Color::Grey;
            }
        }

        let mut examined = 0;
        while let Some(r) = grey_stack.pop() {
            examined += 1;
            let refs = match self.slots.get(r.index()) {
                Some(Some(slot)) => slot.object.references(),
                _ => continue,
            };
            for v in refs {
                mark_value(v, &mut grey_stack, &mut self.slots);
            }
            if let Some(Some(slot)) = self.slots.get_mut(r.index()) {
                slot.color = Color::Black;
            }
        }

        let mut freed = 0;
        let mut promoted = 0;
        let mut finalized = Vec::new();
        self.new_gen_count = 0;
        for index in 0..self.slots.len() {
            let should_sweep_generation = match (&filter, self.slots[index].as_ref().map(|s| s.generation)) {
                (_, None) => false,
                (GenFilter::Full, Some(_)) => true,
                (GenFilter::NewOnly, Some(Generation::New)) => true,
                (GenFilter::NewOnly, Some(Generation::Old)) => false,
            };
            if !should_sweep_generation {
                continue;
            }
            let white = matches!(self.slots[index], Some(ref s) if s.color == Color::White);
            if white {
                let r = HeapRef::from_index(u32::try_from(index).unwrap());
                if let Some(f) = self.finalizers.remove(&(index as u32)) {
                    finalized.push(f);
                }
                self.weak.retain(|&w| w != r);
                self.slots[index] = None;
                self.free_list.push(u32::try_from(index).unwrap());
                freed += 1;
            } else if let Some(slot) = self.slots[index].as_mut() {
                if slot.generation == Generation::New {
                    slot.generation = Generation::Old;
                    promoted += 1;
                }
                self.new_gen_count += usize::from(slot.generation == Generation::New);
            }
        }

        let stats = CollectStats { examined, freed, promoted };
        debug!(
            target: "idio_vm::gc",
            examined = stats.examined,
            freed = stats.freed,
            promoted = stats.promoted,
            "collection cycle complete"
        );
        (stats, finalized)
    }
}

/// RAII guard returned by [`Heap::protect_auto`]: releases the protection
/// when dropped.
pub struct ProtectGuard<'a> {
    heap: &'a mut Heap,
    r: HeapRef,
}

impl Drop for ProtectGuard<'_> {
    fn drop(&mut self) {
        self.heap.expose(self.r);
    }
}
