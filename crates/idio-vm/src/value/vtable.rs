// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-type method tables (spec.md §3.6).
//!
//! Every heap type (and a handful of immediate types) has a [`VTable`]
//! mapping method name to an implementation. Struct types form an
//! inheritance chain via `parent`; a lookup walks up the chain and the
//! result is cached, so each vtable carries a `generation` counter that
//! bumps whenever a method is added or a parent link changes — callers
//! that cached a lookup compare generations before trusting the cache.

use super::Value;
use std::collections::HashMap;

/// A single dispatchable method: either a user closure or a native
/// function, both represented as ordinary [`Value`]s (a closure heap
/// object or a primitive heap object respectively) so dispatch doesn't
/// need a separate calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Method {
    pub implementation: Value,
}

impl Method {
    #[must_use]
    pub const fn new(implementation: Value) -> Self {
        Self { implementation }
    }
}

/// A type's method table plus its place in the inheritance chain.
#[derive(Debug, Clone, Default)]
pub struct VTable {
    methods: HashMap<String, Method>,
    parent: Option<usize>,
    /// Bumped on every mutation of this vtable *or* any ancestor's, so a
    /// cached `(generation, Method)` lookup can detect staleness in O(1)
    /// without re-walking the chain.
    generation: u64,
}

impl VTable {
    #[must_use]
    pub fn new(parent: Option<usize>) -> Self {
        Self { methods: HashMap::new(), parent, generation: 0 }
    }

    #[must_use]
    pub const fn parent(&self) -> Option<usize> {
        self.parent
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_parent(&mut self, parent: Option<usize>) {
        self.parent = parent;
        self.generation += 1;
    }

    pub fn define(&mut self, name: &str, method: Method) {
        self.methods.insert(name.to_owned(), method);
        self.generation += 1;
    }

    /// Look up a method defined directly on this vtable, without walking
    /// `parent`. Chain-walking lookups belong to whatever owns the full
    /// vtable arena (`crate::value::heapobj::StructType` resolution lives
    /// in `crate::vm`, which has access to all vtables by index).
    #[must_use]
    pub fn local(&self, name: &str) -> Option<Method> {
        self.methods.get(name).copied()
    }
}

/// Walk `start`'s inheritance chain looking for `name`, consulting
/// `vtables` (indexed the same way [`VTable::parent`] indexes) for each
/// ancestor. Returns the method and the generation of the vtable it was
/// found on, so callers can build a cache key.
#[must_use]
pub fn resolve<'a>(vtables: &'a [VTable], start: usize, name: &str) -> Option<(Method, u64)> {
    let mut current = Some(start);
    while let Some(idx) = current {
        let vt = vtables.get(idx)?;
        if let Some(m) = vt.local(name) {
            return Some((m, vt.generation));
        }
        current = vt.parent;
    }
    None
}
