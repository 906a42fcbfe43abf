// SPDX-License-Identifier: GPL-3.0-or-later

//! Module lookup and import resolution (spec.md §4.2, `SPEC_FULL.md`
//! §6.2's per-module metadata).
//!
//! `crate::value::heapobj::IdioModule` is the on-heap payload (name,
//! imports, exports); this module is the higher-level registry that wraps
//! it the way `crate::container` wraps arrays, hashes, and struct types —
//! name-based lookup, export binding, and the search-the-import-chain
//! logic `checked-global-ref`-by-symbol-name ultimately needs.

#[cfg(test)]
mod module_test;

use crate::heap::Heap;
use crate::value::heapobj::IdioModule;
use crate::value::{HeapObject, HeapRef, Value};
use std::collections::HashMap;

/// Errors resolving a module or one of its bindings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    #[error("no module named {0:?}")]
    UnknownModule(String),
    #[error("{symbol:?} is not exported by module {module:?}")]
    NotExported { module: String, symbol: String },
    #[error("{0:?} is not bound in any imported module")]
    Unbound(String),
}

/// Process-wide module table, keyed by name.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    by_name: HashMap<String, HeapRef>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, empty module (spec.md §4.2), or return the
    /// existing one if `name` is already registered — module definitions
    /// in Idio are additive across `load`s of the same file.
    pub fn define(&mut self, heap: &mut Heap, name: &str) -> HeapRef {
        if let Some(&r) = self.by_name.get(name) {
            return r;
        }
        let name_value = heap.intern(name);
        let r = heap
            .alloc_raw(HeapObject::Module(IdioModule { name: name_value, imports: Vec::new(), exports: Vec::new() }))
            .expect("unbounded heap alloc cannot fail");
        self.by_name.insert(name.to_owned(), r);
        r
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<HeapRef> {
        self.by_name.get(name).copied()
    }

    /// Resolve a module by name, materializing [`ModuleError::UnknownModule`]
    /// rather than a bare `Option` since every caller needs the name back
    /// for the error message anyway.
    pub fn get(&self, name: &str) -> Result<HeapRef, ModuleError> {
        self.find(name).ok_or_else(|| ModuleError::UnknownModule(name.to_owned()))
    }
}

/// Name of a module heap object, for diagnostics (e.g. disassembly
/// listings, `format-job-info`-style one-liners elsewhere in the crate).
#[must_use]
pub fn module_name(heap: &Heap, module: HeapRef) -> String {
    let HeapObject::Module(m) = heap.get(module).expect("module handle is live") else {
        unreachable!("ModuleRegistry only ever stores Module heap refs")
    };
    symbol_text(heap, m.name)
}

fn symbol_text(heap: &Heap, value: Value) -> String {
    value
        .as_heap_ref()
        .and_then(|r| heap.get(r))
        .map(|obj| match obj {
            HeapObject::Symbol(s) | HeapObject::Keyword(s) => s.to_string(),
            HeapObject::String(s) => s.to_string(),
            _ => String::new(),
        })
        .unwrap_or_default()
}

/// Add `imported`'s handle to `module`'s import list (spec.md §4.2's
/// `import` form), so `resolve_export`/`is_exported` walk it.
///
/// # Panics
///
/// Panics if `module` is not a live `Module` heap object — a bug in the
/// caller, since every `HeapRef` a `ModuleRegistry` hands out is one.
pub fn add_import(heap: &mut Heap, module: HeapRef, imported: HeapRef) {
    let HeapObject::Module(m) = heap.get_mut(module).expect("module handle is live") else {
        panic!("add_import called on a non-Module heap object")
    };
    if !m.imports.contains(&imported) {
        m.imports.push(imported);
    }
}

/// Mark `symbol` as one of `module`'s exports (spec.md §4.2's `export`
/// form). `export`ing a name that is not yet bound is allowed — it only
/// becomes visible to importers once it is, via [`resolve_export`].
pub fn add_export(heap: &mut Heap, module: HeapRef, symbol: &str) {
    let value = heap.intern(symbol);
    let HeapObject::Module(m) = heap.get_mut(module).expect("module handle is live") else {
        panic!("add_export called on a non-Module heap object")
    };
    if !m.exports.iter().any(|&e| e == value) {
        m.exports.push(value);
    }
}

#[must_use]
pub fn is_exported(heap: &Heap, module: HeapRef, symbol: &str) -> bool {
    let HeapObject::Module(m) = heap.get(module).expect("module handle is live") else {
        unreachable!("ModuleRegistry only ever stores Module heap refs")
    };
    m.exports.iter().any(|&e| symbol_text(heap, e) == symbol)
}

/// Find which of `module`'s *imported* modules exports `symbol`,
/// searching depth-first in import order (spec.md §4.2: modules form an
/// import DAG, not a single linear chain).
///
/// # Errors
///
/// Returns [`ModuleError::Unbound`] if no (transitively) imported module
/// exports `symbol`.
pub fn resolve_export(heap: &Heap, module: HeapRef, symbol: &str) -> Result<HeapRef, ModuleError> {
    let mut seen = Vec::new();
    resolve_export_inner(heap, module, symbol, &mut seen).ok_or_else(|| ModuleError::Unbound(symbol.to_owned()))
}

fn resolve_export_inner(heap: &Heap, module: HeapRef, symbol: &str, seen: &mut Vec<HeapRef>) -> Option<HeapRef> {
    if seen.contains(&module) {
        return None;
    }
    seen.push(module);
    let HeapObject::Module(m) = heap.get(module)? else { return None };
    for &import in &m.imports {
        if is_exported(heap, import, symbol) {
            return Some(import);
        }
    }
    for &import in &m.imports {
        if let Some(found) = resolve_export_inner(heap, import, symbol, seen) {
            return Some(found);
        }
    }
    None
}
