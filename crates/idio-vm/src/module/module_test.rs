// SPDX-License-Identifier: GPL-3.0-or-later

use super::*;

#[test]
fn defining_the_same_name_twice_returns_the_same_module() {
    let mut heap = Heap::new();
    let mut registry = ModuleRegistry::new();
    let a = registry.define(&mut heap, "job-control");
    let b = registry.define(&mut heap, "job-control");
    assert_eq!(a, b);
}

#[test]
fn get_fails_for_an_unregistered_name() {
    let registry = ModuleRegistry::new();
    assert_eq!(registry.get("nope"), Err(ModuleError::UnknownModule("nope".to_owned())));
}

#[test]
fn module_name_round_trips() {
    let mut heap = Heap::new();
    let mut registry = ModuleRegistry::new();
    let m = registry.define(&mut heap, "toplevel");
    assert_eq!(module_name(&heap, m), "toplevel");
}

#[test]
fn export_is_visible_through_is_exported() {
    let mut heap = Heap::new();
    let mut registry = ModuleRegistry::new();
    let m = registry.define(&mut heap, "job-control");
    add_export(&mut heap, m, "wait-for-job");
    assert!(is_exported(&heap, m, "wait-for-job"));
    assert!(!is_exported(&heap, m, "other"));
}

#[test]
fn resolve_export_finds_a_symbol_in_a_direct_import() {
    let mut heap = Heap::new();
    let mut registry = ModuleRegistry::new();
    let lib = registry.define(&mut heap, "job-control");
    add_export(&mut heap, lib, "wait-for-job");
    let user = registry.define(&mut heap, "toplevel");
    add_import(&mut heap, user, lib);
    assert_eq!(resolve_export(&heap, user, "wait-for-job"), Ok(lib));
}

#[test]
fn resolve_export_searches_transitively() {
    let mut heap = Heap::new();
    let mut registry = ModuleRegistry::new();
    let base = registry.define(&mut heap, "base");
    add_export(&mut heap, base, "helper");
    let mid = registry.define(&mut heap, "mid");
    add_import(&mut heap, mid, base);
    let top = registry.define(&mut heap, "top");
    add_import(&mut heap, top, mid);
    assert_eq!(resolve_export(&heap, top, "helper"), Ok(base));
}

#[test]
fn resolve_export_fails_for_an_unbound_symbol() {
    let mut heap = Heap::new();
    let mut registry = ModuleRegistry::new();
    let user = registry.define(&mut heap, "toplevel");
    assert_eq!(resolve_export(&heap, user, "nope"), Err(ModuleError::Unbound("nope".to_owned())));
}

#[test]
fn import_cycles_terminate_instead_of_looping_forever() {
    let mut heap = Heap::new();
    let mut registry = ModuleRegistry::new();
    let a = registry.define(&mut heap, "a");
    let b = registry.define(&mut heap, "b");
    add_import(&mut heap, a, b);
    add_import(&mut heap, b, a);
    assert_eq!(resolve_export(&heap, a, "missing"), Err(ModuleError::Unbound("missing".to_owned())));
}
