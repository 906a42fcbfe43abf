// SPDX-License-Identifier: GPL-3.0-or-later

//! The three parallel global-value tables (spec.md §4.2): `predef` (native
//! primitives, fixed at image-load time), `toplevel` (ordinary top-level
//! definitions), and a `defined` bitset tracking which `toplevel` slots
//! have actually been assigned — `checked-global-ref` consults it to raise
//! `^rt-variable-error`-style unbound-variable faults instead of silently
//! reading `#<undef>`.

use crate::value::Value;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Globals {
    pub predef: Vec<Value>,
    pub toplevel: Vec<Value>,
    defined: Vec<bool>,
    toplevel_names: HashMap<String, u32>,
    predef_names: HashMap<String, u32>,
}

impl Globals {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_predef(&mut self, name: &str, value: Value) -> u32 {
        let index = u32::try_from(self.predef.len()).expect("predef table exceeds u32 index space");
        self.predef.push(value);
        self.predef_names.insert(name.to_owned(), index);
        index
    }

    #[must_use]
    pub fn predef_index(&self, name: &str) -> Option<u32> {
        self.predef_names.get(name).copied()
    }

    /// Reserve a toplevel slot for `name` without giving it a value yet
    /// (compiler-time forward reference); `is_defined` returns `false`
    /// until [`Self::set_toplevel`] is called on this index.
    pub fn reserve_toplevel(&mut self, name: &str) -> u32 {
        if let Some(&index) = self.toplevel_names.get(name) {
            return index;
        }
        let index = u32::try_from(self.toplevel.len()).expect("toplevel table exceeds u32 index space");
        self.toplevel.push(Value::nil());
        self.defined.push(false);
        self.toplevel_names.insert(name.to_owned(), index);
        index
    }

    #[must_use]
    pub fn toplevel_index(&self, name: &str) -> Option<u32> {
        self.toplevel_names.get(name).copied()
    }

    pub fn set_toplevel(&mut self, index: u32, value: Value) {
        self.toplevel[index as usize] = value;
        self.defined[index as usize] = true;
    }

    #[must_use]
    pub fn is_defined(&self, index: u32) -> bool {
        self.defined.get(index as usize).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod globals_test {
    use super::*;

    #[test]
    fn reserve_then_set_marks_defined() {
        let mut g = Globals::new();
        let i = g.reserve_toplevel("x");
        assert!(!g.is_defined(i));
        g.set_toplevel(i, Value::fixnum(5));
        assert!(g.is_defined(i));
        assert_eq!(g.toplevel[i as usize], Value::fixnum(5));
    }

    #[test]
    fn reserving_the_same_name_twice_returns_the_same_index() {
        let mut g = Globals::new();
        let a = g.reserve_toplevel("y");
        let b = g.reserve_toplevel("y");
        assert_eq!(a, b);
    }

    #[test]
    fn predef_lookup_by_name() {
        let mut g = Globals::new();
        let i = g.define_predef("+", Value::fixnum(0));
        assert_eq!(g.predef_index("+"), Some(i));
    }
}
