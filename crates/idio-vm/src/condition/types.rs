// SPDX-License-Identifier: GPL-3.0-or-later

//! The condition-type hierarchy (spec.md §4.3, supplemented per
//! `SPEC_FULL.md` §12 from `examples/original_source/src/condition.h`'s
//! fuller enumeration).

/// One node in the hierarchy: its name, its parent's name (`None` only for
/// the root `^condition`), and its extra fields beyond what it inherits.
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub name: &'static str,
    pub parent: Option<&'static str>,
    pub fields: &'static [&'static str],
}

/// The full tree, root first. Every descendant's parent appears earlier in
/// this list, so building it in order never forward-references.
pub const HIERARCHY: &[TypeInfo] = &[
    TypeInfo { name: "^condition", parent: None, fields: &[] },
    TypeInfo { name: "^error", parent: Some("^condition"), fields: &[] },
    TypeInfo { name: "^idio-error", parent: Some("^error"), fields: &["message", "location", "detail"] },
    TypeInfo { name: "^read-error", parent: Some("^idio-error"), fields: &["line", "position"] },
    TypeInfo { name: "^string-error", parent: Some("^idio-error"), fields: &[] },
    TypeInfo { name: "^string-error/width", parent: Some("^string-error"), fields: &[] },
    TypeInfo { name: "^system-error", parent: Some("^idio-error"), fields: &["errno", "function"] },
    TypeInfo { name: "^rt-command-status-error", parent: Some("^error"), fields: &["status", "job"] },
    TypeInfo { name: "^io-error", parent: Some("^idio-error"), fields: &["handle"] },
    TypeInfo { name: "^io-handle-error", parent: Some("^io-error"), fields: &[] },
    TypeInfo { name: "^io-read-error", parent: Some("^io-handle-error"), fields: &[] },
    TypeInfo { name: "^io-write-error", parent: Some("^io-handle-error"), fields: &[] },
    TypeInfo { name: "^io-closed-error", parent: Some("^io-handle-error"), fields: &[] },
    TypeInfo { name: "^io-filename-error", parent: Some("^io-error"), fields: &["filename"] },
    TypeInfo { name: "^static-error", parent: Some("^idio-error"), fields: &["location"] },
    TypeInfo { name: "^st-variable-error", parent: Some("^static-error"), fields: &["name"] },
    TypeInfo { name: "^st-variable-type-error", parent: Some("^st-variable-error"), fields: &[] },
    TypeInfo { name: "^st-function-error", parent: Some("^static-error"), fields: &["name"] },
    TypeInfo { name: "^st-function-arity-error", parent: Some("^st-function-error"), fields: &["expected", "got"] },
    TypeInfo { name: "^rt-error", parent: Some("^idio-error"), fields: &[] },
    TypeInfo { name: "^rt-parameter-error", parent: Some("^rt-error"), fields: &["parameter"] },
    TypeInfo { name: "^rt-parameter-type-error", parent: Some("^rt-parameter-error"), fields: &["expected"] },
    TypeInfo { name: "^rt-const-parameter-error", parent: Some("^rt-parameter-error"), fields: &[] },
    TypeInfo { name: "^rt-parameter-value-error", parent: Some("^rt-parameter-error"), fields: &["value"] },
    TypeInfo { name: "^rt-parameter-nil-error", parent: Some("^rt-parameter-error"), fields: &[] },
    TypeInfo { name: "^rt-variable-error", parent: Some("^rt-error"), fields: &["name"] },
    TypeInfo { name: "^rt-variable-unbound-error", parent: Some("^rt-variable-error"), fields: &[] },
    TypeInfo { name: "^rt-array-bounds-error", parent: Some("^rt-error"), fields: &["index", "len"] },
    TypeInfo { name: "^rt-hash-key-not-found-error", parent: Some("^rt-error"), fields: &["key"] },
    TypeInfo { name: "^rt-glob-error", parent: Some("^rt-error"), fields: &["pattern"] },
    TypeInfo { name: "^rt-command-error", parent: Some("^rt-error"), fields: &[] },
    TypeInfo { name: "^rt-number-error", parent: Some("^rt-error"), fields: &["number"] },
    TypeInfo { name: "^rt-divide-by-zero-error", parent: Some("^rt-number-error"), fields: &[] },
    TypeInfo { name: "^rt-signal", parent: Some("^condition"), fields: &["signal"] },
    TypeInfo { name: "^warning", parent: Some("^condition"), fields: &["message"] },
];

/// Find a node's info by name.
#[must_use]
pub fn find(name: &str) -> Option<&'static TypeInfo> {
    HIERARCHY.iter().find(|t| t.name == name)
}

/// Is `descendant` the same type as, or a descendant of, `ancestor`?
#[must_use]
pub fn is_a(descendant: &str, ancestor: &str) -> bool {
    let mut current = Some(descendant);
    while let Some(name) = current {
        if name == ancestor {
            return true;
        }
        current = find(name).and_then(|t| t.parent);
    }
    false
}

#[cfg(test)]
mod types_test {
    use super::*;

    #[test]
    fn every_non_root_parent_exists_earlier_in_the_list() {
        for (i, t) in HIERARCHY.iter().enumerate() {
            if let Some(parent) = t.parent {
                let parent_index = HIERARCHY.iter().position(|p| p.name == parent);
                assert!(parent_index.is_some(), "{} has unknown parent {parent}", t.name);
                assert!(parent_index.unwrap() < i, "{} declared before its parent {parent}", t.name);
            }
        }
    }

    #[test]
    fn io_read_error_is_an_io_error_and_an_error_and_a_condition() {
        assert!(is_a("^io-read-error", "^io-error"));
        assert!(is_a("^io-read-error", "^error"));
        assert!(is_a("^io-read-error", "^condition"));
    }

    #[test]
    fn unrelated_types_are_not_ancestors() {
        assert!(!is_a("^io-read-error", "^rt-parameter-error"));
    }

    #[test]
    fn a_type_is_a_of_itself() {
        assert!(is_a("^system-error", "^system-error"));
    }
}
