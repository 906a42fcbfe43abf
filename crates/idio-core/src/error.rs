// SPDX-License-Identifier: GPL-3.0-or-later

//! Shared host-boundary error type.
//!
//! `idio_vm::condition::from_host_error` lifts one of these into a
//! `^system-error` condition (spec.md §6.3: `[errno, function]` slots).
//! Kept here, rather than in `idio-vm`, so `idio-cli` can construct and
//! propagate the same type before a VM even exists (e.g. while resolving
//! `IDIOLIB`).

use std::io;

/// A syscall-shaped failure: an `errno` plus the C function name that
/// produced it, matching `^system-error`'s field order.
#[derive(Debug, thiserror::Error)]
#[error("{function}: {source}")]
pub struct HostError {
    /// Name of the syscall/libc function that failed (e.g. `"open"`).
    pub function: &'static str,
    /// The underlying OS error.
    #[source]
    pub source: io::Error,
}

impl HostError {
    /// Build a `HostError` from the current `errno` and a function name.
    #[must_use]
    pub fn last_os_error(function: &'static str) -> Self {
        Self { function, source: io::Error::last_os_error() }
    }

    /// The raw `errno` value, if the underlying error carries one.
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        self.source.raw_os_error()
    }
}

#[cfg(test)]
mod error_test {
    use super::*;

    #[test]
    fn carries_function_name() {
        let e = HostError { function: "open", source: io::Error::from_raw_os_error(2) };
        assert_eq!(e.function, "open");
        assert_eq!(e.errno(), Some(2));
        assert!(e.to_string().contains("open"));
    }
}
