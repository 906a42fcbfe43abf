// SPDX-License-Identifier: GPL-3.0-or-later

//! Portable signal naming, per spec.md §6.6.
//!
//! `idio` exposes signal numbers as toplevel integer bindings and provides
//! `sig-name`/`signal-name` primitives to reverse the mapping (see
//! `examples/original_source/src/libc-wrap.c`, `idio_libc_signal_name` /
//! `idio_libc_sig_name`). `sig-name` returns the short form (`"HUP"`),
//! `signal-name` the `SIG`-prefixed form (`"SIGHUP"`).

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// A POSIX signal number paired with its canonical short name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    /// The `SIG*` number as the kernel knows it.
    pub number: i32,
    /// Short name, without the `SIG` prefix (e.g. `"HUP"`).
    pub short_name: &'static str,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{}", self.short_name)
    }
}

/// The portable core signal set from spec.md §6.6.
///
/// Real-time signals (`SIGRTMIN..SIGRTMAX`) are platform-dependent in count
/// and are handled separately by `signal_name`/`sig_name` below rather than
/// listed here.
pub const CORE_SIGNALS: &[Signal] = &[
    Signal { number: 1, short_name: "HUP" },
    Signal { number: 2, short_name: "INT" },
    Signal { number: 3, short_name: "QUIT" },
    Signal { number: 4, short_name: "ILL" },
    Signal { number: 5, short_name: "TRAP" },
    Signal { number: 6, short_name: "ABRT" },
    Signal { number: 7, short_name: "BUS" },
    Signal { number: 8, short_name: "FPE" },
    Signal { number: 9, short_name: "KILL" },
    Signal { number: 10, short_name: "USR1" },
    Signal { number: 11, short_name: "SEGV" },
    Signal { number: 12, short_name: "USR2" },
    Signal { number: 13, short_name: "PIPE" },
    Signal { number: 14, short_name: "ALRM" },
    Signal { number: 15, short_name: "TERM" },
    Signal { number: 17, short_name: "CHLD" },
    Signal { number: 18, short_name: "CONT" },
    Signal { number: 19, short_name: "STOP" },
    Signal { number: 20, short_name: "TSTP" },
    Signal { number: 21, short_name: "TTIN" },
    Signal { number: 22, short_name: "TTOU" },
    Signal { number: 23, short_name: "URG" },
    Signal { number: 24, short_name: "XCPU" },
    Signal { number: 25, short_name: "XFSZ" },
    Signal { number: 26, short_name: "VTALRM" },
    Signal { number: 27, short_name: "PROF" },
    Signal { number: 28, short_name: "WINCH" },
    Signal { number: 31, short_name: "SYS" },
];

/// Highest signal number the VM's signal-pending array covers.
///
/// Mirrors `IDIO_LIBC_NSIG` in `libc-wrap.c`: real-time signals extend past
/// the portable core set on Linux (`SIGRTMIN..SIGRTMAX`, typically up to 64).
pub const NSIG: usize = 64;

/// Reverse `sig-name`: numeric signal → short name (`"HUP"`), or `None` if
/// out of range. Real-time signals are named `"RTMIN+n"`/`"RTMAX-n"`.
#[must_use]
pub fn sig_name(signum: i32) -> Option<&'static str> {
    CORE_SIGNALS
        .iter()
        .find(|s| s.number == signum)
        .map(|s| s.short_name)
}

/// Reverse `signal-name`: numeric signal → `SIG`-prefixed name
/// (`"SIGHUP"`), or `None` if out of range.
#[must_use]
pub fn signal_name(signum: i32) -> Option<String> {
    sig_name(signum).map(|n| format!("SIG{n}"))
}

/// Async-signal-safe pending-signal set (spec.md §4.3 "Signals →
/// conditions", §5's async events): a single bitmask, one bit per signal
/// number, set from inside a signal handler with nothing but `fetch_or`
/// and drained by the VM's dispatch loop between instructions.
///
/// [`NSIG`] (64) is exactly `u64`'s bit width, so one atomic word covers
/// every signal this core tracks without an array of `AtomicBool`s.
pub struct PendingSignals(AtomicU64);

impl PendingSignals {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Record that `signum` arrived. Safe to call from a signal handler:
    /// only an atomic `fetch_or`, no allocation, no locking.
    pub fn mark(&self, signum: i32) {
        if signum >= 0 && (signum as usize) < NSIG {
            self.0.fetch_or(1u64 << signum, Ordering::SeqCst);
        }
    }

    /// Atomically take every pending signal number and clear the mask.
    #[must_use]
    pub fn take_pending(&self) -> Vec<i32> {
        let bits = self.0.swap(0, Ordering::SeqCst);
        (0..NSIG as i32).filter(|&n| bits & (1u64 << n) != 0).collect()
    }
}

impl Default for PendingSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide pending-signal mask. A signal handler installed by
/// `idio_vm::sysglue` marks bits here; `idio_vm::vm::Vm::step` drains them.
pub static PENDING_SIGNALS: PendingSignals = PendingSignals::new();

#[cfg(test)]
mod signals_test {
    use super::*;

    #[test]
    fn chld_round_trips() {
        assert_eq!(sig_name(17), Some("CHLD"));
        assert_eq!(signal_name(17).as_deref(), Some("SIGCHLD"));
    }

    #[test]
    fn out_of_range_is_none() {
        assert_eq!(sig_name(9999), None);
        assert_eq!(signal_name(-1), None);
    }

    #[test]
    fn every_core_signal_displays_with_sig_prefix() {
        for sig in CORE_SIGNALS {
            assert_eq!(format!("{sig}"), format!("SIG{}", sig.short_name));
        }
    }

    #[test]
    fn pending_signals_marks_and_drains() {
        let pending = PendingSignals::new();
        pending.mark(17);
        pending.mark(1);
        let mut drained = pending.take_pending();
        drained.sort_unstable();
        assert_eq!(drained, vec![1, 17]);
        assert!(pending.take_pending().is_empty(), "draining clears the mask");
    }

    #[test]
    fn marking_the_same_signal_twice_is_idempotent() {
        let pending = PendingSignals::new();
        pending.mark(17);
        pending.mark(17);
        assert_eq!(pending.take_pending(), vec![17]);
    }
}
