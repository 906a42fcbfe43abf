// SPDX-License-Identifier: GPL-3.0-or-later

//! Thin POSIX syscall wrappers used by `crate::jobcontrol` (spec.md §4.6).
//!
//! This module is deliberately minimal: it does not attempt to be a
//! general I/O-handle abstraction (out of scope, spec.md §1) — it exists
//! so job control's fork/exec/pipe dance has a single place that talks to
//! `nix`, making it the one module that needs `#[cfg(unix)]` gating and
//! the one seam `crate::condition::from_nix_error` attaches to.

use idio_core::Signal;
use nix::unistd::Pid;

/// Resolve a signal name back to its number, the reverse of
/// `idio_core::signals::signal_name` (spec.md §4.6: signal handling needs
/// both directions — naming a received signal, and looking one up by name
/// for `kill`). Accepts both the short (`"HUP"`) and `SIG`-prefixed
/// (`"SIGHUP"`) spellings.
#[must_use]
pub fn signal_by_name(name: &str) -> Option<&'static Signal> {
    let short = name.strip_prefix("SIG").unwrap_or(name);
    idio_core::signals::CORE_SIGNALS.iter().find(|s| s.short_name == short)
}

/// `getpid`/`getppid`/`getpgrp` style process-identity helpers, wrapped so
/// `crate::jobcontrol` never imports `nix::unistd` directly — keeping
/// every raw libc-adjacent call behind this module is what makes
/// `crate::condition::from_nix_error` the *only* crossing point for host
/// errors (`SPEC_FULL.md` §14.2).
#[must_use]
pub fn current_pid() -> i32 {
    Pid::this().as_raw()
}

#[must_use]
pub fn current_pgid() -> Result<i32, nix::Error> {
    Ok(nix::unistd::getpgrp().as_raw())
}

pub fn set_pgid(pid: i32, pgid: i32) -> Result<(), nix::Error> {
    nix::unistd::setpgid(Pid::from_raw(pid), Pid::from_raw(pgid))
}

pub fn tcsetpgrp(fd: std::os::fd::RawFd, pgid: i32) -> Result<(), nix::Error> {
    use std::os::fd::BorrowedFd;
    // SAFETY: `fd` is a controlling-terminal descriptor the caller owns
    // for the duration of this call (job control always passes stdin).
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    nix::unistd::tcsetpgrp(borrowed, Pid::from_raw(pgid))
}

pub fn is_interactive(fd: std::os::fd::RawFd) -> bool {
    use std::os::fd::BorrowedFd;
    // SAFETY: see `tcsetpgrp` above.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    nix::unistd::isatty(borrowed).unwrap_or(false)
}

/// Async-signal-safe trampoline installed for every signal this core
/// watches: the only thing it is safe to do in a signal handler is mark
/// the bit and return (spec.md §4.3 "Signals → conditions"). `Vm::step`
/// drains `idio_core::signals::PENDING_SIGNALS` between instructions and
/// turns each pending number into an `^rt-signal` condition.
extern "C" fn mark_pending_signal(signum: libc::c_int) {
    idio_core::signals::PENDING_SIGNALS.mark(signum);
}

/// Install `mark_pending_signal` for the signals job control and the
/// toplevel need to observe asynchronously: `SIGCHLD` (job-state changes)
/// and `SIGHUP` (controlling terminal gone), per spec.md §4.6.
///
/// # Errors
///
/// Returns [`nix::Error`] if `sigaction` itself fails.
pub fn install_core_signal_handlers() -> Result<(), nix::Error> {
    // SAFETY: the handler only performs an atomic store, which is
    // async-signal-safe; `sigaction` itself requires `unsafe` because an
    // arbitrary function pointer could violate that, which ours does not.
    unsafe {
        let action = nix::sys::signal::SigAction::new(
            nix::sys::signal::SigHandler::Handler(mark_pending_signal),
            nix::sys::signal::SaFlags::SA_RESTART,
            nix::sys::signal::SigSet::empty(),
        );
        nix::sys::signal::sigaction(nix::sys::signal::Signal::SIGCHLD, &action)?;
        nix::sys::signal::sigaction(nix::sys::signal::Signal::SIGHUP, &action)?;
    }
    Ok(())
}

#[cfg(test)]
mod sysglue_test {
    use super::*;

    #[test]
    fn current_pid_matches_process_id() {
        assert_eq!(current_pid(), std::process::id() as i32);
    }

    #[test]
    fn signal_by_name_finds_chld() {
        assert_eq!(signal_by_name("SIGCHLD").map(|s| s.number), Some(17));
        assert_eq!(signal_by_name("CHLD").map(|s| s.number), Some(17));
    }

    #[test]
    fn signal_by_name_rejects_unknown_names() {
        assert!(signal_by_name("SIGNOTREAL").is_none());
    }

    #[test]
    fn mark_pending_signal_reaches_the_shared_mask() {
        idio_core::signals::PENDING_SIGNALS.take_pending();
        mark_pending_signal(17);
        assert_eq!(idio_core::signals::PENDING_SIGNALS.take_pending(), vec![17]);
    }
}
