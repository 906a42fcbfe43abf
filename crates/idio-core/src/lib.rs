// SPDX-License-Identifier: GPL-3.0-or-later

//! Foundational types shared between `idio-vm` and `idio-cli`.
//!
//! This crate is deliberately small: it holds the handful of types that
//! would otherwise have to be duplicated between the VM crate and the CLI
//! crate (source locations, the signal name table, pointer-width limits).

pub mod error;
pub mod limits;
pub mod signals;
pub mod span;

pub use error::HostError;
pub use limits::{FIXNUM_MAX, FIXNUM_MIN, PointerWidth};
pub use signals::{Signal, signal_name};
pub use span::SourceSpan;
