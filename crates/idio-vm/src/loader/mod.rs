// SPDX-License-Identifier: GPL-3.0-or-later

//! Byte-code image format (spec.md §6.2).
//!
//! A compiled image is a header, a constants pool, per-module metadata, one
//! or more code segments, and a relocation table tying compile-time
//! constant/global indices back to the runtime tables `crate::vm::Globals`
//! builds at load time. Everything is little-endian, LEB128 where a count
//! or index is variable-width, matching the packing discipline
//! `crate::bytecode` already uses for instruction operands.


use crate::bytecode::{read_leb128, write_leb128};
use crate::heap::Heap;
use crate::value::Value;
use std::collections::HashMap;

/// `b"IDIO"`, the image magic number.
pub const MAGIC: [u8; 4] = *b"IDIO";

/// Current image format version. Bumped whenever the on-disk layout
/// changes incompatibly.
pub const FORMAT_VERSION: u16 = 1;

/// Errors reading a byte-code image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("not an idio image: bad magic number")]
    BadMagic,
    #[error("unsupported image format version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },
    #[error("image built for {found}-bit fixnums, this runtime is {expected}-bit")]
    FixnumWidthMismatch { found: u8, expected: u8 },
    #[error("truncated image at offset {offset}")]
    Truncated { offset: usize },
    #[error("unknown constant kind tag {0}")]
    UnknownConstantKind(u8),
    #[error("relocation entry refers to unknown constant index {0}")]
    BadRelocation(u32),
}

/// One entry of the constants pool (spec.md §6.2: "arbitrary Values; at
/// minimum symbols and strings").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstantEntry {
    Fixnum(i64),
    String(String),
    Symbol(String),
    Keyword(String),
}

/// Per-module metadata (spec.md §6.2).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleMetadata {
    pub name: String,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    /// `(symbol name, toplevel index)` pairs exposed by this module.
    pub symbol_info: Vec<(String, u32)>,
}

/// One compilation unit's code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeUnit {
    pub code: Vec<u8>,
}

/// A compile-time constant index to a runtime value-table index (spec.md
/// §6.2's relocation table), applied once at load time so the code
/// segment's `Constant`/`GlobalRef` operands can stay relative to the
/// image rather than to whatever else is already loaded in the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub compile_index: u32,
    pub runtime_index: u32,
}

/// A fully-parsed byte-code image, ready to hand to [`load_into_heap`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    pub fixnum_width: u8,
    pub constants: Vec<ConstantEntry>,
    pub modules: Vec<ModuleMetadata>,
    pub code_units: Vec<CodeUnit>,
    pub relocations: Vec<Relocation>,
}

fn this_runtime_fixnum_width() -> u8 {
    u8::try_from(std::mem::size_of::<usize>() * 8).unwrap_or(64)
}

fn read_u8(bytes: &[u8], pos: &mut usize) -> Result<u8, LoadError> {
    let b = *bytes.get(*pos).ok_or(LoadError::Truncated { offset: *pos })?;
    *pos += 1;
    Ok(b)
}

fn read_u16(bytes: &[u8], pos: &mut usize) -> Result<u16, LoadError> {
    let lo = read_u8(bytes, pos)?;
    let hi = read_u8(bytes, pos)?;
    Ok(u16::from_le_bytes([lo, hi]))
}

fn read_leb(bytes: &[u8], pos: &mut usize) -> Result<u32, LoadError> {
    read_leb128(bytes, pos).ok_or(LoadError::Truncated { offset: *pos })
}

fn read_string(bytes: &[u8], pos: &mut usize) -> Result<String, LoadError> {
    let len = read_leb(bytes, pos)? as usize;
    let start = *pos;
    let end = start.checked_add(len).ok_or(LoadError::Truncated { offset: start })?;
    let slice = bytes.get(start..end).ok_or(LoadError::Truncated { offset: start })?;
    *pos = end;
    Ok(String::from_utf8_lossy(slice).into_owned())
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    write_leb128(u32::try_from(s.len()).unwrap_or(u32::MAX), out);
    out.extend_from_slice(s.as_bytes());
}

/// Parse a byte-code image from its on-disk representation.
///
/// # Errors
///
/// Returns [`LoadError`] for a bad magic number, an unsupported format
/// version, a fixnum-width mismatch (spec.md §6.2: images are not
/// portable across fixnum widths), or any truncated/malformed section.
pub fn parse_image(bytes: &[u8]) -> Result<Image, LoadError> {
    let mut pos = 0usize;
    if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
        return Err(LoadError::BadMagic);
    }
    pos += MAGIC.len();

    let version = read_u16(bytes, &mut pos)?;
    if version != FORMAT_VERSION {
        return Err(LoadError::UnsupportedVersion { found: version, expected: FORMAT_VERSION });
    }

    let fixnum_width = read_u8(bytes, &mut pos)?;
    let expected = this_runtime_fixnum_width();
    if fixnum_width != expected {
        return Err(LoadError::FixnumWidthMismatch { found: fixnum_width, expected });
    }

    let constant_count = read_leb(bytes, &mut pos)?;
    let mut constants = Vec::with_capacity(constant_count as usize);
    for _ in 0..constant_count {
        let kind = read_u8(bytes, &mut pos)?;
        constants.push(match kind {
            0 => {
                let raw = read_leb(bytes, &mut pos)?;
                ConstantEntry::Fixnum(i64::from(raw))
            }
            1 => ConstantEntry::String(read_string(bytes, &mut pos)?),
            2 => ConstantEntry::Symbol(read_string(bytes, &mut pos)?),
            3 => ConstantEntry::Keyword(read_string(bytes, &mut pos)?),
            other => return Err(LoadError::UnknownConstantKind(other)),
        });
    }

    let module_count = read_leb(bytes, &mut pos)?;
    let mut modules = Vec::with_capacity(module_count as usize);
    for _ in 0..module_count {
        let name = read_string(bytes, &mut pos)?;
        let import_count = read_leb(bytes, &mut pos)?;
        let imports = (0..import_count).map(|_| read_string(bytes, &mut pos)).collect::<Result<_, _>>()?;
        let export_count = read_leb(bytes, &mut pos)?;
        let exports = (0..export_count).map(|_| read_string(bytes, &mut pos)).collect::<Result<_, _>>()?;
        let symbol_count = read_leb(bytes, &mut pos)?;
        let mut symbol_info = Vec::with_capacity(symbol_count as usize);
        for _ in 0..symbol_count {
            let name = read_string(bytes, &mut pos)?;
            let index = read_leb(bytes, &mut pos)?;
            symbol_info.push((name, index));
        }
        modules.push(ModuleMetadata { name, imports, exports, symbol_info });
    }

    let unit_count = read_leb(bytes, &mut pos)?;
    let mut code_units = Vec::with_capacity(unit_count as usize);
    for _ in 0..unit_count {
        let len = read_leb(bytes, &mut pos)? as usize;
        let start = pos;
        let end = start.checked_add(len).ok_or(LoadError::Truncated { offset: start })?;
        let code = bytes.get(start..end).ok_or(LoadError::Truncated { offset: start })?.to_vec();
        pos = end;
        code_units.push(CodeUnit { code });
    }

    let relocation_count = read_leb(bytes, &mut pos)?;
    let mut relocations = Vec::with_capacity(relocation_count as usize);
    for _ in 0..relocation_count {
        let compile_index = read_leb(bytes, &mut pos)?;
        let runtime_index = read_leb(bytes, &mut pos)?;
        if compile_index as usize >= constants.len() {
            return Err(LoadError::BadRelocation(compile_index));
        }
        relocations.push(Relocation { compile_index, runtime_index });
    }

    Ok(Image { fixnum_width, constants, modules, code_units, relocations })
}

/// Serialize an [`Image`] back to its on-disk form — used by tests and by
/// anything that builds images in-process rather than reading them from a
/// file (`idio-cli` only ever reads).
#[must_use]
pub fn write_image(image: &Image) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(image.fixnum_width);

    write_leb128(u32::try_from(image.constants.len()).unwrap_or(u32::MAX), &mut out);
    for c in &image.constants {
        match c {
            ConstantEntry::Fixnum(n) => {
                out.push(0);
                write_leb128(u32::try_from(*n).unwrap_or(0), &mut out);
            }
            ConstantEntry::String(s) => {
                out.push(1);
                write_string(s, &mut out);
            }
            ConstantEntry::Symbol(s) => {
                out.push(2);
                write_string(s, &mut out);
            }
            ConstantEntry::Keyword(s) => {
                out.push(3);
                write_string(s, &mut out);
            }
        }
    }

    write_leb128(u32::try_from(image.modules.len()).unwrap_or(u32::MAX), &mut out);
    for m in &image.modules {
        write_string(&m.name, &mut out);
        write_leb128(u32::try_from(m.imports.len()).unwrap_or(u32::MAX), &mut out);
        for i in &m.imports {
            write_string(i, &mut out);
        }
        write_leb128(u32::try_from(m.exports.len()).unwrap_or(u32::MAX), &mut out);
        for e in &m.exports {
            write_string(e, &mut out);
        }
        write_leb128(u32::try_from(m.symbol_info.len()).unwrap_or(u32::MAX), &mut out);
        for (name, index) in &m.symbol_info {
            write_string(name, &mut out);
            write_leb128(*index, &mut out);
        }
    }

    write_leb128(u32::try_from(image.code_units.len()).unwrap_or(u32::MAX), &mut out);
    for unit in &image.code_units {
        write_leb128(u32::try_from(unit.code.len()).unwrap_or(u32::MAX), &mut out);
        out.extend_from_slice(&unit.code);
    }

    write_leb128(u32::try_from(image.relocations.len()).unwrap_or(u32::MAX), &mut out);
    for r in &image.relocations {
        write_leb128(r.compile_index, &mut out);
        write_leb128(r.runtime_index, &mut out);
    }

    out
}

/// Materialize an image's constants pool onto the heap, applying its
/// relocation table, and return the runtime `Value`s in compile-time
/// constant order — ready to become `crate::vm::Vm`'s constant pool via
/// `Vm::load_segment`.
///
/// # Errors
///
/// Returns [`LoadError::BadRelocation`] if a relocation names a
/// constant index out of range.
pub fn load_into_heap(heap: &mut Heap, image: &Image) -> Result<(Vec<Value>, HashMap<u32, u32>), LoadError> {
    let mut values = Vec::with_capacity(image.constants.len());
    for c in &image.constants {
        values.push(match c {
            ConstantEntry::Fixnum(n) => Value::fixnum(*n),
            ConstantEntry::String(s) => heap.alloc_string(s),
            ConstantEntry::Symbol(s) | ConstantEntry::Keyword(s) => heap.intern(s),
        });
    }
    let mut relocation_map = HashMap::with_capacity(image.relocations.len());
    for r in &image.relocations {
        if r.compile_index as usize >= values.len() {
            return Err(LoadError::BadRelocation(r.compile_index));
        }
        relocation_map.insert(r.compile_index, r.runtime_index);
    }
    Ok((values, relocation_map))
}
