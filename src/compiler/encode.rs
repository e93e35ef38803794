// Kernel Encoding: Turn a kernel request into a compact code and cache key
//
// A cell kernel is described by its kind, operator, element type, operand
// layout flags and mask mode. These pack into a small integer code; user
// operators add their name as a textual suffix and their definition text as
// the guard checked before a cached kernel is reused.
//
// Code layout (low bit first):
//   bits  0..4   family (1 = cell kernels)
//   bits  4..6   kind
//   bits  6..12  operator code (0x3F = user operator)
//   bits 12..16  type code
//   bits 16..20  A full, A iso, B full, B iso
//   bits 20..22  mask mode
//   bit  22      clear masked-out cells

use crate::core::binary_op::{BinaryOp, BinaryOpcode};
use crate::core::error::{GraphBlasError, Result};
use crate::types::{GraphBLASType, TypeCode};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

pub const FAMILY_CELLS: u64 = 1;

const USER_OPCODE: u64 = 0x3F;

/// How a cell combines its two inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    /// Union of patterns
    Add,
    /// Union of patterns, missing side replaced by alpha or beta
    Union,
    /// Intersection of patterns
    Mult,
    /// B replaces A: present exactly where B is
    Second,
}

impl CellKind {
    fn code(self) -> u64 {
        match self {
            CellKind::Add => 0,
            CellKind::Union => 1,
            CellKind::Mult => 2,
            CellKind::Second => 3,
        }
    }

    fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(CellKind::Add),
            1 => Some(CellKind::Union),
            2 => Some(CellKind::Mult),
            3 => Some(CellKind::Second),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CellKind::Add => "add",
            CellKind::Union => "union",
            CellKind::Mult => "mult",
            CellKind::Second => "second",
        }
    }
}

/// Mask state seen by a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskMode {
    None,
    Mask,
    Complement,
}

impl MaskMode {
    fn code(self) -> u64 {
        match self {
            MaskMode::None => 0,
            MaskMode::Mask => 1,
            MaskMode::Complement => 2,
        }
    }

    fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(MaskMode::None),
            1 => Some(MaskMode::Mask),
            2 => Some(MaskMode::Complement),
            _ => None,
        }
    }
}

/// Everything a cell kernel is specialized on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKernelSpec {
    pub kind: CellKind,
    /// Built-in operator, `None` for a user operator
    pub opcode: Option<BinaryOpcode>,
    pub type_code: TypeCode,
    pub a_full: bool,
    pub a_iso: bool,
    pub b_full: bool,
    pub b_iso: bool,
    pub mask: MaskMode,
    /// Masked-out cells become empty instead of keeping A
    pub clear_masked_out: bool,
}

impl CellKernelSpec {
    pub fn code(&self) -> u64 {
        let opcode = self.opcode.map_or(USER_OPCODE, |op| op.code());
        let flags = self.a_full as u64
            | (self.a_iso as u64) << 1
            | (self.b_full as u64) << 2
            | (self.b_iso as u64) << 3;
        FAMILY_CELLS
            | self.kind.code() << 4
            | opcode << 6
            | self.type_code.code() << 12
            | flags << 16
            | self.mask.code() << 20
            | (self.clear_masked_out as u64) << 22
    }

    pub fn decode(code: u64) -> Result<Self> {
        if code & 0xF != FAMILY_CELLS || code >> 23 != 0 {
            return Err(GraphBlasError::InvalidValue);
        }
        let kind = CellKind::from_code((code >> 4) & 0x3).ok_or(GraphBlasError::InvalidValue)?;
        let opcode = match (code >> 6) & 0x3F {
            USER_OPCODE => None,
            op => Some(BinaryOpcode::from_code(op).ok_or(GraphBlasError::InvalidValue)?),
        };
        let type_code = TypeCode::from_code((code >> 12) & 0xF).ok_or(GraphBlasError::InvalidValue)?;
        let flags = (code >> 16) & 0xF;
        let mask = MaskMode::from_code((code >> 20) & 0x3).ok_or(GraphBlasError::InvalidValue)?;
        Ok(Self {
            kind,
            opcode,
            type_code,
            a_full: flags & 1 != 0,
            a_iso: flags & 2 != 0,
            b_full: flags & 4 != 0,
            b_iso: flags & 8 != 0,
            mask,
            clear_masked_out: (code >> 22) & 1 != 0,
        })
    }
}

/// Identity of one kernel in the cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub code: u64,
    /// User operator name, empty for built-ins
    pub suffix: String,
    pub hash: u64,
}

impl KernelKey {
    pub fn new(code: u64, suffix: &str, op_hash: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(code.to_le_bytes());
        hasher.update(suffix.as_bytes());
        hasher.update(op_hash.to_le_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self {
            code,
            suffix: suffix.to_string(),
            hash: u64::from_le_bytes(bytes),
        }
    }

    /// Kernel name, also the file stem of its on-disk artifacts
    pub fn name(&self) -> String {
        if self.suffix.is_empty() {
            format!("rsk_cells_{:06x}", self.code)
        } else {
            format!("rsk_cells_{:06x}__{}", self.code, self.suffix)
        }
    }
}

/// A fully encoded request for one kernel
#[derive(Debug, Clone)]
pub struct KernelRequest {
    pub spec: CellKernelSpec,
    pub key: KernelKey,
    /// Definition text a cached kernel must match
    pub definitions: String,
}

/// Encode a cell kernel over the operator `op`
pub fn encodify<T: GraphBLASType>(spec: CellKernelSpec, op: &BinaryOp<T>) -> KernelRequest {
    debug_assert_eq!(spec.type_code, T::TYPE_CODE);
    debug_assert_eq!(spec.opcode, op.opcode());
    let suffix = if op.is_builtin() { "" } else { op.name() };
    KernelRequest {
        spec,
        key: KernelKey::new(spec.code(), suffix, op.hash()),
        definitions: op.definition().to_string(),
    }
}

/// Textual form of a kernel, written next to the compiled artifact
pub fn kernel_source(request: &KernelRequest) -> String {
    let spec = &request.spec;
    let layout = |full: bool, iso: bool| {
        let base = if full { "full" } else { "bitmap" };
        if iso {
            format!("{} iso", base)
        } else {
            base.to_string()
        }
    };
    let mut out = String::new();
    let _ = writeln!(out, "// {}", request.key.name());
    let _ = writeln!(out, "kind: {}", spec.kind.name());
    let _ = writeln!(
        out,
        "op: {}",
        spec.opcode.map_or(request.key.suffix.as_str(), |op| op.name())
    );
    let _ = writeln!(out, "type: {}", spec.type_code);
    let _ = writeln!(out, "a: {}", layout(spec.a_full, spec.a_iso));
    let _ = writeln!(out, "b: {}", layout(spec.b_full, spec.b_iso));
    let _ = writeln!(out, "mask: {:?}", spec.mask);
    let _ = writeln!(out, "clear_masked_out: {}", spec.clear_masked_out);
    if !request.definitions.is_empty() {
        let _ = writeln!(out, "definitions:\n{}", request.definitions);
    }
    out
}
