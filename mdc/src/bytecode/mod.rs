//! The bytecode module format (§3.5, §4.4): a linear register-machine
//! instruction stream plus a constant pool, function table, and symbol
//! section, persisted in a compact binary container with a four-byte magic.
//!
//! [`Module`] is the in-memory form the VM executes directly; [`encode`]
//! and [`decode`] convert it to/from the on-disk `.mdbc` container. There
//! is no serde derive here — the container has an explicit byte layout of
//! its own (offsets, tags, fixed-width operands) rather than a generic
//! serialization concern, matching how the teacher hand-rolls its own
//! binary/text code generators instead of reaching for serde there.

mod decode;
pub(crate) mod encode;
mod opcode;

pub use decode::{decode, BytecodeError};
pub(crate) use decode::decode_type_tag;
pub use encode::encode;
pub use opcode::Opcode;

use crate::ast::TypeAnn;

/// `M D B C`.
pub const MAGIC: [u8; 4] = *b"MDBC";

/// The only version this crate's container format defines (§6).
pub const VERSION: u32 = 1;

/// A constant-pool literal (§3.5). Strings double as the pool entries for
/// `LoadName`/`StoreName`'s name operands and `Call`'s callee-name lookup
/// fallback, so there is no separate name section distinct from this one.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Empty,
}

/// One function's record in the function table (§3.5, §4.4): name,
/// parameter count, register count, and the byte offset of its first
/// instruction within the module's single flat instruction section.
#[derive(Debug, Clone)]
pub struct FunctionRecord {
    pub name: String,
    pub params: Vec<ParamRecord>,
    pub output_ty: TypeAnn,
    pub register_count: u16,
    pub entry_offset: u32,
}

/// A parameter as recorded in the function table: enough to drive the
/// call protocol's positional/named/default binding (§4.5) without
/// re-reading MIR.
#[derive(Debug, Clone)]
pub struct ParamRecord {
    pub name: String,
    pub required: bool,
    /// Index into [`Module::functions`] of the nullary thunk that computes
    /// this parameter's default, evaluated in the callee's *definition*
    /// environment when the caller omits the argument (§4.5).
    pub default_fn: Option<u32>,
}

/// A fully assembled bytecode module (§3.5): everything the VM needs to
/// execute, already register-allocated and instruction-selected.
///
/// Top-level code always starts at byte offset 0 of `code` and is not
/// itself a callable `FunctionRecord` — `functions` lists only the
/// program's utilities (and their default-value thunks), matching how a
/// module with no utilities at all still runs its top-level statements
/// straight out of the instruction section with an empty function table.
#[derive(Debug, Clone)]
pub struct Module {
    pub version: u32,
    pub flags: u32,
    pub name: String,
    pub constants: Vec<Constant>,
    pub functions: Vec<FunctionRecord>,
    /// The single flat instruction stream every function's `entry_offset`
    /// indexes into; jump/branch targets are absolute byte offsets within
    /// this same stream (§4.4). Top-level execution begins at offset 0.
    pub code: Vec<u8>,
    /// Register file size the VM must allocate for the top-level frame.
    /// Top-level has no `FunctionRecord` of its own (see above), so this
    /// rides along as a small field of the instruction section rather
    /// than a synthetic function-table entry (§4.4, §4.5).
    pub top_level_register_count: u16,
}

impl Module {
    pub fn function_named(&self, name: &str) -> Option<(u32, &FunctionRecord)> {
        self.functions
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
            .map(|(i, f)| (i as u32, f))
    }
}
