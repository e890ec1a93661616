//! Linear-scan register allocation and instruction selection (§4.3, §4.4).
//!
//! MIR's virtual registers are bounded per function at 256 physical
//! slots; a function whose live-register pressure exceeds that raises
//! [`RegAllocError::Overflow`], which [`crate::compile`] turns into
//! [`crate::error::DiagnosticKind::RegisterOverflow`] rather than a panic.

mod alloc;
mod assemble;

pub use alloc::{allocate, Assignment, MAX_REGISTERS};
pub use assemble::assemble_module;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegAllocError {
    #[error("function `{0}` needs more than 255 live registers at once")]
    Overflow(String),
}
